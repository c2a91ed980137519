use common::TaskId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    /// El id no está en working (nunca existió, o sigue sin dispatch).
    #[error("import task {0} not found")]
    TaskNotFound(TaskId),

    /// El allocator no pudo dar un id: servicio externo caído, o el contador
    /// local llegó al final de su rango.
    #[error("id allocation failed: {0}")]
    Allocation(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ImportError>;
