use std::sync::atomic::{AtomicI64, Ordering};

use common::TaskId;

use crate::error::{ImportError, Result};

/// Fuente de ids únicos para tareas de importación.
/// En producción es un servicio externo; aquí sólo importa la interfaz.
pub trait IdAllocator: Send + Sync {
    fn allocate(&self) -> Result<TaskId>;
}

/// Contador local. Es lo que usa el manager cuando no le inyectan allocator.
/// Falla con `ImportError::Allocation` si se agota el rango de `i64`.
#[derive(Debug, Default)]
pub struct SequentialIdAllocator {
    next: AtomicI64,
}

impl IdAllocator for SequentialIdAllocator {
    fn allocate(&self) -> Result<TaskId> {
        self.next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |id| id.checked_add(1))
            .map_err(|_| ImportError::Allocation("id space exhausted".into()))
    }
}
