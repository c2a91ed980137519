use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::status::Status;

pub type TaskId = i64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    #[default]
    Pending,
    Started,
    Persisting,
    Completed,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }
}

/// Unidad atómica de trabajo que se entrega a un worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportTask {
    pub id: TaskId,
    pub collection_name: String,
    pub partition_name: String,
    pub row_based: bool,

    /// Archivos que cubre esta tarea (uno si es por filas, todos si es por columnas)
    pub files: Vec<String>,

    /// Opciones ya resueltas (defaults del coordinador + las del request)
    pub options: HashMap<String, String>,

    pub created_at: DateTime<Utc>,
}

/// Reporte de progreso/finalización que manda un worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportResult {
    pub task_id: TaskId,
    pub state: TaskState,
    #[serde(default)]
    pub row_count: i64,
    #[serde(default)]
    pub node_id: Option<String>,
    /// Mensaje de error cuando state == FAILED
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStateResponse {
    pub status: Status,
    pub state: TaskState,
    pub row_count: i64,
    #[serde(default)]
    pub error: Option<String>,
}

/// Fila del listado agregado de tareas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
    pub id: TaskId,
    pub collection_name: String,
    pub partition_name: String,
    pub files: Vec<String>,
    pub state: TaskState,
    pub row_count: i64,

    /// false mientras la tarea sigue en pending (sin worker)
    pub dispatched: bool,
    pub dispatch_attempts: u32,

    pub node_id: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    /// último intento de dispatch en pending, último reporte en working
    pub updated_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
}
