use chrono::{DateTime, Utc};
use common::{
    ErrorCode, ImportResult, ImportTask, Status, TaskId, TaskInfo, TaskState, TaskStateResponse,
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tracing::{debug, warn};

use crate::error::{ImportError, Result};

/// Tarea creada pero sin worker todavía (el dispatch falló).
#[derive(Debug, Clone)]
pub struct PendingTask {
    pub task: ImportTask,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub last_attempt_at: DateTime<Utc>,
}

/// Tarea ya entregada a un worker; sólo la mutan los reportes.
#[derive(Debug, Clone)]
pub struct WorkingTask {
    pub task: ImportTask,
    pub state: TaskState,
    pub row_count: i64,
    pub dispatch_attempts: u32,
    pub node_id: Option<String>,
    pub error: Option<String>,
    pub dispatched_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Registries {
    // tareas pendientes de asignar
    pending: HashMap<TaskId, PendingTask>,
    // tareas ya asignadas, esperando reportes del worker
    working: HashMap<TaskId, WorkingTask>,
}

/// Registro en memoria de todas las tareas de importación.
///
/// Un mismo mutex protege pending y working, así que mover una tarea de
/// uno a otro es atómico y un id nunca aparece en ambos. El lock se toma
/// sólo durante cada operación; nada de I/O con el lock tomado.
#[derive(Clone, Default)]
pub struct TaskStore {
    inner: Arc<Mutex<Registries>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Todas las mutaciones son un insert/remove sobre los mapas, así que
    // un lock envenenado sigue teniendo datos consistentes.
    fn registries(&self) -> MutexGuard<'_, Registries> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registra una tarea cuyo primer dispatch falló.
    pub fn add_pending(&self, task: ImportTask, reason: impl Into<String>) {
        let id = task.id;
        let mut reg = self.registries();
        reg.pending.insert(
            id,
            PendingTask {
                task,
                attempts: 1,
                last_error: Some(reason.into()),
                last_attempt_at: Utc::now(),
            },
        );
        debug!("tarea {} en pending ({} pendientes)", id, reg.pending.len());
    }

    /// Registra una tarea despachada con éxito al primer intento.
    /// Queda en estado Pending hasta el primer reporte del worker.
    pub fn add_working(&self, task: ImportTask) {
        let id = task.id;
        let now = Utc::now();
        let mut reg = self.registries();
        reg.working.insert(
            id,
            WorkingTask {
                task,
                state: TaskState::Pending,
                row_count: 0,
                dispatch_attempts: 1,
                node_id: None,
                error: None,
                dispatched_at: now,
                updated_at: now,
            },
        );
        debug!("tarea {} en working ({} en vuelo)", id, reg.working.len());
    }

    /// Mueve una tarea de pending a working tras un reintento exitoso.
    /// Devuelve false si la tarea ya no estaba en pending.
    pub fn promote(&self, id: TaskId) -> bool {
        let now = Utc::now();
        let mut reg = self.registries();

        let Some(pending) = reg.pending.remove(&id) else {
            return false;
        };

        reg.working.insert(
            id,
            WorkingTask {
                task: pending.task,
                state: TaskState::Pending,
                row_count: 0,
                dispatch_attempts: pending.attempts + 1,
                node_id: None,
                error: None,
                dispatched_at: now,
                updated_at: now,
            },
        );
        true
    }

    /// Anota un reintento fallido. La tarea sigue en pending; nunca se descarta.
    /// Devuelve el número de intentos acumulados, o None si no estaba en pending.
    pub fn record_dispatch_failure(&self, id: TaskId, reason: impl Into<String>) -> Option<u32> {
        let mut reg = self.registries();
        let entry = reg.pending.get_mut(&id)?;
        entry.attempts += 1;
        entry.last_error = Some(reason.into());
        entry.last_attempt_at = Utc::now();
        Some(entry.attempts)
    }

    /// Aplica el reporte de un worker sobre una tarea en working.
    ///
    /// Reemplaza estado y row_count (gana el último reporte). Un id que no
    /// está en working se rechaza con `TaskNotFound`, incluidos los que siguen
    /// en pending: nadie debería estar reportando sobre ellos.
    pub fn update_task_state(&self, report: &ImportResult) -> Result<()> {
        let mut reg = self.registries();

        let Some(entry) = reg.working.get_mut(&report.task_id) else {
            warn!(
                "reporte para tarea desconocida {} (state={:?})",
                report.task_id, report.state
            );
            return Err(ImportError::TaskNotFound(report.task_id));
        };

        if entry.state.is_terminal() && entry.state != report.state {
            warn!(
                "tarea {} ya estaba en {:?}, se sobrescribe con {:?}",
                report.task_id, entry.state, report.state
            );
        }

        entry.state = report.state;
        entry.row_count = report.row_count;
        entry.error = report.error.clone();
        if report.node_id.is_some() {
            entry.node_id = report.node_id.clone();
        }
        entry.updated_at = Utc::now();

        Ok(())
    }

    pub fn get_task_state(&self, id: TaskId) -> TaskStateResponse {
        let reg = self.registries();

        if let Some(w) = reg.working.get(&id) {
            return TaskStateResponse {
                status: Status::success(),
                state: w.state,
                row_count: w.row_count,
                error: w.error.clone(),
            };
        }

        if reg.pending.contains_key(&id) {
            return TaskStateResponse {
                status: Status::success(),
                state: TaskState::Pending,
                row_count: 0,
                error: None,
            };
        }

        TaskStateResponse {
            status: Status::error(
                ErrorCode::TaskNotFound,
                format!("import task {} not found", id),
            ),
            state: TaskState::Pending,
            row_count: 0,
            error: None,
        }
    }

    /// Copia de las tareas en pending, ordenadas por id (para el sweep).
    pub fn pending_tasks(&self) -> Vec<ImportTask> {
        let reg = self.registries();
        let mut tasks: Vec<ImportTask> = reg.pending.values().map(|p| p.task.clone()).collect();
        tasks.sort_by_key(|t| t.id);
        tasks
    }

    pub fn list_tasks(&self) -> Vec<TaskInfo> {
        let reg = self.registries();

        let pending = reg.pending.values().map(|p| TaskInfo {
            id: p.task.id,
            collection_name: p.task.collection_name.clone(),
            partition_name: p.task.partition_name.clone(),
            files: p.task.files.clone(),
            state: TaskState::Pending,
            row_count: 0,
            dispatched: false,
            dispatch_attempts: p.attempts,
            node_id: None,
            error: p.last_error.clone(),
            created_at: p.task.created_at,
            updated_at: p.last_attempt_at,
            dispatched_at: None,
        });

        let working = reg.working.values().map(|w| TaskInfo {
            id: w.task.id,
            collection_name: w.task.collection_name.clone(),
            partition_name: w.task.partition_name.clone(),
            files: w.task.files.clone(),
            state: w.state,
            row_count: w.row_count,
            dispatched: true,
            dispatch_attempts: w.dispatch_attempts,
            node_id: w.node_id.clone(),
            error: w.error.clone(),
            created_at: w.task.created_at,
            updated_at: w.updated_at,
            dispatched_at: Some(w.dispatched_at),
        });

        let mut out: Vec<TaskInfo> = pending.chain(working).collect();
        out.sort_by_key(|t| t.id);
        out
    }

    pub fn pending_count(&self) -> usize {
        self.registries().pending.len()
    }

    pub fn working_count(&self) -> usize {
        self.registries().working.len()
    }

    #[cfg(test)]
    /// Ids en (pending, working), ordenados, leídos bajo un mismo lock.
    pub fn task_ids(&self) -> (Vec<TaskId>, Vec<TaskId>) {
        let reg = self.registries();
        let mut pending: Vec<TaskId> = reg.pending.keys().copied().collect();
        let mut working: Vec<TaskId> = reg.working.keys().copied().collect();
        pending.sort_unstable();
        working.sort_unstable();
        (pending, working)
    }
}
