use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use common::{
    ErrorCode, ImportRequest, ImportResponse, ImportResult, ImportTask, Status, TaskId, TaskInfo,
    TaskStateResponse,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::allocator::{IdAllocator, SequentialIdAllocator};
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::splitter::{self, TaskDescriptor};
use crate::store::TaskStore;

/// Resumen de una pasada del sweep de reintentos.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetrySummary {
    pub attempted: usize,
    pub dispatched: usize,
    pub still_pending: usize,
}

/// Orquesta los jobs de importación: parte el request, asigna ids,
/// despacha cada tarea y deja el resultado en el `TaskStore`.
pub struct ImportManager {
    store: TaskStore,
    id_allocator: Arc<dyn IdAllocator>,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    default_options: HashMap<String, String>,
    // una sola pasada de reintentos a la vez, para no despachar dos veces la misma tarea
    sweep_lock: Arc<tokio::sync::Mutex<()>>,
}

impl ImportManager {
    /// Sin allocator se usa un contador local desde 0.
    /// Sin dispatcher todos los jobs se rechazan.
    pub fn new(
        store: TaskStore,
        id_allocator: Option<Arc<dyn IdAllocator>>,
        dispatcher: Option<Arc<dyn Dispatcher>>,
    ) -> Self {
        let id_allocator =
            id_allocator.unwrap_or_else(|| Arc::new(SequentialIdAllocator::default()));
        Self {
            store,
            id_allocator,
            dispatcher,
            default_options: HashMap::new(),
            sweep_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn with_default_options(mut self, options: HashMap<String, String>) -> Self {
        self.default_options = options;
        self
    }

    #[cfg(test)]
    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    /// Crea y despacha las tareas de un job.
    ///
    /// El status de la respuesta refleja la validez del request: que una
    /// tarea no se pueda despachar no es un fallo del job, la tarea queda
    /// en pending y el sweep la reintenta. Si `cancel` se dispara a mitad
    /// del job, lo ya despachado se queda en working y el resto no se crea.
    ///
    /// El trabajo corre en su propia tarea de tokio: si quien llama suelta
    /// este future (cliente HTTP que se desconecta, timeout), el job sigue
    /// y cada tarea entregada a un worker termina registrada.
    pub async fn import_job(
        &self,
        cancel: &CancellationToken,
        req: Option<&ImportRequest>,
    ) -> ImportResponse {
        let Some(req) = req.filter(|r| !r.files.is_empty()) else {
            warn!("job de importación rechazado: request vacío o sin archivos");
            return rejected(
                ErrorCode::IllegalArgument,
                "import request is empty or has no files",
                Vec::new(),
            );
        };

        let Some(dispatcher) = self.dispatcher.clone() else {
            warn!(
                "job de importación para {}/{} rechazado: no hay dispatcher",
                req.collection_name, req.partition_name
            );
            return rejected(
                ErrorCode::UnexpectedError,
                "no dispatcher configured",
                Vec::new(),
            );
        };

        let descriptors = splitter::split(req, &self.default_options);
        info!(
            "job de importación para {}/{}: {} archivos -> {} tareas (row_based={})",
            req.collection_name,
            req.partition_name,
            req.files.len(),
            descriptors.len(),
            req.row_based
        );

        let job = dispatch_job(
            self.store.clone(),
            self.id_allocator.clone(),
            dispatcher,
            cancel.clone(),
            descriptors,
        );

        match tokio::spawn(job).await {
            Ok(resp) => resp,
            Err(e) => {
                warn!("el job de importación terminó con error: {}", e);
                rejected(
                    ErrorCode::UnexpectedError,
                    format!("import job aborted: {e}"),
                    Vec::new(),
                )
            }
        }
    }

    pub fn update_task_state(&self, report: &ImportResult) -> Result<()> {
        self.store.update_task_state(report)?;
        debug!(
            "tarea {} reportada como {:?} (rows={})",
            report.task_id, report.state, report.row_count
        );
        Ok(())
    }

    pub fn get_task_state(&self, id: TaskId) -> TaskStateResponse {
        self.store.get_task_state(id)
    }

    pub fn list_tasks(&self) -> Vec<TaskInfo> {
        self.store.list_tasks()
    }

    /// Una pasada de reintentos sobre pending, en orden de id.
    /// Lo que se despacha pasa a working; lo demás sigue en pending.
    /// Igual que `import_job`, la pasada sigue aunque se suelte el future.
    pub async fn retry_pending(&self, cancel: &CancellationToken) -> RetrySummary {
        let Some(dispatcher) = self.dispatcher.clone() else {
            return RetrySummary {
                still_pending: self.store.pending_count(),
                ..RetrySummary::default()
            };
        };

        let sweep = sweep_pending(
            self.store.clone(),
            dispatcher,
            cancel.clone(),
            self.sweep_lock.clone(),
        );

        match tokio::spawn(sweep).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!("el sweep de reintentos terminó con error: {}", e);
                RetrySummary {
                    still_pending: self.store.pending_count(),
                    ..RetrySummary::default()
                }
            }
        }
    }
}

async fn dispatch_job(
    store: TaskStore,
    id_allocator: Arc<dyn IdAllocator>,
    dispatcher: Arc<dyn Dispatcher>,
    cancel: CancellationToken,
    descriptors: Vec<TaskDescriptor>,
) -> ImportResponse {
    let mut created: Vec<TaskId> = Vec::with_capacity(descriptors.len());

    for desc in descriptors {
        if cancel.is_cancelled() {
            warn!(
                "job de importación cancelado tras crear {} tareas",
                created.len()
            );
            return rejected(ErrorCode::UnexpectedError, "import job cancelled", created);
        }

        let id = match id_allocator.allocate() {
            Ok(id) => id,
            Err(e) => {
                warn!("no se pudo asignar id de tarea: {}", e);
                return rejected(ErrorCode::UnexpectedError, e.to_string(), created);
            }
        };

        let task = build_task(id, desc);

        // sin lock: el store sólo se toca después de saber el resultado
        let status = dispatcher.dispatch(&cancel, &task).await;
        if status.is_success() {
            info!("tarea {} despachada ({} archivos)", id, task.files.len());
            store.add_working(task);
        } else {
            warn!(
                "no se pudo despachar la tarea {} ({:?}: {}), queda en pending",
                id, status.error_code, status.reason
            );
            store.add_pending(task, status.reason);
        }

        created.push(id);
    }

    ImportResponse {
        status: Status::success(),
        tasks: created,
    }
}

async fn sweep_pending(
    store: TaskStore,
    dispatcher: Arc<dyn Dispatcher>,
    cancel: CancellationToken,
    sweep_lock: Arc<tokio::sync::Mutex<()>>,
) -> RetrySummary {
    let _guard = sweep_lock.lock_owned().await;
    let mut summary = RetrySummary::default();

    for task in store.pending_tasks() {
        if cancel.is_cancelled() {
            break;
        }
        summary.attempted += 1;

        let status = dispatcher.dispatch(&cancel, &task).await;
        if status.is_success() {
            if store.promote(task.id) {
                info!("tarea {} despachada en reintento", task.id);
                summary.dispatched += 1;
            }
        } else if let Some(attempts) = store.record_dispatch_failure(task.id, status.reason) {
            debug!(
                "tarea {} sigue en pending tras {} intentos",
                task.id, attempts
            );
        }
    }

    summary.still_pending = store.pending_count();
    summary
}

fn build_task(id: TaskId, desc: TaskDescriptor) -> ImportTask {
    ImportTask {
        id,
        collection_name: desc.collection_name,
        partition_name: desc.partition_name,
        row_based: desc.row_based,
        files: desc.files,
        options: desc.options,
        created_at: Utc::now(),
    }
}

fn rejected(code: ErrorCode, reason: impl Into<String>, tasks: Vec<TaskId>) -> ImportResponse {
    ImportResponse {
        status: Status::error(code, reason),
        tasks,
    }
}
