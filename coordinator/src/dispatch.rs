use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::{ErrorCode, ImportTask, Status};
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Ruta del worker que recibe tareas de importación.
pub const WORKER_IMPORT_PATH: &str = "/api/v1/import/tasks";

/// Entrega una tarea a algún worker. Puede fallar de forma transitoria;
/// el fallo se devuelve como Status, nunca como panic.
/// Si `cancel` se dispara durante la entrega, se corta y se devuelve error.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, cancel: &CancellationToken, task: &ImportTask) -> Status;
}

/// Dispatcher HTTP: hace POST de la tarea a los workers configurados, en round-robin.
pub struct HttpDispatcher {
    client: Client,
    worker_urls: Vec<String>,
    rr_cursor: AtomicUsize,
}

impl HttpDispatcher {
    pub fn new(worker_urls: Vec<String>, timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            worker_urls,
            rr_cursor: AtomicUsize::new(0),
        })
    }

    fn next_worker(&self) -> Option<&str> {
        if self.worker_urls.is_empty() {
            return None;
        }
        let i = self.rr_cursor.fetch_add(1, Ordering::Relaxed) % self.worker_urls.len();
        Some(self.worker_urls[i].as_str())
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn dispatch(&self, cancel: &CancellationToken, task: &ImportTask) -> Status {
        let Some(base_url) = self.next_worker() else {
            return Status::error(ErrorCode::UnexpectedError, "no workers configured");
        };

        let url = format!("{}{}", base_url, WORKER_IMPORT_PATH);
        debug!("despachando tarea {} a {}", task.id, url);

        let sent = tokio::select! {
            _ = cancel.cancelled() => {
                warn!("dispatch de la tarea {} cancelado", task.id);
                return Status::error(ErrorCode::UnexpectedError, "dispatch cancelled");
            }
            sent = self.client.post(&url).json(task).send() => sent,
        };

        match sent {
            Ok(resp) if resp.status().is_success() => Status::success(),
            Ok(resp) => {
                warn!(
                    "worker {} rechazó la tarea {} (status {})",
                    base_url,
                    task.id,
                    resp.status()
                );
                Status::error(
                    ErrorCode::UnexpectedError,
                    format!("worker {} answered {}", base_url, resp.status()),
                )
            }
            Err(e) => {
                warn!("error HTTP despachando tarea {} a {}: {:?}", task.id, base_url, e);
                Status::error(
                    ErrorCode::UnexpectedError,
                    format!("worker {} unreachable: {}", base_url, e),
                )
            }
        }
    }
}
