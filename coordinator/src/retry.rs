use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::manager::ImportManager;

/// Loop de reintentos en segundo plano:
/// cada `every` vuelve a despachar lo que quedó en pending.
/// Termina cuando se cancela `cancel`.
pub async fn run_retry_loop(
    manager: Arc<ImportManager>,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // el primer tick es inmediato; lo consumimos para esperar un intervalo completo
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("sweep de reintentos detenido");
                return;
            }
            _ = ticker.tick() => {}
        }

        let summary = manager.retry_pending(&cancel).await;
        if summary.attempted > 0 {
            info!(
                "sweep de reintentos: {} intentadas, {} despachadas, {} siguen en pending",
                summary.attempted, summary.dispatched, summary.still_pending
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Dispatcher;
    use crate::store::TaskStore;
    use async_trait::async_trait;
    use common::{ErrorCode, ImportRequest, ImportTask, Status};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Falla las primeras `failures` llamadas.
    struct FlakyDispatcher {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Dispatcher for FlakyDispatcher {
        async fn dispatch(&self, _cancel: &CancellationToken, _task: &ImportTask) -> Status {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                Status::error(ErrorCode::UnexpectedError, "timeout")
            } else {
                Status::success()
            }
        }
    }

    #[tokio::test]
    async fn el_loop_despacha_las_pendientes_y_para_al_cancelar() {
        let dispatcher: Arc<dyn Dispatcher> = Arc::new(FlakyDispatcher {
            failures: 2,
            calls: AtomicUsize::new(0),
        });
        let mgr = Arc::new(ImportManager::new(TaskStore::new(), None, Some(dispatcher)));
        let cancel = CancellationToken::new();

        let req = ImportRequest {
            collection_name: "c1".to_string(),
            partition_name: "p1".to_string(),
            row_based: true,
            files: vec!["f1".to_string(), "f2".to_string()],
            options: HashMap::new(),
        };
        mgr.import_job(&cancel, Some(&req)).await;
        assert_eq!(mgr.store().pending_count(), 2);

        let handle = tokio::spawn(run_retry_loop(
            mgr.clone(),
            Duration::from_millis(20),
            cancel.clone(),
        ));

        let mut waited = 0;
        while mgr.store().pending_count() > 0 && waited < 100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            waited += 1;
        }

        assert_eq!(mgr.store().pending_count(), 0);
        assert_eq!(mgr.store().working_count(), 2);

        cancel.cancel();
        handle.await.unwrap();
    }
}
