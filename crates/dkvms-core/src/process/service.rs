//! Object service composition for managed processes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::api::{HookKind, MemoryObjectStore, Service, TickSender};
use crate::process::controller::ProcessController;
use crate::process::schema::{Specification, Status};

/// Interval at which every process reconciler makes its next attempt.
const RECONCILE_TICK: Duration = Duration::from_millis(200);

/// The process object service: an in-memory store with immutable
/// specifications, an executable-path admission check, and a
/// [`ProcessController`] reconciling every object on a 200 ms tick.
///
/// Dropping the service stops the ticker and closes the tick channel, which
/// terminates every reconciler at its next phase boundary.
#[derive(Debug)]
pub struct ProcessService {
    service: Arc<Service<Specification, Status>>,
    _ticks: TickSender,
    ticker: JoinHandle<()>,
}

impl ProcessService {
    /// Composes the service. Must be called within a tokio runtime; the
    /// ticker task and the per-object reconcilers are spawned onto it.
    #[must_use]
    pub fn new() -> Self {
        let (ticks, _) = broadcast::channel(16);

        let service = Service::builder(MemoryObjectStore::<Specification, Status>::new())
            .with_defaults()
            .with_immutable_specification()
            .hook(HookKind::BeforeCreate, |_old, new| {
                let Some(object) = new else {
                    return Ok(());
                };
                let path = &object.specification.execution.executable_path;
                std::fs::metadata(path)
                    .map_err(|error| anyhow::anyhow!("{}: {error}", path.display()))?;
                Ok(())
            })
            .with_controller(ProcessController::new(), ticks.clone())
            .build();

        let sender = ticks.clone();
        let ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(RECONCILE_TICK);
            loop {
                interval.tick().await;
                // No receivers just means no reconcilers are alive yet.
                let _ = sender.send(Instant::now());
            }
        });

        debug!(tick = ?RECONCILE_TICK, "process service ready");

        Self {
            service,
            _ticks: ticks,
            ticker,
        }
    }

    /// The underlying object service.
    #[must_use]
    pub fn service(&self) -> &Arc<Service<Specification, Status>> {
        &self.service
    }
}

impl Default for ProcessService {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProcessService {
    fn drop(&mut self) {
        self.ticker.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use super::*;
    use crate::api::{ApiError, Query};
    use crate::process::schema::ExecutionSpecification;

    fn sh_specification(script: &str) -> Specification {
        Specification {
            execution: ExecutionSpecification {
                executable_path: PathBuf::from("/bin/sh"),
                arguments: vec![String::from("-c"), String::from(script)],
                working_dir: None,
                environment_variables: Default::default(),
            },
        }
    }

    #[cfg_attr(miri, ignore)] // Miri can't spawn processes
    #[tokio::test]
    async fn test_create_rejects_a_missing_executable() {
        let processes = ProcessService::new();

        let specification = Specification {
            execution: ExecutionSpecification {
                executable_path: PathBuf::from("/bin/non-existing-executable"),
                ..Default::default()
            },
        };

        let error = processes
            .service()
            .create("non-existing", specification)
            .unwrap_err();
        assert!(error
            .to_string()
            .to_lowercase()
            .contains("no such file or directory"));

        let missing = processes.service().get("non-existing", &Query::new());
        assert_eq!(missing.unwrap_err().api(), Some(ApiError::ObjectNotFound));
    }

    #[cfg_attr(miri, ignore)]
    #[tokio::test]
    async fn test_create_accepts_an_existing_executable() {
        let processes = ProcessService::new();

        let created = processes
            .service()
            .create("existing", sh_specification("echo 'hello world'"));
        assert!(created.is_ok());
    }

    #[cfg_attr(miri, ignore)]
    #[tokio::test]
    async fn test_specification_is_immutable() {
        let processes = ProcessService::new();

        processes
            .service()
            .create("foo", sh_specification("sleep 10"))
            .unwrap();

        let result = processes
            .service()
            .update_specification("foo", sh_specification("sleep 20"));
        assert_eq!(
            result.unwrap_err().api(),
            Some(ApiError::ObjectSpecificationIsImmutable)
        );
    }

    #[cfg_attr(miri, ignore)]
    #[tokio::test]
    async fn test_reconciles_a_process_from_creation_to_prune() {
        let processes = ProcessService::new();

        processes
            .service()
            .create("worker", sh_specification("sleep 10"))
            .unwrap();

        // Init and the first reconcile each take one 200 ms tick.
        tokio::time::sleep(Duration::from_secs(1)).await;

        let object = processes
            .service()
            .get("worker", &Query::new())
            .unwrap();
        let status = object.status.expect("status written by the reconciler");
        assert!(status.is_running);
        assert_ne!(status.process_id, 0);

        processes.service().delete("worker").unwrap();

        // Tombstone observation, shutdown, and prune each take a tick.
        tokio::time::sleep(Duration::from_secs(2)).await;

        let gone = processes
            .service()
            .get("worker", &Query::new().with_deleted());
        assert_eq!(gone.unwrap_err().api(), Some(ApiError::ObjectNotFound));
    }
}
