//! Reconciliation callbacks that keep a process object's child running.

use std::time::Duration;

use async_trait::async_trait;

use crate::api::{Controller, Object, ReconcileError};
use crate::process::runner::{ProcessError, Runner};
use crate::process::schema::{Specification, Status};

/// How long a child gets to exit on interrupt before it is killed.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);

/// Drives a [`Runner`] toward a process object's specification: starts the
/// child whenever it is not running and reports pid/exit-code observations
/// as the object's status.
#[derive(Debug, Default)]
pub struct ProcessController;

impl ProcessController {
    /// A new controller.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Controller<Specification, Status> for ProcessController {
    type Instance = Runner;

    async fn init_instance(
        &self,
        object: &Object<Specification, Status>,
    ) -> anyhow::Result<Runner> {
        let execution = &object.specification.execution;

        let mut runner = Runner::new(&execution.executable_path)
            .with_args(execution.arguments.clone())
            .with_envs(execution.environment_variables.clone());
        if let Some(working_dir) = &execution.working_dir {
            runner = runner.with_working_dir(working_dir);
        }

        Ok(runner)
    }

    async fn reconcile_instance(
        &self,
        _object: &Object<Specification, Status>,
        runner: &mut Runner,
    ) -> Result<Option<Status>, ReconcileError<Status>> {
        let mut status = Status::default();

        if runner.is_running() {
            status.is_running = true;
            status.process_id = runner.get_pid().unwrap_or_default();
        } else {
            status.exit_code = runner.get_exit_code().unwrap_or_default();
        }

        if !runner.is_running() {
            if let Err(error) = runner.start() {
                status.error = error.to_string();
                return Err(ReconcileError::with_status(status, error.into()));
            }
        }

        Ok(Some(status))
    }

    async fn shutdown_instance(&self, runner: &mut Runner) -> anyhow::Result<()> {
        match runner.stop(SHUTDOWN_DEADLINE).await {
            // A child that already exited has converged to "not running".
            Err(ProcessError::ProcessIsNotRunning) | Ok(()) => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::api::{Metadata, ObjectName};
    use crate::process::schema::ExecutionSpecification;

    fn process_object(executable_path: &str, arguments: &[&str]) -> Object<Specification, Status> {
        Object {
            metadata: Metadata::named(ObjectName::from("test")),
            specification: Specification {
                execution: ExecutionSpecification {
                    executable_path: PathBuf::from(executable_path),
                    arguments: arguments.iter().map(ToString::to_string).collect(),
                    working_dir: None,
                    environment_variables: Default::default(),
                },
            },
            status: None,
        }
    }

    #[cfg_attr(miri, ignore)] // Miri can't spawn processes
    #[tokio::test]
    async fn test_reconcile_starts_the_process_and_reports_it() {
        let controller = ProcessController::new();
        let object = process_object("/bin/sh", &["-c", "sleep 0.5"]);

        let mut runner = controller.init_instance(&object).await.unwrap();

        // First pass observes a stopped process and starts it.
        let status = controller
            .reconcile_instance(&object, &mut runner)
            .await
            .unwrap()
            .unwrap();
        assert!(!status.is_running);
        assert_eq!(status.process_id, 0);
        assert_eq!(status.exit_code, 0);
        assert!(status.error.is_empty());

        // Second pass sees it running.
        let status = controller
            .reconcile_instance(&object, &mut runner)
            .await
            .unwrap()
            .unwrap();
        assert!(status.is_running);
        assert_ne!(status.process_id, 0);

        controller.shutdown_instance(&mut runner).await.unwrap();
        assert!(!runner.is_running());
    }

    #[cfg_attr(miri, ignore)]
    #[tokio::test]
    async fn test_reconcile_reports_the_exit_code_after_completion() {
        let controller = ProcessController::new();
        let object = process_object("/bin/sh", &["-c", "exit 5"]);

        let mut runner = controller.init_instance(&object).await.unwrap();
        runner.start().unwrap();
        runner.wait().await.unwrap();

        let status = controller
            .reconcile_instance(&object, &mut runner)
            .await
            .unwrap()
            .unwrap();
        assert!(!status.is_running);
        assert_eq!(status.exit_code, 5);
    }

    #[cfg_attr(miri, ignore)]
    #[tokio::test]
    async fn test_reconcile_surfaces_start_failures_in_the_status() {
        let controller = ProcessController::new();
        let object = process_object("/bin/non-existing-executable", &[]);

        let mut runner = controller.init_instance(&object).await.unwrap();

        let error = controller
            .reconcile_instance(&object, &mut runner)
            .await
            .unwrap_err();
        assert!(error
            .to_string()
            .to_lowercase()
            .contains("no such file or directory"));

        let status = error.status.unwrap();
        assert!(!status.is_running);
        assert!(status
            .error
            .to_lowercase()
            .contains("no such file or directory"));
    }

    #[cfg_attr(miri, ignore)]
    #[tokio::test]
    async fn test_shutdown_accepts_an_already_stopped_process() {
        let controller = ProcessController::new();
        let object = process_object("/bin/sh", &["-c", "exit 0"]);

        let mut runner = controller.init_instance(&object).await.unwrap();
        runner.start().unwrap();
        runner.wait().await.unwrap();

        controller.shutdown_instance(&mut runner).await.unwrap();
    }
}
