//! Per-object reconciliation: binds a [`Controller`] to a background task
//! that drives an opaque runtime instance toward the object's specification.
//!
//! The shared tick channel is the only scheduling signal. Every phase —
//! instance initialization, reconcile, shutdown, prune — makes one attempt
//! per tick and retries indefinitely on failure; nothing is surfaced to a
//! caller. Closing the tick channel terminates every task at its next phase
//! boundary.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::api::error::ApiError;
use crate::api::object::{Object, ObjectName, Specification, Status};
use crate::api::service::{HookKind, Service, ServiceBuilder};
use crate::api::store::Query;

/// A failed reconcile attempt.
///
/// Carries the status snapshot observed at failure time alongside the error
/// itself. The reconciler logs the error and retries; the snapshot is never
/// written back (a failed attempt must not update the status), but direct
/// callers can still inspect what the controller saw.
#[derive(Debug, thiserror::Error)]
#[error("{cause}")]
pub struct ReconcileError<St> {
    /// Status observed when the attempt failed.
    pub status: Option<St>,
    /// The failure itself.
    pub cause: anyhow::Error,
}

impl<St> ReconcileError<St> {
    /// A failure without an observed status.
    #[must_use]
    pub fn new(cause: anyhow::Error) -> Self {
        Self {
            status: None,
            cause,
        }
    }

    /// A failure carrying the status observed at failure time.
    #[must_use]
    pub fn with_status(status: St, cause: anyhow::Error) -> Self {
        Self {
            status: Some(status),
            cause,
        }
    }
}

/// Callbacks that drive one object's runtime instance.
///
/// `init_instance` builds the private per-object instance, `reconcile_instance`
/// converges it toward the current specification and reports the observed
/// status, and `shutdown_instance` tears it down once the object is deleted.
/// Every callback may fail; the reconciler retries it on the next tick.
#[async_trait]
pub trait Controller<S: Specification, St: Status>: Send + Sync + 'static {
    /// The opaque per-object runtime state owned by the reconciler.
    type Instance: Send + 'static;

    /// Builds the instance for a freshly created object.
    async fn init_instance(&self, object: &Object<S, St>) -> anyhow::Result<Self::Instance>;

    /// Drives the instance toward the object's specification. Returning
    /// `Some` status makes the reconciler write it back.
    async fn reconcile_instance(
        &self,
        object: &Object<S, St>,
        instance: &mut Self::Instance,
    ) -> Result<Option<St>, ReconcileError<St>>;

    /// Tears the instance down after the object was deleted.
    async fn shutdown_instance(&self, instance: &mut Self::Instance) -> anyhow::Result<()>;
}

#[async_trait]
impl<S, St, C> Controller<S, St> for Arc<C>
where
    S: Specification,
    St: Status,
    C: Controller<S, St>,
{
    type Instance = C::Instance;

    async fn init_instance(&self, object: &Object<S, St>) -> anyhow::Result<Self::Instance> {
        (**self).init_instance(object).await
    }

    async fn reconcile_instance(
        &self,
        object: &Object<S, St>,
        instance: &mut Self::Instance,
    ) -> Result<Option<St>, ReconcileError<St>> {
        (**self).reconcile_instance(object, instance).await
    }

    async fn shutdown_instance(&self, instance: &mut Self::Instance) -> anyhow::Result<()> {
        (**self).shutdown_instance(instance).await
    }
}

/// The shared tick channel driving reconciler tasks. One send reaches every
/// subscribed task.
pub type TickSender = broadcast::Sender<Instant>;

impl<S: Specification, St: Status> ServiceBuilder<S, St> {
    /// Registers an after-create hook that spawns the per-object reconciler
    /// task, driven by the given tick channel.
    ///
    /// The task subscribes to the channel before `create` returns, so no
    /// tick sent afterwards is missed. The service keeps only a receiver
    /// handle: once every sender is dropped, the channel closes and the
    /// tasks terminate. Spawning requires a running tokio runtime at
    /// `create` time.
    #[must_use]
    pub fn with_controller<C>(self, controller: C, ticks: TickSender) -> Self
    where
        C: Controller<S, St>,
    {
        self.deferred(move |service, weak| {
            let controller = Arc::new(controller);
            let ticks = ticks.subscribe();
            service.attach_hook(
                HookKind::AfterCreate,
                Box::new(move |_old, new| {
                    let Some(object) = new else {
                        return Ok(());
                    };
                    let Some(service) = weak.upgrade() else {
                        return Ok(());
                    };

                    let name = object.metadata.name.clone();
                    let receiver = ticks.resubscribe();
                    let controller = Arc::clone(&controller);

                    tokio::spawn(reconcile_task(service, controller, name, receiver));

                    Ok(())
                }),
            );
        })
    }
}

/// Receives the next tick, skipping over lag. `None` means the channel
/// closed and the task must terminate.
async fn next_tick(ticks: &mut broadcast::Receiver<Instant>) -> Option<Instant> {
    loop {
        match ticks.recv().await {
            Ok(tick) => return Some(tick),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                debug!(missed, "tick receiver lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

async fn reconcile_task<S, St, C>(
    service: Arc<Service<S, St>>,
    controller: Arc<C>,
    name: ObjectName,
    mut ticks: broadcast::Receiver<Instant>,
) where
    S: Specification,
    St: Status,
    C: Controller<S, St>,
{
    debug!(object = %name, "reconciler started");
    let query = Query::new().with_deleted();

    // Init phase. An object deleted before its instance exists has nothing
    // to shut down, so the task falls through straight to pruning.
    let mut instance = loop {
        if next_tick(&mut ticks).await.is_none() {
            debug!(object = %name, "tick channel closed, reconciler terminating");
            return;
        }

        match service.get(name.clone(), &query) {
            Ok(object) if object.is_deleted() => break None,
            Ok(object) => match controller.init_instance(&object).await {
                Ok(instance) => break Some(instance),
                Err(error) => {
                    warn!(object = %name, error = %error, "failed to initialize instance, retrying");
                }
            },
            Err(error) if error.api() == Some(ApiError::ObjectNotFound) => break None,
            Err(error) => {
                warn!(object = %name, error = %error, "failed to read object, retrying");
            }
        }
    };

    if let Some(instance) = instance.as_mut() {
        debug!(object = %name, "instance initialized");

        // Reconcile phase: runs until the object is deleted or pruned by
        // another actor.
        loop {
            if next_tick(&mut ticks).await.is_none() {
                debug!(object = %name, "tick channel closed, reconciler terminating");
                return;
            }

            let object = match service.get(name.clone(), &query) {
                Ok(object) if object.is_deleted() => break,
                Ok(object) => object,
                Err(error) if error.api() == Some(ApiError::ObjectNotFound) => break,
                Err(error) => {
                    warn!(object = %name, error = %error, "failed to read object, retrying");
                    continue;
                }
            };

            let status = match controller.reconcile_instance(&object, instance).await {
                Ok(status) => status,
                Err(error) => {
                    warn!(object = %name, error = %error.cause, "failed to reconcile instance, retrying");
                    continue;
                }
            };

            if let Some(status) = status {
                if let Err(error) = service.update_status(name.clone(), status) {
                    warn!(object = %name, error = %error, "failed to update status, retrying");
                }
            }
        }

        // Shutdown phase.
        loop {
            if next_tick(&mut ticks).await.is_none() {
                debug!(object = %name, "tick channel closed, reconciler terminating");
                return;
            }

            match controller.shutdown_instance(instance).await {
                Ok(()) => break,
                Err(error) => {
                    warn!(object = %name, error = %error, "failed to shut down instance, retrying");
                }
            }
        }
        debug!(object = %name, "instance shut down");
    }

    // Prune phase: a missing object means another actor pruned it first.
    loop {
        if next_tick(&mut ticks).await.is_none() {
            debug!(object = %name, "tick channel closed, reconciler terminating");
            return;
        }

        match service.prune(name.clone()) {
            Ok(()) => break,
            Err(error) if error.api() == Some(ApiError::ObjectNotFound) => break,
            Err(error) => {
                warn!(object = %name, error = %error, "failed to prune object, retrying");
            }
        }
    }

    debug!(object = %name, "reconciler finished");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::api::testing::{self, TestSpec, TestStatus};

    /// Controller that fails a configurable number of times per phase and
    /// mirrors its instance into a cell the test can observe.
    #[derive(Default)]
    struct RetryController {
        required_init_retries: AtomicUsize,
        required_reconcile_retries: AtomicUsize,
        required_shutdown_retries: AtomicUsize,
        initialized: AtomicBool,
        reconciled: AtomicBool,
        finished: AtomicBool,
        instance: Arc<Mutex<String>>,
    }

    impl RetryController {
        fn with_retries(init: usize, reconcile: usize, shutdown: usize) -> Arc<Self> {
            let controller = Self::default();
            controller.required_init_retries.store(init, Ordering::SeqCst);
            controller
                .required_reconcile_retries
                .store(reconcile, Ordering::SeqCst);
            controller
                .required_shutdown_retries
                .store(shutdown, Ordering::SeqCst);
            Arc::new(controller)
        }

        fn consume(counter: &AtomicUsize) -> bool {
            counter
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                    remaining.checked_sub(1)
                })
                .is_ok()
        }

        fn instance_contents(&self) -> String {
            self.instance.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Controller<TestSpec, TestStatus> for RetryController {
        type Instance = Arc<Mutex<String>>;

        async fn init_instance(
            &self,
            _object: &Object<TestSpec, TestStatus>,
        ) -> anyhow::Result<Self::Instance> {
            if Self::consume(&self.required_init_retries) {
                anyhow::bail!("init error");
            }

            self.initialized.store(true, Ordering::SeqCst);
            Ok(Arc::clone(&self.instance))
        }

        async fn reconcile_instance(
            &self,
            object: &Object<TestSpec, TestStatus>,
            instance: &mut Self::Instance,
        ) -> Result<Option<TestStatus>, ReconcileError<TestStatus>> {
            if Self::consume(&self.required_reconcile_retries) {
                return Err(ReconcileError::new(anyhow::anyhow!("reconcile error")));
            }

            let mut contents = instance.lock().unwrap();
            *contents = object.specification.foo.clone();
            self.reconciled.store(true, Ordering::SeqCst);

            Ok(Some(TestStatus::with_foo(&contents)))
        }

        async fn shutdown_instance(&self, instance: &mut Self::Instance) -> anyhow::Result<()> {
            if Self::consume(&self.required_shutdown_retries) {
                anyhow::bail!("shutdown error");
            }

            instance.lock().unwrap().clear();
            self.finished.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn send_ticks(ticks: &TickSender, count: usize) {
        for _ in 0..count {
            let _ = ticks.send(Instant::now());
        }
        // Let the reconciler drain the channel.
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_reconciler_retries_every_phase_once_per_tick() {
        let (ticks, _guard) = broadcast::channel(16);
        let controller = RetryController::with_retries(1, 1, 1);

        let service = testing::service_builder()
            .with_controller(Arc::clone(&controller), ticks.clone())
            .build();

        let created = service.create("foo", TestSpec::with_foo("bar")).unwrap();
        assert!(created.status.is_none());

        // Tick 1 burns the init retry, tick 2 initializes; reconcile has not
        // run yet.
        send_ticks(&ticks, 2).await;
        assert!(controller.initialized.load(Ordering::SeqCst));
        assert!(!controller.reconciled.load(Ordering::SeqCst));
        assert!(!controller.finished.load(Ordering::SeqCst));
        assert_eq!(controller.instance_contents(), "");

        // Tick 3 burns the reconcile retry, tick 4 reconciles and writes the
        // status back.
        send_ticks(&ticks, 2).await;
        assert!(controller.reconciled.load(Ordering::SeqCst));
        assert!(!controller.finished.load(Ordering::SeqCst));
        assert_eq!(controller.instance_contents(), "bar");

        let object = service.get("foo", &Query::new()).unwrap();
        assert_eq!(object.status, Some(TestStatus::with_foo("bar")));

        // Deletion: one tick to observe the tombstone, one to burn the
        // shutdown retry, one to shut down.
        service.delete("foo").unwrap();
        send_ticks(&ticks, 3).await;
        assert!(controller.finished.load(Ordering::SeqCst));
        assert_eq!(controller.instance_contents(), "");

        // One more tick prunes the tombstone.
        send_ticks(&ticks, 1).await;
        let gone = service.get("foo", &Query::new().with_deleted());
        assert_eq!(gone.unwrap_err().api(), Some(ApiError::ObjectNotFound));
    }

    #[tokio::test]
    async fn test_object_deleted_during_init_is_pruned_without_shutdown() {
        let (ticks, _guard) = broadcast::channel(16);
        // Init would need five ticks; the object is deleted long before.
        let controller = RetryController::with_retries(5, 0, 0);

        let service = testing::service_builder()
            .with_controller(Arc::clone(&controller), ticks.clone())
            .build();

        service.create("foo", TestSpec::with_foo("bar")).unwrap();
        send_ticks(&ticks, 1).await;

        service.delete("foo").unwrap();
        send_ticks(&ticks, 2).await;

        assert!(!controller.initialized.load(Ordering::SeqCst));
        assert!(!controller.finished.load(Ordering::SeqCst));
        let gone = service.get("foo", &Query::new().with_deleted());
        assert_eq!(gone.unwrap_err().api(), Some(ApiError::ObjectNotFound));
    }

    #[tokio::test]
    async fn test_closing_the_tick_channel_terminates_the_task() {
        let (ticks, guard) = broadcast::channel(16);
        let controller = RetryController::with_retries(0, 0, 0);

        let service = testing::service_builder()
            .with_controller(Arc::clone(&controller), ticks.clone())
            .build();

        service.create("foo", TestSpec::with_foo("bar")).unwrap();
        send_ticks(&ticks, 2).await;
        assert!(controller.reconciled.load(Ordering::SeqCst));

        // Dropping every sender half stops the loop without shutdown.
        drop(ticks);
        drop(guard);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!controller.finished.load(Ordering::SeqCst));
        assert!(service.get("foo", &Query::new()).is_ok());
    }
}
