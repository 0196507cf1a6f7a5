//! Lifecycle orchestration over an object store.
//!
//! The service runs every operation through the same pipeline: mutators
//! rewrite the inbound object, a pre-store hook may veto the operation, the
//! store applies the mutation, and post-store hooks observe the result. A
//! pre-store hook failure aborts the operation before the store is touched; a
//! post-store hook failure surfaces to the caller but the mutation stands.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::api::error::ServiceError;
use crate::api::object::{Metadata, Object, ObjectName, Specification, Status};
use crate::api::store::{ObjectStore, Query};

/// Positions at which a hook can be attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    /// Before the object is inserted; receives no old object.
    BeforeCreate,
    /// After the object is inserted; receives no old object.
    AfterCreate,
    /// Before a specification update is applied.
    BeforeSpecificationUpdate,
    /// After a specification update is applied.
    AfterSpecificationUpdate,
    /// Before a status update is applied.
    BeforeStatusUpdate,
    /// After a status update is applied.
    AfterStatusUpdate,
    /// Before the object is tombstoned; receives no new object.
    BeforeDelete,
    /// After the object is tombstoned; receives no new object.
    AfterDelete,
    /// Before the tombstone is removed; receives no new object.
    BeforePrune,
    /// After the tombstone is removed; receives no new object.
    AfterPrune,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BeforeCreate => "BeforeCreate",
            Self::AfterCreate => "AfterCreate",
            Self::BeforeSpecificationUpdate => "BeforeSpecificationUpdate",
            Self::AfterSpecificationUpdate => "AfterSpecificationUpdate",
            Self::BeforeStatusUpdate => "BeforeStatusUpdate",
            Self::AfterStatusUpdate => "AfterStatusUpdate",
            Self::BeforeDelete => "BeforeDelete",
            Self::AfterDelete => "AfterDelete",
            Self::BeforePrune => "BeforePrune",
            Self::AfterPrune => "AfterPrune",
        };
        f.write_str(name)
    }
}

/// Operations during which a mutator can rewrite the inbound object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutatorKind {
    /// While creating an object.
    WhileCreatingObject,
    /// While updating a specification.
    WhileUpdatingSpecification,
    /// While updating a status.
    WhileUpdatingStatus,
}

impl fmt::Display for MutatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::WhileCreatingObject => "WhileCreatingObject",
            Self::WhileUpdatingSpecification => "WhileUpdatingSpecification",
            Self::WhileUpdatingStatus => "WhileUpdatingStatus",
        };
        f.write_str(name)
    }
}

/// A validator/reactor attached to a lifecycle position.
///
/// Hooks receive snapshots detached from the store; depending on the kind
/// either side may be absent. Hooks may call back into the service (the store
/// lock is never held across a hook invocation).
pub type ServiceHook<S, St> = Box<
    dyn Fn(Option<&Object<S, St>>, Option<&Object<S, St>>) -> anyhow::Result<()> + Send + Sync,
>;

/// A rewriter for inbound objects. Mutators run in registration order, each
/// seeing the previous mutator's output.
pub type ServiceMutator<S, St> =
    Box<dyn Fn(Object<S, St>) -> anyhow::Result<Object<S, St>> + Send + Sync>;

type DeferredOpt<S, St> = Box<dyn FnOnce(&mut Service<S, St>, Weak<Service<S, St>>)>;

/// Lifecycle orchestrator over an [`ObjectStore`], with hook and mutator
/// extension points. Built once via [`Service::builder`] and shared as an
/// [`Arc`].
pub struct Service<S: Specification, St: Status> {
    store: Box<dyn ObjectStore<S, St>>,
    hooks: HashMap<HookKind, Vec<ServiceHook<S, St>>>,
    mutators: HashMap<MutatorKind, Vec<ServiceMutator<S, St>>>,
}

impl<S: Specification, St: Status> Service<S, St> {
    /// Starts building a service over the given store.
    #[must_use]
    pub fn builder(store: impl ObjectStore<S, St> + 'static) -> ServiceBuilder<S, St> {
        ServiceBuilder {
            store: Box::new(store),
            hooks: HashMap::new(),
            mutators: HashMap::new(),
            deferred: Vec::new(),
        }
    }

    /// Creates a new live object.
    ///
    /// # Errors
    ///
    /// Store errors keep their [`ApiError`](crate::api::ApiError) identity;
    /// mutator and hook failures are wrapped.
    pub fn create(
        &self,
        name: impl Into<ObjectName>,
        specification: S,
    ) -> Result<Object<S, St>, ServiceError> {
        let name = name.into();

        let provisional = Object {
            metadata: Metadata::named(name.clone()),
            specification,
            status: None,
        };
        let provisional = self.run_mutators(MutatorKind::WhileCreatingObject, provisional)?;

        self.call_hooks(HookKind::BeforeCreate, None, Some(&provisional))?;

        let created = self.store.create(name, provisional.specification)?;

        self.call_hooks(HookKind::AfterCreate, None, Some(&created))?;

        Ok(created)
    }

    /// Replaces the specification of a live object.
    ///
    /// # Errors
    ///
    /// See [`Service::create`].
    pub fn update_specification(
        &self,
        name: impl Into<ObjectName>,
        specification: S,
    ) -> Result<Object<S, St>, ServiceError> {
        let name = name.into();

        let old = self.store.get(&name, &Query::new())?;

        let mut proposed = old.clone();
        proposed.specification = specification;
        let proposed = self.run_mutators(MutatorKind::WhileUpdatingSpecification, proposed)?;

        self.call_hooks(
            HookKind::BeforeSpecificationUpdate,
            Some(&old),
            Some(&proposed),
        )?;

        let updated = self
            .store
            .update_specification(&name, proposed.specification)?;

        self.call_hooks(
            HookKind::AfterSpecificationUpdate,
            Some(&old),
            Some(&updated),
        )?;

        Ok(updated)
    }

    /// Replaces the status of a live object.
    ///
    /// # Errors
    ///
    /// See [`Service::create`].
    pub fn update_status(
        &self,
        name: impl Into<ObjectName>,
        status: St,
    ) -> Result<Object<S, St>, ServiceError> {
        let name = name.into();

        let old = self.store.get(&name, &Query::new())?;

        let mut proposed = old.clone();
        proposed.status = Some(status);
        let proposed = self.run_mutators(MutatorKind::WhileUpdatingStatus, proposed)?;

        self.call_hooks(HookKind::BeforeStatusUpdate, Some(&old), Some(&proposed))?;

        let Some(status) = proposed.status else {
            return Err(ServiceError::Mutator {
                kind: MutatorKind::WhileUpdatingStatus,
                cause: anyhow::anyhow!("mutator removed the status"),
            });
        };
        let updated = self.store.update_status(&name, status)?;

        self.call_hooks(HookKind::AfterStatusUpdate, Some(&old), Some(&updated))?;

        Ok(updated)
    }

    /// Reads an object through the store.
    ///
    /// # Errors
    ///
    /// [`ApiError::ObjectNotFound`](crate::api::ApiError::ObjectNotFound)
    /// under the query's visibility rules.
    pub fn get(
        &self,
        name: impl Into<ObjectName>,
        query: &Query,
    ) -> Result<Object<S, St>, ServiceError> {
        Ok(self.store.get(&name.into(), query)?)
    }

    /// Tombstones a live object and returns the tombstone.
    ///
    /// # Errors
    ///
    /// See [`Service::create`].
    pub fn delete(&self, name: impl Into<ObjectName>) -> Result<Object<S, St>, ServiceError> {
        let name = name.into();

        let old = self.store.get(&name, &Query::new().with_deleted())?;

        self.call_hooks(HookKind::BeforeDelete, Some(&old), None)?;

        let deleted = self.store.delete(&name)?;

        self.call_hooks(HookKind::AfterDelete, Some(&old), None)?;

        Ok(deleted)
    }

    /// Removes a tombstoned object from the store entirely.
    ///
    /// # Errors
    ///
    /// See [`Service::create`].
    pub fn prune(&self, name: impl Into<ObjectName>) -> Result<(), ServiceError> {
        let name = name.into();

        let old = self.store.get(&name, &Query::new().with_deleted())?;

        self.call_hooks(HookKind::BeforePrune, Some(&old), None)?;

        self.store.prune(&name)?;

        self.call_hooks(HookKind::AfterPrune, Some(&old), None)?;

        Ok(())
    }

    /// Lists object names through the store.
    #[must_use]
    pub fn find(&self, query: &Query) -> Vec<ObjectName> {
        self.store.find(query)
    }

    pub(crate) fn attach_hook(&mut self, kind: HookKind, hook: ServiceHook<S, St>) {
        self.hooks.entry(kind).or_default().push(hook);
    }

    fn call_hooks(
        &self,
        kind: HookKind,
        old: Option<&Object<S, St>>,
        new: Option<&Object<S, St>>,
    ) -> Result<(), ServiceError> {
        let Some(hooks) = self.hooks.get(&kind) else {
            return Ok(());
        };

        for hook in hooks {
            hook(old, new).map_err(|cause| ServiceError::from_hook(kind, cause))?;
        }

        Ok(())
    }

    fn run_mutators(
        &self,
        kind: MutatorKind,
        mut object: Object<S, St>,
    ) -> Result<Object<S, St>, ServiceError> {
        let Some(mutators) = self.mutators.get(&kind) else {
            return Ok(object);
        };

        for mutator in mutators {
            object = mutator(object).map_err(|cause| ServiceError::from_mutator(kind, cause))?;
        }

        Ok(object)
    }
}

impl<S: Specification, St: Status> fmt::Debug for Service<S, St> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("hooks", &self.hooks.keys())
            .field("mutators", &self.mutators.keys())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Service`].
pub struct ServiceBuilder<S: Specification, St: Status> {
    store: Box<dyn ObjectStore<S, St>>,
    hooks: HashMap<HookKind, Vec<ServiceHook<S, St>>>,
    mutators: HashMap<MutatorKind, Vec<ServiceMutator<S, St>>>,
    deferred: Vec<DeferredOpt<S, St>>,
}

impl<S: Specification, St: Status> ServiceBuilder<S, St> {
    /// Attaches a hook at the given lifecycle position.
    #[must_use]
    pub fn hook<F>(mut self, kind: HookKind, hook: F) -> Self
    where
        F: Fn(Option<&Object<S, St>>, Option<&Object<S, St>>) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.hooks.entry(kind).or_default().push(Box::new(hook));
        self
    }

    /// Attaches a mutator for the given operation.
    #[must_use]
    pub fn mutator<F>(mut self, kind: MutatorKind, mutator: F) -> Self
    where
        F: Fn(Object<S, St>) -> anyhow::Result<Object<S, St>> + Send + Sync + 'static,
    {
        self.mutators
            .entry(kind)
            .or_default()
            .push(Box::new(mutator));
        self
    }

    /// Defers an option until `build`, when a [`Weak`] handle to the service
    /// exists. Composite options that need to call back into the service
    /// (such as controllers) are wired this way.
    pub(crate) fn deferred(
        mut self,
        opt: impl FnOnce(&mut Service<S, St>, Weak<Service<S, St>>) + 'static,
    ) -> Self {
        self.deferred.push(Box::new(opt));
        self
    }

    /// Finishes the service.
    #[must_use]
    pub fn build(self) -> Arc<Service<S, St>> {
        let Self {
            store,
            hooks,
            mutators,
            deferred,
        } = self;

        Arc::new_cyclic(|weak| {
            let mut service = Service {
                store,
                hooks,
                mutators,
            };
            for opt in deferred {
                opt(&mut service, weak.clone());
            }
            service
        })
    }
}

impl<S: Specification, St: Status> fmt::Debug for ServiceBuilder<S, St> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceBuilder").finish_non_exhaustive()
    }
}
