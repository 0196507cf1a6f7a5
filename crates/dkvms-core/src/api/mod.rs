//! Generic declarative object service.
//!
//! Objects pair an authored specification with a controller-written status
//! under a unique name. The [`Service`] orchestrates their lifecycle over an
//! [`ObjectStore`] — create, update, soft delete, prune — with mutator and
//! hook extension points, and [`ServiceBuilder::with_controller`] binds a
//! [`Controller`] that reconciles each object's runtime instance in a
//! background task.

mod controller;
mod defaults;
mod error;
mod immutable;
mod memory;
mod object;
mod service;
mod store;
#[cfg(test)]
pub(crate) mod testing;
mod timestamp;

pub use controller::{Controller, ReconcileError, TickSender};
pub use defaults::FillDefaults;
pub use error::{ApiError, ServiceError};
pub use memory::MemoryObjectStore;
pub use object::{
    Metadata, Object, ObjectId, ObjectKind, ObjectName, ObjectRef, Specification, Status,
};
pub use service::{
    HookKind, MutatorKind, Service, ServiceBuilder, ServiceHook, ServiceMutator,
};
pub use store::{Event, EventKind, EventStore, ObjectStore, Query};
pub use timestamp::Timestamp;
