//! Object store contract and composable query options.

use std::sync::Arc;

use crate::api::error::ApiError;
use crate::api::object::{Object, ObjectName, ObjectRef, Specification, Status};

/// Composable options for store reads.
///
/// The default query excludes tombstoned objects and applies no name filter.
#[derive(Debug, Clone, Default)]
pub struct Query {
    with_deleted: bool,
    name_filter: Option<String>,
}

impl Query {
    /// A query with the default visibility rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Includes tombstoned objects in the result set.
    #[must_use]
    pub fn with_deleted(mut self) -> Self {
        self.with_deleted = true;
        self
    }

    /// Restricts the result set to an exact object name.
    #[must_use]
    pub fn where_name(mut self, name: impl Into<String>) -> Self {
        self.name_filter = Some(name.into());
        self
    }

    /// Whether tombstones are visible through this query.
    #[must_use]
    pub fn includes_deleted(&self) -> bool {
        self.with_deleted
    }

    /// Whether the name filter (if any) accepts the given name.
    #[must_use]
    pub fn matches_name(&self, name: &ObjectName) -> bool {
        match &self.name_filter {
            Some(filter) => filter == name.as_str(),
            None => true,
        }
    }
}

/// A keyed backing for [`Object`]s, addressed by [`ObjectName`].
///
/// Implementations must be safe for concurrent callers and must uphold the
/// copy discipline: every inbound payload is captured by value, every
/// outbound object is detached from internal state, and mutating either side
/// after the call never affects the other.
pub trait ObjectStore<S: Specification, St: Status>: Send + Sync {
    /// Inserts a new live object.
    ///
    /// # Errors
    ///
    /// [`ApiError::ObjectWithNameAlreadyExists`] when a live object owns the
    /// name, [`ApiError::DeletedObjectWithNameAlreadyExists`] when a
    /// tombstoned one does.
    fn create(&self, name: ObjectName, specification: S) -> Result<Object<S, St>, ApiError>;

    /// Replaces the specification of a live object and stamps
    /// `specification_updated_at`.
    ///
    /// # Errors
    ///
    /// [`ApiError::ObjectNotFound`] when the name is absent or tombstoned.
    fn update_specification(
        &self,
        name: &ObjectName,
        specification: S,
    ) -> Result<Object<S, St>, ApiError>;

    /// Replaces the status of a live object and stamps `status_updated_at`.
    ///
    /// # Errors
    ///
    /// [`ApiError::ObjectNotFound`] when the name is absent or tombstoned.
    fn update_status(&self, name: &ObjectName, status: St) -> Result<Object<S, St>, ApiError>;

    /// Reads an object.
    ///
    /// # Errors
    ///
    /// [`ApiError::ObjectNotFound`] when the name is absent, or tombstoned
    /// without [`Query::with_deleted`].
    fn get(&self, name: &ObjectName, query: &Query) -> Result<Object<S, St>, ApiError>;

    /// Tombstones a live object and returns the tombstone.
    ///
    /// # Errors
    ///
    /// [`ApiError::ObjectNotFound`] when absent,
    /// [`ApiError::ObjectAlreadyDeleted`] when already tombstoned.
    fn delete(&self, name: &ObjectName) -> Result<Object<S, St>, ApiError>;

    /// Removes a tombstoned object entirely; the name becomes free again.
    ///
    /// # Errors
    ///
    /// [`ApiError::ObjectNotFound`] when absent, [`ApiError::ObjectNotDeleted`]
    /// when still live.
    fn prune(&self, name: &ObjectName) -> Result<(), ApiError>;

    /// Lists the names matching the query. Iteration order is unspecified.
    fn find(&self, query: &Query) -> Vec<ObjectName>;
}

/// Event kind discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct EventKind(pub String);

/// A lifecycle event record.
pub trait Event: Send + Sync {
    /// The event kind.
    fn kind(&self) -> EventKind;
    /// Human-readable description.
    fn message(&self) -> String;
    /// Objects this event relates to.
    fn related_objects(&self) -> Vec<ObjectRef>;
}

/// Append-only store of lifecycle events. Defined for external collaborators;
/// the core does not require an implementation.
pub trait EventStore: Send + Sync {
    /// Appends an event.
    ///
    /// # Errors
    ///
    /// Implementation-defined.
    fn add(&self, event: Arc<dyn Event>) -> Result<(), ApiError>;

    /// Returns the events accepted by the predicate.
    fn find(&self, predicate: &dyn Fn(&dyn Event) -> bool) -> Vec<Arc<dyn Event>>;
}
