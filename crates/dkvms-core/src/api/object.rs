//! The declarative object model: named spec/status pairs with lifecycle
//! metadata.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::api::timestamp::Timestamp;

/// Marker for specification payloads: authored desired state.
///
/// The store, service, and reconciler never inspect payload fields; they only
/// require value semantics. `Clone` must produce a fully independent copy (no
/// `Rc`, no shared interior mutability), which is what makes the service's
/// copy-in/copy-out discipline hold.
pub trait Specification: Clone + fmt::Debug + Send + Sync + 'static {}

impl<T> Specification for T where T: Clone + fmt::Debug + Send + Sync + 'static {}

/// Marker for status payloads: observed state written by a controller.
///
/// Same value-semantics requirement as [`Specification`].
pub trait Status: Clone + fmt::Debug + Send + Sync + 'static {}

impl<T> Status for T where T: Clone + fmt::Debug + Send + Sync + 'static {}

/// Unique object identifier within a service; the store's primary key.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ObjectName(String);

impl ObjectName {
    /// The name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ObjectName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<&str> for ObjectName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl AsRef<str> for ObjectName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque object identity used by event records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub String);

/// Object kind discriminator used by event records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectKind(pub String);

/// Reference to an object from an event record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRef {
    /// The referenced object's identity.
    pub id: ObjectId,
    /// The referenced object's kind.
    pub kind: ObjectKind,
}

/// Lifecycle metadata shared by every object.
///
/// All four timestamps use the empty sentinel for "never": `status_updated_at`
/// stays empty until a controller writes a status, and `deleted_at` stays
/// empty while the object is live.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Unique name within the owning service.
    pub name: ObjectName,
    /// Free-form labels.
    pub labels: HashMap<String, String>,
    /// When the object was created.
    pub created_at: Timestamp,
    /// When the specification was last written.
    pub specification_updated_at: Timestamp,
    /// When the status was last written.
    pub status_updated_at: Timestamp,
    /// When the object was soft-deleted.
    pub deleted_at: Timestamp,
}

impl Metadata {
    /// Fresh metadata carrying only a name; every timestamp is the "never"
    /// sentinel.
    #[must_use]
    pub fn named(name: ObjectName) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }
}

/// A named pair of specification and optional status plus lifecycle
/// metadata, generic over the two opaque payload shapes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Object<S, St> {
    /// Lifecycle metadata.
    pub metadata: Metadata,
    /// Authored desired state.
    pub specification: S,
    /// Observed state; absent until a controller writes it.
    pub status: Option<St>,
}

impl<S: Specification, St: Status> Object<S, St> {
    /// Whether the object is tombstoned (soft-deleted but not yet pruned).
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        !self.metadata.deleted_at.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_deleted_follows_the_deletion_stamp() {
        let mut object: Object<String, String> = Object {
            metadata: Metadata::named(ObjectName::from("foo")),
            specification: String::from("spec"),
            status: None,
        };
        assert!(!object.is_deleted());

        object.metadata.deleted_at = Timestamp::now();
        assert!(object.is_deleted());
    }
}
