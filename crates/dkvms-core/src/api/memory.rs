//! In-memory object store.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::api::error::ApiError;
use crate::api::object::{Metadata, Object, ObjectName, Specification, Status};
use crate::api::store::{ObjectStore, Query};
use crate::api::timestamp::Timestamp;

/// [`ObjectStore`] backed by a map behind a reader-writer lock.
///
/// Mutating operations take the writer lock; `get` and `find` take the
/// reader lock. Payloads are cloned on the way in and objects cloned on the
/// way out, so nothing handed to a caller aliases internal state.
#[derive(Debug, Default)]
pub struct MemoryObjectStore<S, St> {
    objects: RwLock<HashMap<ObjectName, Object<S, St>>>,
}

impl<S: Specification, St: Status> MemoryObjectStore<S, St> {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ObjectName, Object<S, St>>> {
        self.objects.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ObjectName, Object<S, St>>> {
        self.objects.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: Specification, St: Status> ObjectStore<S, St> for MemoryObjectStore<S, St> {
    fn create(&self, name: ObjectName, specification: S) -> Result<Object<S, St>, ApiError> {
        let mut objects = self.write();

        if let Some(existing) = objects.get(&name) {
            if existing.is_deleted() {
                return Err(ApiError::DeletedObjectWithNameAlreadyExists);
            }
            return Err(ApiError::ObjectWithNameAlreadyExists);
        }

        let now = Timestamp::now();
        let object = Object {
            metadata: Metadata {
                name: name.clone(),
                labels: HashMap::new(),
                created_at: now.clone(),
                specification_updated_at: now,
                status_updated_at: Timestamp::EMPTY,
                deleted_at: Timestamp::EMPTY,
            },
            specification,
            status: None,
        };

        objects.insert(name, object.clone());

        Ok(object)
    }

    fn update_specification(
        &self,
        name: &ObjectName,
        specification: S,
    ) -> Result<Object<S, St>, ApiError> {
        let mut objects = self.write();

        let object = match objects.get_mut(name) {
            Some(object) if !object.is_deleted() => object,
            _ => return Err(ApiError::ObjectNotFound),
        };

        object.metadata.specification_updated_at = Timestamp::now();
        object.specification = specification;

        Ok(object.clone())
    }

    fn update_status(&self, name: &ObjectName, status: St) -> Result<Object<S, St>, ApiError> {
        let mut objects = self.write();

        let object = match objects.get_mut(name) {
            Some(object) if !object.is_deleted() => object,
            _ => return Err(ApiError::ObjectNotFound),
        };

        object.metadata.status_updated_at = Timestamp::now();
        object.status = Some(status);

        Ok(object.clone())
    }

    fn get(&self, name: &ObjectName, query: &Query) -> Result<Object<S, St>, ApiError> {
        let objects = self.read();

        match objects.get(name) {
            Some(object) if object.is_deleted() && !query.includes_deleted() => {
                Err(ApiError::ObjectNotFound)
            }
            Some(object) => Ok(object.clone()),
            None => Err(ApiError::ObjectNotFound),
        }
    }

    fn delete(&self, name: &ObjectName) -> Result<Object<S, St>, ApiError> {
        let mut objects = self.write();

        let object = match objects.get_mut(name) {
            Some(object) if object.is_deleted() => return Err(ApiError::ObjectAlreadyDeleted),
            Some(object) => object,
            None => return Err(ApiError::ObjectNotFound),
        };

        object.metadata.deleted_at = Timestamp::now();

        Ok(object.clone())
    }

    fn prune(&self, name: &ObjectName) -> Result<(), ApiError> {
        let mut objects = self.write();

        match objects.get(name) {
            Some(object) if !object.is_deleted() => return Err(ApiError::ObjectNotDeleted),
            Some(_) => {}
            None => return Err(ApiError::ObjectNotFound),
        }

        objects.remove(name);

        Ok(())
    }

    fn find(&self, query: &Query) -> Vec<ObjectName> {
        let objects = self.read();

        objects
            .iter()
            .filter(|(name, object)| {
                (query.includes_deleted() || !object.is_deleted()) && query.matches_name(name)
            })
            .map(|(name, _)| name.clone())
            .collect()
    }
}
