//! Error taxonomy for the object service.
//!
//! Caller-driven operations return identities from this module; callers are
//! expected to branch on the identity, never on message text. Each API error
//! additionally carries a suggested HTTP status code for future HTTP
//! surfaces.

use crate::api::service::{HookKind, MutatorKind};

/// Identity-style errors reported by object stores and lifecycle guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ApiError {
    /// No object with the requested name is visible.
    #[error("object not found")]
    ObjectNotFound,

    /// A live object already owns the requested name.
    #[error("object with name already exists")]
    ObjectWithNameAlreadyExists,

    /// A deleted, not-yet-pruned object still owns the requested name.
    #[error("deleted object with name already exists")]
    DeletedObjectWithNameAlreadyExists,

    /// The object is already tombstoned.
    #[error("object already deleted")]
    ObjectAlreadyDeleted,

    /// The object is still live and cannot be pruned.
    #[error("object not deleted")]
    ObjectNotDeleted,

    /// The service forbids specification updates.
    #[error("object specification is immutable")]
    ObjectSpecificationIsImmutable,
}

impl ApiError {
    /// Suggested HTTP status code for this error.
    #[must_use]
    pub const fn http_code(self) -> u16 {
        match self {
            Self::ObjectNotFound => 404,
            Self::ObjectWithNameAlreadyExists
            | Self::DeletedObjectWithNameAlreadyExists
            | Self::ObjectNotDeleted
            | Self::ObjectSpecificationIsImmutable => 409,
            Self::ObjectAlreadyDeleted => 410,
        }
    }
}

/// Errors surfaced by [`Service`](crate::api::Service) operations.
///
/// Store outcomes keep their [`ApiError`] identity; failures raised by a
/// registered hook or mutator are wrapped with the extension point that
/// produced them.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// A store operation or lifecycle guard failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A registered hook failed.
    #[error("{kind} hook failed: {cause}")]
    Hook {
        /// The hook kind that failed.
        kind: HookKind,
        /// The hook's error.
        cause: anyhow::Error,
    },

    /// A registered mutator failed.
    #[error("{kind} mutator failed: {cause}")]
    Mutator {
        /// The mutator kind that failed.
        kind: MutatorKind,
        /// The mutator's error.
        cause: anyhow::Error,
    },
}

impl ServiceError {
    /// The underlying [`ApiError`] identity, if this error carries one.
    #[must_use]
    pub fn api(&self) -> Option<ApiError> {
        match self {
            Self::Api(error) => Some(*error),
            Self::Hook { .. } | Self::Mutator { .. } => None,
        }
    }

    /// Wraps a hook error. A hook failing with an [`ApiError`] keeps its
    /// identity so callers can still branch on it.
    pub(crate) fn from_hook(kind: HookKind, cause: anyhow::Error) -> Self {
        match cause.downcast::<ApiError>() {
            Ok(error) => Self::Api(error),
            Err(cause) => Self::Hook { kind, cause },
        }
    }

    /// Wraps a mutator error, keeping [`ApiError`] identities.
    pub(crate) fn from_mutator(kind: MutatorKind, cause: anyhow::Error) -> Self {
        match cause.downcast::<ApiError>() {
            Ok(error) => Self::Api(error),
            Err(cause) => Self::Mutator { kind, cause },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_and_http_codes() {
        assert_eq!(ApiError::ObjectNotFound.to_string(), "object not found");
        assert_eq!(ApiError::ObjectNotFound.http_code(), 404);
        assert_eq!(ApiError::ObjectWithNameAlreadyExists.http_code(), 409);
        assert_eq!(ApiError::DeletedObjectWithNameAlreadyExists.http_code(), 409);
        assert_eq!(ApiError::ObjectAlreadyDeleted.http_code(), 410);
        assert_eq!(ApiError::ObjectNotDeleted.http_code(), 409);
        assert_eq!(ApiError::ObjectSpecificationIsImmutable.http_code(), 409);
    }

    #[test]
    fn test_hook_errors_keep_api_identities() {
        let wrapped = ServiceError::from_hook(
            HookKind::BeforeSpecificationUpdate,
            anyhow::Error::from(ApiError::ObjectSpecificationIsImmutable),
        );
        assert_eq!(wrapped.api(), Some(ApiError::ObjectSpecificationIsImmutable));

        let opaque = ServiceError::from_hook(HookKind::BeforeCreate, anyhow::anyhow!("hook error"));
        assert_eq!(opaque.api(), None);
        assert!(opaque.to_string().contains("hook error"));
        assert!(opaque.to_string().contains("BeforeCreate"));
    }
}
