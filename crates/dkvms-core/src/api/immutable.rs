//! Specification immutability guard.

use crate::api::error::ApiError;
use crate::api::object::{Specification, Status};
use crate::api::service::{HookKind, ServiceBuilder};

impl<S: Specification, St: Status> ServiceBuilder<S, St> {
    /// Rejects every specification update with
    /// [`ApiError::ObjectSpecificationIsImmutable`].
    #[must_use]
    pub fn with_immutable_specification(self) -> Self {
        self.hook(HookKind::BeforeSpecificationUpdate, |_old, _new| {
            Err(ApiError::ObjectSpecificationIsImmutable.into())
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::api::error::ApiError;
    use crate::api::testing::{self, TestSpec};

    #[test]
    fn test_immutable_specification_rejects_updates() {
        let service = testing::service_builder()
            .with_immutable_specification()
            .build();

        service.create("foo", TestSpec::with_foo("bar")).unwrap();

        let result = service.update_specification("foo", TestSpec::with_foo("baz"));
        assert_eq!(
            result.unwrap_err().api(),
            Some(ApiError::ObjectSpecificationIsImmutable)
        );
    }
}
