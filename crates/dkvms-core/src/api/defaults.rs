//! Declarative specification defaults.

use crate::api::object::{Specification, Status};
use crate::api::service::{MutatorKind, ServiceBuilder};

/// Declares the default values of a specification type.
///
/// There is no field-tag reflection to read defaults from, so specification
/// types state them imperatively; the service-level mutator wires the call
/// into object creation.
pub trait FillDefaults {
    /// Fills every unset field with its declared default.
    fn fill_defaults(&mut self);
}

impl<S: Specification + FillDefaults, St: Status> ServiceBuilder<S, St> {
    /// Registers a creation mutator that fills the specification's declared
    /// defaults.
    #[must_use]
    pub fn with_defaults(self) -> Self {
        self.mutator(MutatorKind::WhileCreatingObject, |mut object| {
            object.specification.fill_defaults();
            Ok(object)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::api::testing::{self, TestSpec};

    #[test]
    fn test_with_defaults_fills_the_specification_on_create() {
        let service = testing::service_builder().with_defaults().build();

        let created = service.create("foo", TestSpec::with_foo("bar")).unwrap();
        assert_eq!(created.specification.foo, "bar");
        assert_eq!(created.specification.default_foo, "bar");
    }

    #[test]
    fn test_with_defaults_keeps_explicit_values() {
        let service = testing::service_builder().with_defaults().build();

        let spec = TestSpec {
            foo: String::from("bar"),
            default_foo: String::from("explicit"),
        };
        let created = service.create("foo", spec).unwrap();
        assert_eq!(created.specification.default_foo, "explicit");
    }
}
