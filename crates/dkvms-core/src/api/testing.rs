//! Shared fixtures for the api test suites.

use std::sync::Arc;

use crate::api::defaults::FillDefaults;
use crate::api::memory::MemoryObjectStore;
use crate::api::service::{Service, ServiceBuilder};

/// Specification payload used across the api tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct TestSpec {
    pub foo: String,
    pub default_foo: String,
}

impl TestSpec {
    pub fn with_foo(foo: &str) -> Self {
        Self {
            foo: foo.to_string(),
            default_foo: String::new(),
        }
    }
}

impl FillDefaults for TestSpec {
    fn fill_defaults(&mut self) {
        if self.default_foo.is_empty() {
            self.default_foo = String::from("bar");
        }
    }
}

/// Status payload used across the api tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct TestStatus {
    pub foo: String,
}

impl TestStatus {
    pub fn with_foo(foo: &str) -> Self {
        Self {
            foo: foo.to_string(),
        }
    }
}

/// A service builder over a fresh in-memory store.
pub(crate) fn service_builder() -> ServiceBuilder<TestSpec, TestStatus> {
    Service::builder(MemoryObjectStore::new())
}

/// A plain service over a fresh in-memory store.
pub(crate) fn service() -> Arc<Service<TestSpec, TestStatus>> {
    service_builder().build()
}
