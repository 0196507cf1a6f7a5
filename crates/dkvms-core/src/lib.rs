//! # dkvms-core
//!
//! Control-plane core for the distributed KVM switch.
//!
//! This crate provides the building blocks the kernel composes:
//!
//! - **Object service**: a generic, in-memory spec/status store with a
//!   hookable lifecycle, soft delete, and strict copy-in/copy-out semantics
//! - **Reconciler**: per-object background tasks that drive an opaque
//!   runtime instance toward the authored specification, retrying every
//!   phase on a shared tick
//! - **Process runner**: a child-process state machine with
//!   interrupt-then-kill stop, the first concrete instance type
//!
//! ## Example
//!
//! ```rust,no_run
//! use dkvms_core::process::{ExecutionSpecification, ProcessService, Specification};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let processes = ProcessService::new();
//! processes.service().create(
//!     "status-bar",
//!     Specification {
//!         execution: ExecutionSpecification {
//!             executable_path: "/usr/bin/env".into(),
//!             ..Default::default()
//!         },
//!     },
//! )?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod api;
pub mod process;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::api::{
        ApiError, Controller, Object, ObjectName, ObjectStore, Query, Service, ServiceError,
        Timestamp,
    };
    pub use crate::process::{ProcessService, Runner};
}
