//! Managed OS processes: the first concrete object type driven by the
//! reconciliation engine.
//!
//! A process object's specification names an executable; the
//! [`ProcessController`] keeps a [`Runner`]-wrapped child converged to it
//! and reports pid and exit-code observations as the object's status.

mod controller;
mod runner;
mod schema;
mod service;

pub use controller::ProcessController;
pub use runner::{ProcessError, Runner, StdioConfig};
pub use schema::{ExecutionSpecification, Specification, Status};
pub use service::ProcessService;
