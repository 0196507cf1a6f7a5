//! Spec and status payloads for managed processes.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::api::FillDefaults;

/// How to launch the managed process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSpecification {
    /// Path to the executable.
    pub executable_path: PathBuf,

    /// Command-line arguments.
    #[serde(default)]
    pub arguments: Vec<String>,

    /// Working directory; inherits the kernel's when absent.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Extra environment variables.
    #[serde(default)]
    pub environment_variables: HashMap<String, String>,
}

/// Desired state of a managed process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Specification {
    /// How to launch the process.
    pub execution: ExecutionSpecification,
}

impl FillDefaults for Specification {
    fn fill_defaults(&mut self) {
        // No execution field carries a declared default yet; wired so the
        // service-level defaults mutator composes.
    }
}

/// Observed state of a managed process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    /// Whether the process is currently running.
    pub is_running: bool,

    /// OS process id when running.
    pub process_id: u32,

    /// Exit code of the last completed run.
    pub exit_code: i32,

    /// Last start error, empty when none.
    pub error: String,
}
