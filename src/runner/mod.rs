//! The test-runner collaborator: runs a restricted set of tests in a working
//! copy and reports per-test results.

pub mod command;

pub use command::CommandRunner;

use crate::coverage::TestId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// One request to run tests.
#[derive(Debug, Clone)]
pub struct TestInvocation {
    pub workdir: PathBuf,
    /// Tests to run. Empty means the whole suite.
    pub tests: Vec<TestId>,
    /// The process is killed once this much wall time has passed.
    pub deadline: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Passed,
    Failed,
    /// The code under test did not build or parse
    CompileError,
    /// Killed at the deadline
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct TestRunReport {
    pub status: RunStatus,
    pub passed: Vec<TestId>,
    pub failed: Vec<TestId>,
    pub output: String,
    pub duration: Duration,
    /// Process id of the test command, when one was started
    pub pid: Option<u32>,
}

/// Infrastructure failures. Test failures are reported through
/// [`TestRunReport`], not as errors.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for the test process: {0}")]
    Wait(#[source] std::io::Error),
}

impl RunnerError {
    /// Worth another attempt: the process never started.
    pub fn is_spawn(&self) -> bool {
        matches!(self, RunnerError::Spawn { .. })
    }
}

#[async_trait]
pub trait TestRunner: Send + Sync {
    async fn run(&self, invocation: &TestInvocation) -> Result<TestRunReport, RunnerError>;
}
