//! Runs the configured test command as a child process.

use super::{RunStatus, RunnerError, TestInvocation, TestRunReport, TestRunner};
use crate::config::RunnerConfig;
use crate::coverage::TestId;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

/// How long to wait for output pipes to drain after the child is gone.
const PIPE_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct CommandRunner {
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    compile_error_markers: Vec<String>,
    max_output_bytes: usize,
}

impl CommandRunner {
    pub fn new(program: &str, args: Vec<String>) -> Self {
        Self {
            program: program.to_string(),
            args,
            env: BTreeMap::new(),
            compile_error_markers: Vec::new(),
            max_output_bytes: 10_000,
        }
    }

    pub fn from_config(config: &RunnerConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            env: config.env.clone(),
            compile_error_markers: config.compile_error_markers.clone(),
            max_output_bytes: config.max_output_bytes,
        }
    }

    /// Expand `{tests}` and `{filter}`, or append the tests when neither
    /// placeholder is present.
    pub fn build_args(&self, tests: &[TestId]) -> Vec<String> {
        let mut args = Vec::with_capacity(self.args.len() + tests.len());
        let mut substituted = false;

        for arg in &self.args {
            match arg.as_str() {
                "{tests}" => {
                    args.extend(tests.iter().map(|t| t.to_string()));
                    substituted = true;
                }
                _ if arg.contains("{filter}") => {
                    let filter = tests
                        .iter()
                        .map(TestId::as_str)
                        .collect::<Vec<_>>()
                        .join("|");
                    args.push(arg.replace("{filter}", &filter));
                    substituted = true;
                }
                _ => args.push(arg.clone()),
            }
        }

        if !substituted {
            args.extend(tests.iter().map(|t| t.to_string()));
        }
        args
    }

    fn status(&self, success: bool, failed: &[TestId], output: &str) -> RunStatus {
        if success && failed.is_empty() {
            RunStatus::Passed
        } else if failed.is_empty()
            && self
                .compile_error_markers
                .iter()
                .any(|marker| output.contains(marker.as_str()))
        {
            RunStatus::CompileError
        } else {
            RunStatus::Failed
        }
    }
}

#[async_trait]
impl TestRunner for CommandRunner {
    async fn run(&self, invocation: &TestInvocation) -> Result<TestRunReport, RunnerError> {
        let start = Instant::now();
        let args = self.build_args(&invocation.tests);
        debug!(program = %self.program, ?args, workdir = ?invocation.workdir, "Running tests");

        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .envs(&self.env)
            .current_dir(&invocation.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so everything the test command starts can be
        // killed together.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| RunnerError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        let pid = child.id();

        let stdout = child.stdout.take().map(|pipe| tokio::spawn(read_pipe(pipe)));
        let stderr = child.stderr.take().map(|pipe| tokio::spawn(read_pipe(pipe)));

        let exit = match tokio::time::timeout(invocation.deadline, child.wait()).await {
            Ok(status) => {
                // Stragglers left by the command would hold the pipes open.
                kill_process_group(pid);
                Some(status.map_err(RunnerError::Wait)?)
            }
            Err(_) => {
                warn!(?pid, deadline = ?invocation.deadline, "Test run exceeded deadline, killing");
                kill_process_group(pid);
                // kill() also reaps the child.
                if let Err(e) = child.kill().await {
                    warn!(?pid, "Failed to kill test process: {}", e);
                }
                None
            }
        };

        let (stdout, stderr) = tokio::join!(collect_pipe(stdout), collect_pipe(stderr));
        let mut output = stdout;
        output.push_str(&stderr);
        let duration = start.elapsed();

        let (passed, failed) = parse_test_results(&output);
        let status = match exit {
            None => RunStatus::TimedOut,
            Some(exit) => self.status(exit.success(), &failed, &output),
        };

        Ok(TestRunReport {
            status,
            passed,
            failed,
            output: truncate_output(&output, self.max_output_bytes),
            duration,
            pid,
        })
    }
}

/// SIGKILL every process in the group led by `pid`. A group that is already
/// gone is not an error.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid.and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    match killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
        Err(e) => warn!(pid, "Failed to kill test process group: {}", e),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

async fn read_pipe(mut pipe: impl AsyncRead + Unpin) -> Vec<u8> {
    let mut buf = Vec::new();
    // A read error only loses output, never the result.
    let _ = pipe.read_to_end(&mut buf).await;
    buf
}

async fn collect_pipe(handle: Option<tokio::task::JoinHandle<Vec<u8>>>) -> String {
    let Some(mut handle) = handle else {
        return String::new();
    };
    match tokio::time::timeout(PIPE_DRAIN_TIMEOUT, &mut handle).await {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        Ok(Err(_)) => String::new(),
        Err(_) => {
            // Something outlived the child and holds the pipe open.
            handle.abort();
            String::new()
        }
    }
}

/// Per-test results from libtest-style lines: `test NAME ... ok|FAILED`.
pub fn parse_test_results(output: &str) -> (Vec<TestId>, Vec<TestId>) {
    let mut passed = Vec::new();
    let mut failed = Vec::new();

    for line in output.lines() {
        let line = line.trim();
        let Some(rest) = line.strip_prefix("test ") else {
            continue;
        };
        let Some((name, result)) = rest.split_once(" ... ") else {
            continue;
        };
        let name = TestId(name.trim().to_string());
        match result.trim() {
            "ok" => passed.push(name),
            "FAILED" => failed.push(name),
            _ => {}
        }
    }
    (passed, failed)
}

/// Keep at most `max_bytes` of output, cut on a character boundary.
fn truncate_output(output: &str, max_bytes: usize) -> String {
    if output.len() <= max_bytes {
        return output.to_string();
    }
    let mut end = max_bytes;
    while !output.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...(truncated)", &output[..end])
}
