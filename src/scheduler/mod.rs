//! Bounded worker pool executing mutants against the test suite.
//!
//! Each worker owns one [`Workspace`] for its whole life, so no two workers
//! ever write to the same location. Jobs are pulled from a shared channel;
//! results flow back over a second one in completion order.

pub mod workspace;

pub use workspace::Workspace;

use crate::coverage::TestId;
use crate::mutation::MutationId;
use crate::runner::{TestInvocation, TestRunReport, TestRunner};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, error, info, warn};

/// One mutant ready to run.
#[derive(Debug, Clone)]
pub struct MutantJob {
    pub id: MutationId,
    /// Project-relative file the mutant replaces
    pub file: PathBuf,
    pub source: String,
    pub tests: Vec<TestId>,
    pub deadline: Duration,
}

/// What happened to a dispatched job. Classification happens later.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub id: MutationId,
    pub run: Option<TestRunReport>,
    pub infra_error: Option<String>,
    pub deadline_exceeded: bool,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Additional attempts after a failed process launch
    pub spawn_retries: u32,
    /// Slack on top of a job's deadline before the worker gives up on the
    /// runner itself
    pub grace: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            spawn_retries: 1,
            grace: Duration::from_secs(5),
        }
    }
}

#[derive(Debug)]
pub struct ScheduleOutcome {
    /// In completion order
    pub results: Vec<JobResult>,
    /// Dispatch stopped early; jobs never started have no result
    pub aborted: bool,
}

/// Deadline for a job whose tests took `baseline` on the unmutated code.
/// Saturates instead of overflowing.
pub fn deadline(baseline: Duration, factor: f64, margin: Duration) -> Duration {
    Duration::try_from_secs_f64(baseline.as_secs_f64() * factor)
        .unwrap_or(Duration::MAX)
        .saturating_add(margin)
}

pub struct Scheduler {
    runner: Arc<dyn TestRunner>,
    settings: SchedulerSettings,
    should_stop: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(
        runner: Arc<dyn TestRunner>,
        settings: SchedulerSettings,
        should_stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            runner,
            settings,
            should_stop,
        }
    }

    /// Run `jobs` with one worker per workspace.
    pub async fn run(&self, jobs: Vec<MutantJob>, workspaces: Vec<Workspace>) -> ScheduleOutcome {
        if jobs.is_empty() || workspaces.is_empty() {
            return ScheduleOutcome {
                results: Vec::new(),
                aborted: self.should_stop.load(Ordering::SeqCst) && !jobs.is_empty(),
            };
        }

        let width = workspaces.len();
        let total = jobs.len();
        info!(jobs = total, workers = width, "Starting mutant execution");

        let (tx, rx) = mpsc::channel::<MutantJob>(width);
        let rx = Arc::new(TokioMutex::new(rx));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<JobResult>();

        let mut worker_handles = Vec::new();
        for (slot, workspace) in workspaces.into_iter().enumerate() {
            let worker = Worker {
                slot,
                workspace,
                runner: Arc::clone(&self.runner),
                settings: self.settings.clone(),
                should_stop: Arc::clone(&self.should_stop),
            };
            let worker_rx = Arc::clone(&rx);
            let worker_tx = result_tx.clone();
            worker_handles.push(tokio::spawn(async move {
                worker.run(worker_rx, worker_tx).await
            }));
        }
        drop(result_tx);

        let mut aborted = false;
        for job in jobs {
            if self.should_stop.load(Ordering::SeqCst) {
                aborted = true;
                break;
            }
            tokio::select! {
                sent = tx.send(job) => {
                    if sent.is_err() {
                        error!("All workers have stopped; remaining mutants are not run");
                        break;
                    }
                }
                _ = wait_for_stop_signal(&self.should_stop) => {
                    aborted = true;
                    break;
                }
            }
        }
        drop(tx);

        let mut results = Vec::with_capacity(total);
        while let Some(result) = result_rx.recv().await {
            debug!(
                id = result.id.0,
                done = results.len() + 1,
                total,
                "Mutant finished"
            );
            results.push(result);
        }

        for handle in worker_handles {
            if let Err(e) = handle.await {
                warn!("Mutation worker failed: {}", e);
            }
        }

        let aborted = aborted || (self.should_stop.load(Ordering::SeqCst) && results.len() < total);
        if aborted {
            warn!(
                finished = results.len(),
                total, "Run aborted; undispatched mutants are omitted"
            );
        }
        ScheduleOutcome { results, aborted }
    }
}

struct Worker {
    slot: usize,
    workspace: Workspace,
    runner: Arc<dyn TestRunner>,
    settings: SchedulerSettings,
    should_stop: Arc<AtomicBool>,
}

impl Worker {
    async fn run(
        self,
        receiver: Arc<TokioMutex<mpsc::Receiver<MutantJob>>>,
        results: mpsc::UnboundedSender<JobResult>,
    ) {
        debug!(slot = self.slot, workspace = ?self.workspace.path(), "Worker started");

        loop {
            if self.should_stop.load(Ordering::SeqCst) {
                debug!(slot = self.slot, "Worker stopping due to abort signal");
                break;
            }

            let job = {
                let mut rx = receiver.lock().await;
                tokio::select! {
                    job = rx.recv() => job,
                    _ = wait_for_stop_signal(&self.should_stop) => {
                        debug!(slot = self.slot, "Worker stopping due to abort signal");
                        break;
                    }
                }
            };

            let Some(job) = job else {
                debug!(slot = self.slot, "Worker finished - no more mutants");
                break;
            };

            let applied = match self.workspace.apply(&job.file, &job.source).await {
                Ok(applied) => applied,
                Err(e) => {
                    let _ = results.send(JobResult {
                        id: job.id,
                        run: None,
                        infra_error: Some(format!("{:#}", e)),
                        deadline_exceeded: false,
                        elapsed: Duration::ZERO,
                    });
                    continue;
                }
            };

            let result = self.execute(&job).await;

            if let Err(e) = self.workspace.restore(applied).await {
                // The workspace no longer matches the project; stop using it.
                error!(slot = self.slot, "{:#}", e);
                let _ = results.send(result);
                break;
            }
            if results.send(result).is_err() {
                break;
            }
        }
    }

    async fn execute(&self, job: &MutantJob) -> JobResult {
        let started = Instant::now();
        let invocation = TestInvocation {
            workdir: self.workspace.path().to_path_buf(),
            tests: job.tests.clone(),
            deadline: job.deadline,
        };
        let limit = job.deadline.saturating_add(self.settings.grace);

        let mut attempt = 0;
        let (run, infra_error, deadline_exceeded) = loop {
            match tokio::time::timeout(limit, self.runner.run(&invocation)).await {
                Ok(Ok(report)) => break (Some(report), None, false),
                Ok(Err(e)) if e.is_spawn() && attempt < self.settings.spawn_retries => {
                    attempt += 1;
                    warn!(id = job.id.0, attempt, "Retrying test run: {}", e);
                }
                Ok(Err(e)) => break (None, Some(e.to_string()), false),
                Err(_) => {
                    warn!(id = job.id.0, ?limit, "Test runner did not return before the deadline");
                    break (None, None, true);
                }
            }
        };

        JobResult {
            id: job.id,
            run,
            infra_error,
            deadline_exceeded,
            elapsed: started.elapsed(),
        }
    }
}

/// Resolves once the abort flag is raised (for use in tokio::select!)
pub(crate) async fn wait_for_stop_signal(should_stop: &AtomicBool) {
    while !should_stop.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
