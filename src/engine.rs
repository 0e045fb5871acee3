//! End-to-end orchestration of a mutation run.
//!
//! Enumerates every unit, drops ignored and uncovered mutants before any
//! process is started, renders and deduplicates the rest, checks that the
//! unmutated suite passes, then hands the work to the [`Scheduler`] and
//! classifies whatever comes back.

use crate::ast::printer::Printer;
use crate::ast::SourceUnit;
use crate::config::{Config, ConfigError};
use crate::coverage::{CoverageIndex, TestId};
use crate::mutation::classifier::{classify, Evidence};
use crate::mutation::enumerator::enumerate;
use crate::mutation::ignore::IgnoreRules;
use crate::mutation::materializer::{render_mutant, MutantSource};
use crate::mutation::operator::ConstantTable;
use crate::mutation::registry::OperatorRegistry;
use crate::mutation::score::{ScoreMetrics, ScoreSummary};
use crate::mutation::{MutantResult, Mutation, MutationId};
use crate::runner::{RunStatus, TestInvocation, TestRunner};
use crate::scheduler::{self, JobResult, MutantJob, Scheduler, SchedulerSettings, Workspace};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Slack the engine allows a runner beyond its own deadline.
const RUNNER_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("the test suite does not pass on the unmutated project ({status}):\n{output}")]
    BaselineFailed { status: String, output: String },

    #[error("failed to prepare working copies: {0:#}")]
    Workspace(anyhow::Error),
}

/// Everything a run produced, in canonical mutation order.
#[derive(Debug, Clone, Serialize)]
pub struct MutationRun {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: Vec<MutantResult>,
    pub score: ScoreSummary,
    pub metrics: ScoreMetrics,
    /// Dispatch was stopped early; some mutants have no result
    pub aborted: bool,
    /// Mutants not run because an earlier one produced the same source.
    /// They are still reported, sharing that mutant's outcome.
    pub duplicates: usize,
}

/// A mutant between enumeration and classification.
struct Pending<'a> {
    id: MutationId,
    unit: &'a SourceUnit,
    mutation: Mutation,
    tests: BTreeSet<TestId>,
    ignored: bool,
    build_error: Option<String>,
    rendered: Option<MutantSource>,
    duplicate_of: Option<MutationId>,
}

impl Pending<'_> {
    fn executable(&self) -> bool {
        !self.ignored
            && !self.tests.is_empty()
            && self.rendered.is_some()
            && self.duplicate_of.is_none()
    }
}

pub struct Engine {
    config: Config,
    registry: OperatorRegistry,
    ignores: IgnoreRules,
}

impl Engine {
    /// Build the operator registry and ignore rules. Any configuration error
    /// is returned here, before a single mutant exists.
    pub fn new(config: Config, mut constants: ConstantTable) -> Result<Self, EngineError> {
        constants.extend(&config.constants);
        let registry = OperatorRegistry::from_settings(&config.operators, &constants)?;
        Self::with_registry(config, registry)
    }

    pub fn with_registry(config: Config, registry: OperatorRegistry) -> Result<Self, EngineError> {
        config.validate()?;
        let ignores = IgnoreRules::new(
            config.ignore.clone(),
            &config.markers,
            crate::mutation::registry::BUILTIN_OPERATORS,
        )?;
        Ok(Self {
            config,
            registry,
            ignores,
        })
    }

    pub fn registry(&self) -> &OperatorRegistry {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn run(
        &self,
        units: &[SourceUnit],
        coverage: &CoverageIndex,
        printer: &dyn Printer,
        runner: Arc<dyn TestRunner>,
        project_root: &Path,
        abort: Arc<AtomicBool>,
    ) -> Result<MutationRun, EngineError> {
        let started_at = Utc::now();
        info!(
            units = units.len(),
            operators = self.registry.len(),
            "Starting mutation run"
        );

        let mut pending = self.prepare(units, coverage, printer);
        let duplicates = if self.config.execution.deduplicate {
            deduplicate(&mut pending)
        } else {
            0
        };

        let executable: Vec<&Pending> = pending.iter().filter(|p| p.executable()).collect();
        info!(
            mutants = pending.len(),
            executable = executable.len(),
            duplicates,
            "Mutants prepared"
        );

        let mut aborted = false;
        let mut outcomes: HashMap<MutationId, JobResult> = HashMap::new();

        if !executable.is_empty() {
            if abort.load(Ordering::SeqCst) {
                aborted = true;
            } else {
                let width = self.config.execution.workers.min(executable.len());
                let workspaces = create_workspaces(project_root, width).await?;
                let baseline = self
                    .baseline(runner.as_ref(), &workspaces[0])
                    .await?;

                let jobs = executable
                    .iter()
                    .map(|p| self.job(p, coverage, baseline))
                    .collect();
                let scheduler = Scheduler::new(
                    runner,
                    SchedulerSettings {
                        spawn_retries: self.config.execution.spawn_retries,
                        grace: RUNNER_GRACE,
                    },
                    abort,
                );
                let outcome = scheduler.run(jobs, workspaces).await;
                aborted = outcome.aborted;
                outcomes.extend(outcome.results.into_iter().map(|r| (r.id, r)));
            }
        }

        let mut results: Vec<MutantResult> = Vec::with_capacity(pending.len());
        let mut positions: HashMap<MutationId, usize> = HashMap::new();
        for p in pending {
            let result = match p.duplicate_of {
                Some(first) => match positions.get(&first) {
                    Some(&at) => share_outcome(p, &results[at]),
                    // The first one was never run.
                    None => continue,
                },
                None => {
                    let job = outcomes.remove(&p.id);
                    if aborted && p.executable() && job.is_none() {
                        continue;
                    }
                    into_result(p, job)
                }
            };
            positions.insert(result.id, results.len());
            results.push(result);
        }

        let score = ScoreSummary::from_results(&results);
        let metrics = score.metrics();
        info!(
            killed = score.totals.killed,
            escaped = score.totals.escaped,
            msi = metrics.msi,
            aborted,
            "Mutation run finished"
        );

        Ok(MutationRun {
            started_at,
            finished_at: Utc::now(),
            results,
            score,
            metrics,
            aborted,
            duplicates,
        })
    }

    /// Enumerate, select tests, apply ignore rules and render every mutant.
    fn prepare<'a>(
        &self,
        units: &'a [SourceUnit],
        coverage: &CoverageIndex,
        printer: &dyn Printer,
    ) -> Vec<Pending<'a>> {
        let mut pending = Vec::new();

        for unit in units {
            let ignores = self.ignores.for_unit(unit);
            for mutation in enumerate(&self.registry, unit) {
                let id = MutationId(pending.len());
                let ignored = ignores.is_ignored(&mutation);
                let tests = coverage.select(&mutation);

                let (rendered, build_error) = if ignored || tests.is_empty() {
                    (None, None)
                } else {
                    match render_mutant(printer, unit, &mutation) {
                        Ok(rendered) => (Some(rendered), None),
                        Err(e) => {
                            warn!(id = id.0, operator = %mutation.operator, "Cannot build mutant: {}", e);
                            (None, Some(e.to_string()))
                        }
                    }
                };

                pending.push(Pending {
                    id,
                    unit,
                    mutation,
                    tests,
                    ignored,
                    build_error,
                    rendered,
                    duplicate_of: None,
                });
            }
        }
        pending
    }

    /// Run the whole suite on an unmutated copy and return how long it took.
    async fn baseline(
        &self,
        runner: &dyn TestRunner,
        workspace: &Workspace,
    ) -> Result<Duration, EngineError> {
        let deadline = Duration::from_secs(self.config.execution.baseline_timeout_seconds);
        let invocation = TestInvocation {
            workdir: workspace.path().to_path_buf(),
            tests: Vec::new(),
            deadline,
        };
        info!("Running baseline test suite");

        let report = match tokio::time::timeout(deadline.saturating_add(RUNNER_GRACE), runner.run(&invocation)).await {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                return Err(EngineError::BaselineFailed {
                    status: "not started".to_string(),
                    output: e.to_string(),
                })
            }
            Err(_) => {
                return Err(EngineError::BaselineFailed {
                    status: "timed out".to_string(),
                    output: String::new(),
                })
            }
        };

        if report.status != RunStatus::Passed {
            return Err(EngineError::BaselineFailed {
                status: format!("{:?}", report.status).to_lowercase(),
                output: report.output,
            });
        }
        info!(duration_ms = report.duration.as_millis() as u64, "Baseline passed");
        Ok(report.duration)
    }

    fn job(&self, pending: &Pending, coverage: &CoverageIndex, baseline: Duration) -> MutantJob {
        let execution = &self.config.execution;
        let subset = coverage.subset_duration(&pending.tests, baseline);
        MutantJob {
            id: pending.id,
            file: pending.unit.path.clone(),
            source: pending
                .rendered
                .as_ref()
                .map(|r| r.source.clone())
                .unwrap_or_default(),
            tests: pending.tests.iter().cloned().collect(),
            deadline: scheduler::deadline(
                subset,
                execution.timeout_factor,
                Duration::from_millis(execution.timeout_margin_ms),
            ),
        }
    }
}

/// Mark mutants whose rendered source matches an earlier one so only the
/// first is run. Returns how many were marked.
fn deduplicate(pending: &mut [Pending]) -> usize {
    let mut seen: HashMap<String, MutationId> = HashMap::new();
    let mut duplicates = 0;

    for p in pending.iter_mut().filter(|p| p.executable()) {
        let Some(rendered) = &p.rendered else {
            continue;
        };
        match seen.get(&rendered.digest) {
            Some(&first) => {
                debug!(id = p.id.0, duplicate_of = first.0, "Skipping duplicate mutant");
                p.duplicate_of = Some(first);
                duplicates += 1;
            }
            None => {
                seen.insert(rendered.digest.clone(), p.id);
            }
        }
    }

    duplicates
}

async fn create_workspaces(project_root: &Path, count: usize) -> Result<Vec<Workspace>, EngineError> {
    let mut workspaces = Vec::with_capacity(count);
    for _ in 0..count {
        workspaces.push(
            Workspace::create(project_root)
                .await
                .map_err(EngineError::Workspace)?,
        );
    }
    Ok(workspaces)
}

fn into_result(pending: Pending, job: Option<JobResult>) -> MutantResult {
    let mut evidence = Evidence {
        ignored: pending.ignored,
        selected_tests: pending.tests.len(),
        build_error: pending.build_error,
        ..Evidence::default()
    };
    let mut elapsed = Duration::ZERO;
    if let Some(job) = job {
        evidence.infra_error = job.infra_error;
        evidence.deadline_exceeded = job.deadline_exceeded;
        evidence.run = job.run;
        elapsed = job.elapsed;
    }

    let verdict = classify(&evidence);
    MutantResult {
        id: pending.id,
        mutation: pending.mutation,
        outcome: verdict.outcome,
        tests: pending.tests.into_iter().collect(),
        killing_tests: verdict.killing_tests,
        diff: pending.rendered.map(|r| r.diff).unwrap_or_default(),
        execution_time_ms: elapsed.as_millis() as u64,
        diagnostic: verdict.diagnostic,
        duplicate_of: None,
    }
}

/// Result for a duplicate: its own mutation and diff, the first mutant's verdict.
fn share_outcome(pending: Pending, first: &MutantResult) -> MutantResult {
    MutantResult {
        id: pending.id,
        mutation: pending.mutation,
        outcome: first.outcome,
        tests: pending.tests.into_iter().collect(),
        killing_tests: first.killing_tests.clone(),
        diff: pending.rendered.map(|r| r.diff).unwrap_or_default(),
        execution_time_ms: 0,
        diagnostic: first.diagnostic.clone(),
        duplicate_of: Some(first.id),
    }
}
