//! Decides a mutant's outcome from what happened to it.

use super::MutantOutcome;
use crate::coverage::TestId;
use crate::runner::{RunStatus, TestRunReport};

/// Everything known about one mutant once its processing has finished.
#[derive(Debug, Clone, Default)]
pub struct Evidence {
    pub ignored: bool,
    pub selected_tests: usize,
    /// The mutant could not be printed or failed the round-trip check
    pub build_error: Option<String>,
    /// The runner could not be started, even after retrying
    pub infra_error: Option<String>,
    /// The outer deadline fired before the runner returned
    pub deadline_exceeded: bool,
    pub run: Option<TestRunReport>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub outcome: MutantOutcome,
    pub killing_tests: Vec<TestId>,
    pub diagnostic: Option<String>,
}

impl Verdict {
    fn plain(outcome: MutantOutcome) -> Self {
        Self {
            outcome,
            killing_tests: Vec::new(),
            diagnostic: None,
        }
    }

    fn error(diagnostic: String) -> Self {
        Self {
            outcome: MutantOutcome::Error,
            killing_tests: Vec::new(),
            diagnostic: Some(diagnostic),
        }
    }
}

/// First match wins: ignored, not covered, error, timed out, killed, escaped.
pub fn classify(evidence: &Evidence) -> Verdict {
    if evidence.ignored {
        return Verdict::plain(MutantOutcome::Ignored);
    }
    if evidence.selected_tests == 0 {
        return Verdict::plain(MutantOutcome::NotCovered);
    }
    if let Some(e) = &evidence.build_error {
        return Verdict::error(e.clone());
    }
    if let Some(e) = &evidence.infra_error {
        return Verdict::error(e.clone());
    }
    if let Some(RunStatus::CompileError) = evidence.run.as_ref().map(|run| run.status) {
        let output = evidence
            .run
            .as_ref()
            .map(|run| run.output.clone())
            .unwrap_or_default();
        return Verdict::error(format!("mutant does not compile:\n{}", output));
    }
    if evidence.deadline_exceeded
        || matches!(evidence.run.as_ref().map(|run| run.status), Some(RunStatus::TimedOut))
    {
        return Verdict::plain(MutantOutcome::TimedOut);
    }

    match &evidence.run {
        Some(run) if run.status == RunStatus::Failed => Verdict {
            outcome: MutantOutcome::Killed,
            killing_tests: run.failed.clone(),
            diagnostic: None,
        },
        Some(_) => Verdict::plain(MutantOutcome::Escaped),
        None => Verdict::error("mutant was never run".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn report(status: RunStatus, failed: &[&str]) -> TestRunReport {
        TestRunReport {
            status,
            passed: vec![],
            failed: failed.iter().map(|t| TestId::from(*t)).collect(),
            output: "output".to_string(),
            duration: Duration::from_millis(10),
            pid: None,
        }
    }

    fn covered(run: Option<TestRunReport>) -> Evidence {
        Evidence {
            selected_tests: 2,
            run,
            ..Evidence::default()
        }
    }

    #[test]
    fn test_ignored_wins_over_everything() {
        let evidence = Evidence {
            ignored: true,
            selected_tests: 0,
            build_error: Some("broken".to_string()),
            deadline_exceeded: true,
            ..Evidence::default()
        };
        assert_eq!(classify(&evidence).outcome, MutantOutcome::Ignored);
    }

    #[test]
    fn test_not_covered_before_error() {
        let evidence = Evidence {
            build_error: Some("broken".to_string()),
            ..Evidence::default()
        };
        assert_eq!(classify(&evidence).outcome, MutantOutcome::NotCovered);
    }

    #[test]
    fn test_errors_carry_diagnostics() {
        let evidence = Evidence {
            selected_tests: 1,
            infra_error: Some("cannot spawn".to_string()),
            deadline_exceeded: true,
            ..Evidence::default()
        };
        let verdict = classify(&evidence);
        assert_eq!(verdict.outcome, MutantOutcome::Error);
        assert_eq!(verdict.diagnostic.as_deref(), Some("cannot spawn"));

        let verdict = classify(&covered(Some(report(RunStatus::CompileError, &[]))));
        assert_eq!(verdict.outcome, MutantOutcome::Error);
        assert!(verdict.diagnostic.unwrap().contains("does not compile"));
    }

    #[test]
    fn test_timeout_before_kill() {
        let mut evidence = covered(Some(report(RunStatus::Failed, &["t1"])));
        evidence.deadline_exceeded = true;
        assert_eq!(classify(&evidence).outcome, MutantOutcome::TimedOut);

        let evidence = covered(Some(report(RunStatus::TimedOut, &[])));
        assert_eq!(classify(&evidence).outcome, MutantOutcome::TimedOut);
    }

    #[test]
    fn test_killed_and_escaped() {
        let verdict = classify(&covered(Some(report(RunStatus::Failed, &["t1"]))));
        assert_eq!(verdict.outcome, MutantOutcome::Killed);
        assert_eq!(verdict.killing_tests, vec![TestId::from("t1")]);

        let verdict = classify(&covered(Some(report(RunStatus::Passed, &[]))));
        assert_eq!(verdict.outcome, MutantOutcome::Escaped);
        assert!(verdict.killing_tests.is_empty());
    }

    #[test]
    fn test_missing_run_is_an_error() {
        assert_eq!(classify(&covered(None)).outcome, MutantOutcome::Error);
    }
}
