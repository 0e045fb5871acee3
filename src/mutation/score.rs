//! Aggregation of outcomes into mutation score metrics.
//!
//! Every reduction here is a sum of counters, so results can be folded in
//! whatever order workers finish them.

use super::{MutantOutcome, MutantResult};
use crate::config::ThresholdConfig;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub ignored: usize,
    pub not_covered: usize,
    pub error: usize,
    pub timed_out: usize,
    pub killed: usize,
    pub escaped: usize,
}

impl OutcomeCounts {
    pub fn record(&mut self, outcome: MutantOutcome) {
        match outcome {
            MutantOutcome::Ignored => self.ignored += 1,
            MutantOutcome::NotCovered => self.not_covered += 1,
            MutantOutcome::Error => self.error += 1,
            MutantOutcome::TimedOut => self.timed_out += 1,
            MutantOutcome::Killed => self.killed += 1,
            MutantOutcome::Escaped => self.escaped += 1,
        }
    }

    pub fn merge(&mut self, other: &OutcomeCounts) {
        self.ignored += other.ignored;
        self.not_covered += other.not_covered;
        self.error += other.error;
        self.timed_out += other.timed_out;
        self.killed += other.killed;
        self.escaped += other.escaped;
    }

    pub fn total(&self) -> usize {
        self.ignored + self.not_covered + self.executed()
    }

    /// Mutants that reached the test runner (or failed trying).
    pub fn executed(&self) -> usize {
        self.killed + self.escaped + self.timed_out + self.error
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScoreSummary {
    pub totals: OutcomeCounts,
    pub by_operator: BTreeMap<String, OutcomeCounts>,
}

/// Headline numbers, all in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreMetrics {
    pub msi: f64,
    pub covered_msi: f64,
    pub coverage_rate: f64,
}

impl ScoreSummary {
    pub fn record(&mut self, operator: &str, outcome: MutantOutcome) {
        self.totals.record(outcome);
        self.by_operator
            .entry(operator.to_string())
            .or_default()
            .record(outcome);
    }

    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a MutantResult>) -> Self {
        let mut summary = Self::default();
        for result in results {
            summary.record(&result.mutation.operator, result.outcome);
        }
        summary
    }

    pub fn merge(mut self, other: &ScoreSummary) -> Self {
        self.totals.merge(&other.totals);
        for (operator, counts) in &other.by_operator {
            self.by_operator
                .entry(operator.clone())
                .or_default()
                .merge(counts);
        }
        self
    }

    /// Mutation score indicator: killed / (killed + escaped + timed out + error).
    pub fn msi(&self) -> f64 {
        percent(self.totals.killed, self.totals.executed())
    }

    /// The score restricted to covered, non-ignored mutants. Those two
    /// outcomes are outside the indicator's denominator already, so this
    /// equals [`ScoreSummary::msi`]; it is reported separately next to the
    /// coverage rate.
    pub fn covered_msi(&self) -> f64 {
        let covered = OutcomeCounts {
            ignored: 0,
            not_covered: 0,
            ..self.totals
        };
        percent(covered.killed, covered.executed())
    }

    /// Share of non-ignored mutants that at least one test covers.
    pub fn coverage_rate(&self) -> f64 {
        let considered = self.totals.total() - self.totals.ignored;
        percent(self.totals.executed(), considered)
    }

    pub fn metrics(&self) -> ScoreMetrics {
        ScoreMetrics {
            msi: self.msi(),
            covered_msi: self.covered_msi(),
            coverage_rate: self.coverage_rate(),
        }
    }
}

impl ScoreMetrics {
    /// Human-readable description of every threshold these metrics miss.
    pub fn unmet(&self, thresholds: &ThresholdConfig) -> Vec<String> {
        let mut unmet = Vec::new();
        if let Some(min) = thresholds.min_msi {
            if self.msi < min {
                unmet.push(format!("MSI {:.2}% is below the minimum of {:.2}%", self.msi, min));
            }
        }
        if let Some(min) = thresholds.min_covered_msi {
            if self.covered_msi < min {
                unmet.push(format!(
                    "covered MSI {:.2}% is below the minimum of {:.2}%",
                    self.covered_msi, min
                ));
            }
        }
        unmet
    }
}

fn percent(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 * 100.0 / denominator as f64
    }
}
