//! Line-to-test coverage index and per-mutation test selection.

use crate::ast::normalize_path;
use crate::mutation::Mutation;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::time::Duration;

/// Identifier of one test as the test runner names it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestId(pub String);

impl TestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TestId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Coverage report as produced by the coverage collaborator.
///
/// ```json
/// {
///   "files": { "src/Foo.php": { "12": ["FooTest::test_bar"] } },
///   "durations_ms": { "FooTest::test_bar": 35 }
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoverageReport {
    #[serde(default)]
    pub files: BTreeMap<String, BTreeMap<u32, Vec<String>>>,
    #[serde(default)]
    pub durations_ms: BTreeMap<String, u64>,
}

/// Read-only index built once per run and shared by all workers.
#[derive(Debug, Clone, Default)]
pub struct CoverageIndex {
    lines: HashMap<String, BTreeMap<u32, BTreeSet<TestId>>>,
    durations: HashMap<TestId, Duration>,
}

impl CoverageIndex {
    pub fn from_report(report: CoverageReport) -> Self {
        let lines = report
            .files
            .into_iter()
            .map(|(file, lines)| {
                let lines = lines
                    .into_iter()
                    .map(|(line, tests)| (line, tests.into_iter().map(TestId).collect()))
                    .collect();
                (normalize_path(Path::new(&file)), lines)
            })
            .collect();
        let durations = report
            .durations_ms
            .into_iter()
            .map(|(test, ms)| (TestId(test), Duration::from_millis(ms)))
            .collect();
        Self { lines, durations }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read coverage report from {:?}", path))?;
        let report: CoverageReport = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse coverage report from {:?}", path))?;
        Ok(Self::from_report(report))
    }

    /// Tests executing any line in `start..=end` of `file`.
    pub fn covering(&self, file: &str, start: u32, end: u32) -> BTreeSet<TestId> {
        let Some(lines) = self.lines.get(file) else {
            return BTreeSet::new();
        };
        if start > end {
            return BTreeSet::new();
        }
        lines
            .range(start..=end)
            .flat_map(|(_, tests)| tests.iter().cloned())
            .collect()
    }

    /// The tests to run against a mutant. Empty means the mutant is not covered.
    pub fn select(&self, mutation: &Mutation) -> BTreeSet<TestId> {
        match mutation.location.lines() {
            Some(lines) => {
                let file = normalize_path(&mutation.location.file);
                self.covering(&file, *lines.start(), *lines.end())
            }
            None => BTreeSet::new(),
        }
    }

    /// Expected baseline time for running `tests`. Falls back to the full
    /// suite's time when any of them has no recorded duration.
    pub fn subset_duration(&self, tests: &BTreeSet<TestId>, baseline_total: Duration) -> Duration {
        let mut total = Duration::ZERO;
        for test in tests {
            match self.durations.get(test) {
                Some(duration) => total += *duration,
                None => return baseline_total,
            }
        }
        total
    }

    pub fn file_count(&self) -> usize {
        self.lines.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builder::TreeBuilder;
    use crate::mutation::{Mutation, Replacement};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn report() -> CoverageReport {
        serde_json::from_str(
            r#"{
                "files": {
                    "./src/a.php": {
                        "1": ["t1"],
                        "2": ["t1", "t2"],
                        "5": ["t3"]
                    },
                    "src/b.php": { "1": ["t4"] }
                },
                "durations_ms": { "t1": 100, "t2": 250, "t3": 40 }
            }"#,
        )
        .unwrap()
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    #[test]
    fn test_covering_unions_line_range() {
        let index = CoverageIndex::from_report(report());
        let tests = index.covering("src/a.php", 1, 2);
        assert_eq!(tests, ["t1", "t2"].into_iter().map(TestId::from).collect());

        let tests = index.covering("src/a.php", 3, 5);
        assert_eq!(tests, [TestId::from("t3")].into_iter().collect());
    }

    #[test]
    fn test_covering_misses() {
        let index = CoverageIndex::from_report(report());
        assert!(index.covering("src/a.php", 3, 4).is_empty());
        assert!(index.covering("src/c.php", 1, 100).is_empty());
        assert!(index.covering("src/a.php", 5, 1).is_empty());
    }

    #[test]
    fn test_select_uses_mutation_location() {
        let mut b = TreeBuilder::new();
        let value = b.int(1);
        let ret = b.ret(Some(value));
        let root = b.unit(vec![ret]);
        let unit = b.finish("./src/b.php", root).unwrap();
        let target = value.base().unwrap();
        let mutation = Mutation::new("test", &unit, target, Replacement::retained(target), "noop");

        let index = CoverageIndex::from_report(report());
        assert_eq!(index.select(&mutation), [TestId::from("t4")].into_iter().collect());
    }

    #[test]
    fn test_select_without_position_is_empty() {
        let mut b = TreeBuilder::new();
        let value = b.int(1);
        let ret = b.ret(Some(value));
        let root = b.unit(vec![ret]);
        let unit = b.finish("src/b.php", root).unwrap();
        let target = value.base().unwrap();
        let mut mutation = Mutation::new("test", &unit, target, Replacement::retained(target), "noop");
        mutation.location.start_line = 0;

        let index = CoverageIndex::from_report(report());
        assert!(index.select(&mutation).is_empty());
    }

    #[test]
    fn test_file_count() {
        let index = CoverageIndex::from_report(report());
        assert_eq!(index.file_count(), 2);
    }

    // =========================================================================
    // Timing
    // =========================================================================

    #[test]
    fn test_subset_duration_sums_known_tests() {
        let index = CoverageIndex::from_report(report());
        let tests = ["t1", "t2"].into_iter().map(TestId::from).collect();
        assert_eq!(
            index.subset_duration(&tests, Duration::from_secs(10)),
            Duration::from_millis(350)
        );
    }

    #[test]
    fn test_subset_duration_falls_back_to_baseline() {
        let index = CoverageIndex::from_report(report());
        let tests = ["t1", "t4"].into_iter().map(TestId::from).collect();
        assert_eq!(
            index.subset_duration(&tests, Duration::from_secs(10)),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(serde_json::to_string(&report()).unwrap().as_bytes())
            .unwrap();

        let index = CoverageIndex::load(file.path()).unwrap();
        assert_eq!(index.covering("src/a.php", 2, 2).len(), 2);
    }

    #[test]
    fn test_load_invalid_report() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"not json").unwrap();
        assert!(CoverageIndex::load(file.path()).is_err());
    }
}
