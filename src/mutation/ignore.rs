//! Regions excluded from mutation: `[[ignore]]` entries and in-source markers.

use super::Mutation;
use crate::ast::SourceUnit;
use crate::config::{ConfigError, IgnoreEntry, MarkerConfig};
use std::ops::RangeInclusive;

#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    entries: Vec<IgnoreEntry>,
    markers: Option<(String, String)>,
}

impl IgnoreRules {
    /// Fails when an entry names an operator not in `known_operators`.
    pub fn new(
        entries: Vec<IgnoreEntry>,
        markers: &MarkerConfig,
        known_operators: &[&str],
    ) -> Result<Self, ConfigError> {
        for entry in &entries {
            if let Some(operator) = entry
                .operators
                .iter()
                .find(|op| !known_operators.contains(&op.as_str()))
            {
                return Err(ConfigError::UnknownIgnoredOperator {
                    glob: entry.glob.clone(),
                    operator: operator.clone(),
                });
            }
        }

        let markers = markers
            .enabled
            .then(|| (markers.off.clone(), markers.on.clone()));
        Ok(Self { entries, markers })
    }

    /// Rules that apply to one unit, with its marker regions resolved.
    pub fn for_unit(&self, unit: &SourceUnit) -> UnitIgnores<'_> {
        let path = unit.display_path();
        let entries = self
            .entries
            .iter()
            .filter(|entry| glob_match::glob_match(&entry.glob, &path))
            .collect();
        let regions = match &self.markers {
            Some((off, on)) => marker_regions(&unit.source, off, on),
            None => Vec::new(),
        };
        UnitIgnores { entries, regions }
    }
}

pub struct UnitIgnores<'a> {
    entries: Vec<&'a IgnoreEntry>,
    regions: Vec<RangeInclusive<u32>>,
}

impl UnitIgnores<'_> {
    pub fn is_ignored(&self, mutation: &Mutation) -> bool {
        let lines = mutation.location.lines();

        let by_entry = self.entries.iter().any(|entry| {
            let operator_matches = entry.operators.is_empty()
                || entry.operators.iter().any(|op| *op == mutation.operator);
            if !operator_matches {
                return false;
            }
            if entry.start_line.is_none() && entry.end_line.is_none() {
                return true;
            }
            let range = entry.start_line.unwrap_or(1)..=entry.end_line.unwrap_or(u32::MAX);
            lines
                .as_ref()
                .is_some_and(|lines| overlaps(lines, &range))
        });

        by_entry
            || lines
                .as_ref()
                .is_some_and(|lines| self.regions.iter().any(|region| overlaps(lines, region)))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.regions.is_empty()
    }
}

fn overlaps(a: &RangeInclusive<u32>, b: &RangeInclusive<u32>) -> bool {
    a.start() <= b.end() && b.start() <= a.end()
}

/// Line ranges between an `off` marker and the next `on` marker, both lines
/// included. An unterminated region runs to the end of the file.
fn marker_regions(source: &str, off: &str, on: &str) -> Vec<RangeInclusive<u32>> {
    let mut regions = Vec::new();
    let mut open: Option<u32> = None;
    let mut last_line = 0;

    for (idx, line) in source.lines().enumerate() {
        let line_no = idx as u32 + 1;
        last_line = line_no;
        match open {
            None if line.contains(off) => open = Some(line_no),
            Some(start) if line.contains(on) => {
                regions.push(start..=line_no);
                open = None;
            }
            _ => {}
        }
    }
    if let Some(start) = open {
        regions.push(start..=last_line.max(start));
    }
    regions
}
