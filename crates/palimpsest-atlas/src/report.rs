//! Validation reports produced by the consistency judge
//!
//! A report is ephemeral: it is produced per judging pass, acted on, and
//! discarded. Region verdicts correlate back to the atlas by `RegionId`.

use crate::region::RegionId;
use serde::{Deserialize, Serialize};

/// Verdict status for one checked region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionStatus {
    Pass,
    Fail,
}

/// One region's validation result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionVerdict {
    /// Region this verdict refers to; must exist in the checked subset
    pub region_id: RegionId,
    /// Pass/fail classification
    pub status: RegionStatus,
    /// Human-readable failure (or pass) rationale
    pub reason: String,
    /// Judge confidence in this verdict, 0-1
    pub confidence: f64,
}

impl RegionVerdict {
    /// Passing verdict
    #[must_use]
    pub fn pass(region_id: RegionId, reason: impl Into<String>, confidence: f64) -> Self {
        Self {
            region_id,
            status: RegionStatus::Pass,
            reason: reason.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Failing verdict
    #[must_use]
    pub fn fail(region_id: RegionId, reason: impl Into<String>, confidence: f64) -> Self {
        Self {
            region_id,
            status: RegionStatus::Fail,
            reason: reason.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Whether this verdict is a failure
    #[inline]
    #[must_use]
    pub fn is_fail(&self) -> bool {
        self.status == RegionStatus::Fail
    }
}

/// Aggregated result of one judging pass
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// True iff no region verdict is FAIL
    pub is_consistent: bool,
    /// Per-region verdicts for the checked subset
    pub results: Vec<RegionVerdict>,
    /// Free-text summary of the pass
    pub global_critique: String,
}

impl ValidationReport {
    /// Build a report; consistency is derived from the verdicts
    #[must_use]
    pub fn new(results: Vec<RegionVerdict>, global_critique: impl Into<String>) -> Self {
        let is_consistent = !results.iter().any(RegionVerdict::is_fail);
        Self {
            is_consistent,
            results,
            global_critique: global_critique.into(),
        }
    }

    /// Failing verdicts
    pub fn failing(&self) -> impl Iterator<Item = &RegionVerdict> {
        self.results.iter().filter(|v| v.is_fail())
    }

    /// Replace verdicts for re-judged regions, keeping the rest
    ///
    /// Used after a refinement pass: only refined regions are re-judged and
    /// their fresh verdicts supersede the stale ones. Consistency is
    /// recomputed over the merged set.
    #[must_use]
    pub fn merged_with(&self, fresh: Vec<RegionVerdict>) -> Self {
        let mut results: Vec<RegionVerdict> = self
            .results
            .iter()
            .filter(|v| !fresh.iter().any(|f| f.region_id == v.region_id))
            .cloned()
            .collect();
        results.extend(fresh);
        Self::new(results, self.global_critique.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consistency_derived_from_verdicts() {
        let ok = ValidationReport::new(
            vec![RegionVerdict::pass(RegionId::new("r1"), "verbatim match", 0.9)],
            "clean",
        );
        assert!(ok.is_consistent);

        let bad = ValidationReport::new(
            vec![
                RegionVerdict::pass(RegionId::new("r1"), "verbatim match", 0.9),
                RegionVerdict::fail(RegionId::new("r2"), "illegible text", 0.8),
            ],
            "one miss",
        );
        assert!(!bad.is_consistent);
        assert_eq!(bad.failing().count(), 1);
    }

    #[test]
    fn empty_report_is_consistent() {
        assert!(ValidationReport::new(Vec::new(), "nothing to validate").is_consistent);
    }

    #[test]
    fn merge_replaces_only_rejudged_regions() {
        let first = ValidationReport::new(
            vec![
                RegionVerdict::fail(RegionId::new("r1"), "illegible text", 0.8),
                RegionVerdict::pass(RegionId::new("r2"), "ok", 0.9),
            ],
            "pass 1",
        );

        let merged = first.merged_with(vec![RegionVerdict::pass(
            RegionId::new("r1"),
            "fixed after refinement",
            0.85,
        )]);

        assert!(merged.is_consistent);
        assert_eq!(merged.results.len(), 2);
        let r1 = merged
            .results
            .iter()
            .find(|v| v.region_id == RegionId::new("r1"))
            .unwrap();
        assert_eq!(r1.status, RegionStatus::Pass);
    }
}
