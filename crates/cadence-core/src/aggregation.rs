//! Aggregator: combines validator verdicts into one report.
//!
//! The aggregation rules are fixed:
//! 1. Consensus score is the mean of `overallScore` over verdicts that
//!    completed. Failed validators are excluded, never scored as zero.
//! 2. Severity counts are summed over completed verdicts.
//! 3. The item is ready only if at least one verdict completed, every
//!    completed verdict is ready, and no completed verdict raised a
//!    critical issue.
//! 4. Failed validators are always listed.

use serde::{Deserialize, Serialize};

use crate::validators::SelectionRecord;
use crate::verdict::{SeverityCounts, ValidationVerdict};

/// Phases of a validation run, in the only order they may occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    Selecting,
    Dispatching,
    Collecting,
    Aggregating,
    Done,
}

impl RunPhase {
    /// The phase after this one; `Done` is terminal.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Selecting => Some(Self::Dispatching),
            Self::Dispatching => Some(Self::Collecting),
            Self::Collecting => Some(Self::Aggregating),
            Self::Aggregating => Some(Self::Done),
            Self::Done => None,
        }
    }
}

/// A validator that did not produce a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorFailure {
    pub validator_id: String,

    #[serde(default)]
    pub status: FailureStatus,

    /// Error kind tag (e.g. "invalid-response", "rate-limit")
    pub error_kind: String,

    /// The error as reported by the generation layer
    pub message: String,
}

/// Outcome tag carried by every failure entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureStatus {
    #[default]
    Failed,
}

impl ValidatorFailure {
    pub fn new(validator_id: impl Into<String>, error_kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            validator_id: validator_id.into(),
            status: FailureStatus::Failed,
            error_kind: error_kind.into(),
            message: message.into(),
        }
    }
}

/// The aggregated outcome of one validation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedReport {
    /// Work item id
    pub item_id: String,

    /// Verdicts from validators that completed
    pub verdicts: Vec<ValidationVerdict>,

    /// Ids of validators that failed
    pub failed_validator_ids: Vec<String>,

    /// Failure details, same order as `failed_validator_ids`
    pub failures: Vec<ValidatorFailure>,

    /// Mean score over completed verdicts; `None` when none completed
    pub consensus_score: Option<f64>,

    pub critical_count: usize,
    pub major_count: usize,
    pub minor_count: usize,

    pub ready_for_use: bool,

    /// How validators were chosen
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<SelectionRecord>,

    /// Phases the run passed through
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phases: Vec<RunPhase>,
}

impl AggregatedReport {
    /// True when at least one validator failed.
    pub fn is_partial(&self) -> bool {
        !self.failed_validator_ids.is_empty()
    }

    pub fn severity_counts(&self) -> SeverityCounts {
        SeverityCounts {
            critical: self.critical_count,
            major: self.major_count,
            minor: self.minor_count,
        }
    }

    /// Human-readable summary. Failed validators are always listed.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();

        let score = self
            .consensus_score
            .map(|s| format!("{:.1}", s))
            .unwrap_or_else(|| "n/a".to_string());
        lines.push(format!(
            "{}: consensus {} from {} of {} validators, {}",
            self.item_id,
            score,
            self.verdicts.len(),
            self.verdicts.len() + self.failures.len(),
            if self.ready_for_use { "READY" } else { "NOT READY" }
        ));
        lines.push(format!(
            "issues: {} critical, {} major, {} minor",
            self.critical_count, self.major_count, self.minor_count
        ));

        for verdict in &self.verdicts {
            lines.push(format!(
                "  [ok]     {} score {} ({} issues){}",
                verdict.validator_id,
                verdict.overall_score,
                verdict.issues.len(),
                if verdict.ready_for_use { "" } else { ", not ready" }
            ));
        }
        for failure in &self.failures {
            lines.push(format!(
                "  [FAILED] {} ({}): {}",
                failure.validator_id, failure.error_kind, failure.message
            ));
        }

        lines
    }
}

/// Combines verdicts and failures into an [`AggregatedReport`].
#[derive(Debug, Default)]
pub struct Aggregator;

impl Aggregator {
    pub fn new() -> Self {
        Self
    }

    /// Split per-validator results into completed verdicts and failures.
    pub fn partition(
        results: Vec<Result<ValidationVerdict, ValidatorFailure>>,
    ) -> (Vec<ValidationVerdict>, Vec<ValidatorFailure>) {
        let mut verdicts = Vec::new();
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(v) => verdicts.push(v),
                Err(f) => failures.push(f),
            }
        }
        (verdicts, failures)
    }

    /// Aggregate completed verdicts and failures for one item.
    pub fn aggregate(
        &self,
        item_id: impl Into<String>,
        verdicts: Vec<ValidationVerdict>,
        failures: Vec<ValidatorFailure>,
    ) -> AggregatedReport {
        let consensus_score = consensus(&verdicts);

        let counts = verdicts
            .iter()
            .map(ValidationVerdict::severity_counts)
            .fold(SeverityCounts::default(), |acc, c| acc + c);

        let ready_for_use = !verdicts.is_empty()
            && verdicts.iter().all(|v| v.ready_for_use)
            && counts.critical == 0;

        AggregatedReport {
            item_id: item_id.into(),
            failed_validator_ids: failures.iter().map(|f| f.validator_id.clone()).collect(),
            failures,
            verdicts,
            consensus_score,
            critical_count: counts.critical,
            major_count: counts.major,
            minor_count: counts.minor,
            ready_for_use,
            selection: None,
            phases: Vec::new(),
        }
    }
}

fn consensus(verdicts: &[ValidationVerdict]) -> Option<f64> {
    if verdicts.is_empty() {
        return None;
    }
    let sum: f64 = verdicts.iter().map(|v| f64::from(v.overall_score)).sum();
    Some(sum / verdicts.len() as f64)
}
