//! Usage history: token counters rolled up into time windows.
//!
//! The persisted document is
//! `{version, lastUpdated, totals, <ceremonyName>: {...}}` where `totals`
//! and every ceremony carry `daily`, `weekly`, `monthly` and `allTime`
//! windows. Aggregates are only ever derived by [`UsageHistory::apply`].

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::TokenUsage;

/// Current document version.
pub const HISTORY_VERSION: u32 = 1;

/// Top-level keys a ceremony name may not use.
pub const RESERVED_NAMES: &[&str] = &["version", "lastUpdated", "totals"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UsageError {
    #[error("Ceremony name '{0}' is reserved in the usage history")]
    ReservedCeremonyName(String),

    #[error("Ceremony name must not be empty")]
    EmptyCeremonyName,
}

/// One successful generation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub ceremony: String,
    pub timestamp: DateTime<Utc>,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl UsageRecord {
    pub fn new(ceremony: impl Into<String>, usage: TokenUsage, timestamp: DateTime<Utc>) -> Self {
        Self {
            ceremony: ceremony.into(),
            timestamp,
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
        }
    }
}

/// Counters for one window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageWindow {
    pub input: u64,
    pub output: u64,
    pub total: u64,
    pub executions: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_execution: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_execution: Option<DateTime<Utc>>,
}

impl UsageWindow {
    fn add(&mut self, record: &UsageRecord) {
        self.input += record.input_tokens;
        self.output += record.output_tokens;
        self.total += record.input_tokens + record.output_tokens;
        self.executions += 1;

        let at = record.timestamp;
        self.first_execution = Some(self.first_execution.map_or(at, |f| f.min(at)));
        self.last_execution = Some(self.last_execution.map_or(at, |l| l.max(at)));
    }

    fn check(&self, label: &str) -> Result<(), String> {
        if self.total != self.input + self.output {
            return Err(format!(
                "{}: total {} != input {} + output {}",
                label, self.total, self.input, self.output
            ));
        }
        if let (Some(first), Some(last)) = (self.first_execution, self.last_execution) {
            if first > last {
                return Err(format!("{}: firstExecution is after lastExecution", label));
            }
        }
        if self.executions > 0 && (self.first_execution.is_none() || self.last_execution.is_none()) {
            return Err(format!("{}: executions recorded without timestamps", label));
        }
        Ok(())
    }
}

/// Day key, `YYYY-MM-DD`.
pub fn day_key(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

/// ISO week key, `YYYY-Www`.
pub fn week_key(at: DateTime<Utc>) -> String {
    let week = at.iso_week();
    format!("{}-W{:02}", week.year(), week.week())
}

/// Month key, `YYYY-MM`.
pub fn month_key(at: DateTime<Utc>) -> String {
    at.format("%Y-%m").to_string()
}

/// All windows for one scope (global totals or one ceremony).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeHistory {
    #[serde(default)]
    pub daily: BTreeMap<String, UsageWindow>,
    #[serde(default)]
    pub weekly: BTreeMap<String, UsageWindow>,
    #[serde(default)]
    pub monthly: BTreeMap<String, UsageWindow>,
    #[serde(default)]
    pub all_time: UsageWindow,
}

impl ScopeHistory {
    fn add(&mut self, record: &UsageRecord) {
        let at = record.timestamp;
        self.daily.entry(day_key(at)).or_default().add(record);
        self.weekly.entry(week_key(at)).or_default().add(record);
        self.monthly.entry(month_key(at)).or_default().add(record);
        self.all_time.add(record);
    }

    /// Window for the day containing `at` (empty if nothing was recorded).
    pub fn day(&self, at: DateTime<Utc>) -> UsageWindow {
        self.daily.get(&day_key(at)).cloned().unwrap_or_default()
    }

    pub fn week(&self, at: DateTime<Utc>) -> UsageWindow {
        self.weekly.get(&week_key(at)).cloned().unwrap_or_default()
    }

    pub fn month(&self, at: DateTime<Utc>) -> UsageWindow {
        self.monthly.get(&month_key(at)).cloned().unwrap_or_default()
    }

    fn windows(&self) -> impl Iterator<Item = (String, &UsageWindow)> {
        self.daily
            .iter()
            .map(|(k, w)| (format!("daily.{}", k), w))
            .chain(self.weekly.iter().map(|(k, w)| (format!("weekly.{}", k), w)))
            .chain(self.monthly.iter().map(|(k, w)| (format!("monthly.{}", k), w)))
            .chain(std::iter::once(("allTime".to_string(), &self.all_time)))
    }
}

/// The persisted usage history document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageHistory {
    pub version: u32,

    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,

    #[serde(default)]
    pub totals: ScopeHistory,

    #[serde(flatten)]
    pub ceremonies: BTreeMap<String, ScopeHistory>,
}

impl Default for UsageHistory {
    fn default() -> Self {
        Self {
            version: HISTORY_VERSION,
            last_updated: None,
            totals: ScopeHistory::default(),
            ceremonies: BTreeMap::new(),
        }
    }
}

impl UsageHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one record to the global and ceremony scopes.
    ///
    /// `last_updated` is left alone; the ledger stamps it when saving.
    pub fn apply(&mut self, record: &UsageRecord) -> Result<(), UsageError> {
        check_ceremony_name(&record.ceremony)?;
        self.totals.add(record);
        self.ceremonies
            .entry(record.ceremony.clone())
            .or_default()
            .add(record);
        Ok(())
    }

    pub fn global_all_time(&self) -> UsageWindow {
        self.totals.all_time.clone()
    }

    pub fn global_day(&self, at: DateTime<Utc>) -> UsageWindow {
        self.totals.day(at)
    }

    pub fn global_week(&self, at: DateTime<Utc>) -> UsageWindow {
        self.totals.week(at)
    }

    pub fn global_month(&self, at: DateTime<Utc>) -> UsageWindow {
        self.totals.month(at)
    }

    pub fn ceremony(&self, name: &str) -> Option<&ScopeHistory> {
        self.ceremonies.get(name)
    }

    pub fn ceremony_all_time(&self, name: &str) -> UsageWindow {
        self.ceremony(name)
            .map(|s| s.all_time.clone())
            .unwrap_or_default()
    }

    pub fn ceremony_day(&self, name: &str, at: DateTime<Utc>) -> UsageWindow {
        self.ceremony(name).map(|s| s.day(at)).unwrap_or_default()
    }

    pub fn ceremony_week(&self, name: &str, at: DateTime<Utc>) -> UsageWindow {
        self.ceremony(name).map(|s| s.week(at)).unwrap_or_default()
    }

    pub fn ceremony_month(&self, name: &str, at: DateTime<Utc>) -> UsageWindow {
        self.ceremony(name).map(|s| s.month(at)).unwrap_or_default()
    }

    /// Check the document is internally consistent.
    ///
    /// Every window must satisfy `total == input + output`, and the global
    /// totals must equal the sum over ceremonies, window by window. A
    /// document that fails this was hand-edited or partially written.
    pub fn verify(&self) -> Result<(), String> {
        for name in self.ceremonies.keys() {
            check_ceremony_name(name).map_err(|e| e.to_string())?;
        }

        for (label, window) in self.totals.windows() {
            window.check(&format!("totals.{}", label))?;
        }
        for (name, scope) in &self.ceremonies {
            for (label, window) in scope.windows() {
                window.check(&format!("{}.{}", name, label))?;
            }
        }

        let mut summed = ScopeSums::default();
        for scope in self.ceremonies.values() {
            summed.add(scope);
        }
        summed.compare(&self.totals)
    }
}

/// Whether usage can be recorded under `name`.
pub fn check_ceremony_name(name: &str) -> Result<(), UsageError> {
    if name.trim().is_empty() {
        return Err(UsageError::EmptyCeremonyName);
    }
    if RESERVED_NAMES.contains(&name) {
        return Err(UsageError::ReservedCeremonyName(name.to_string()));
    }
    Ok(())
}

/// Per-window (input, output, executions) sums across ceremonies.
#[derive(Default)]
struct ScopeSums {
    windows: BTreeMap<String, (u64, u64, u64)>,
}

impl ScopeSums {
    fn add(&mut self, scope: &ScopeHistory) {
        for (label, window) in scope.windows() {
            let entry = self.windows.entry(label).or_default();
            entry.0 += window.input;
            entry.1 += window.output;
            entry.2 += window.executions;
        }
    }

    fn compare(&self, totals: &ScopeHistory) -> Result<(), String> {
        let mut expected: BTreeMap<String, (u64, u64, u64)> = totals
            .windows()
            .map(|(label, w)| (label, (w.input, w.output, w.executions)))
            .collect();

        // An empty global allTime window is serialized even with no ceremonies
        if self.windows.is_empty() {
            expected.retain(|_, sums| *sums != (0, 0, 0));
        }

        if expected == self.windows {
            return Ok(());
        }

        let mismatch = expected
            .keys()
            .chain(self.windows.keys())
            .find(|label| expected.get(*label) != self.windows.get(*label))
            .cloned()
            .unwrap_or_default();
        Err(format!(
            "totals.{} does not equal the sum over ceremonies",
            mismatch
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn record(ceremony: &str, input: u64, output: u64, secs: i64) -> UsageRecord {
        UsageRecord::new(ceremony, TokenUsage::new(input, output), at(secs))
    }

    #[test]
    fn test_two_executions_accumulate() {
        let mut history = UsageHistory::new();
        history.apply(&record("seed", 1000, 500, 1_700_000_000)).unwrap();
        history.apply(&record("seed", 1000, 500, 1_700_000_100)).unwrap();

        let seed = history.ceremony_all_time("seed");
        assert_eq!(seed.input, 2000);
        assert_eq!(seed.output, 1000);
        assert_eq!(seed.total, 3000);
        assert_eq!(seed.executions, 2);
        assert_eq!(seed.first_execution, Some(at(1_700_000_000)));
        assert_eq!(seed.last_execution, Some(at(1_700_000_100)));

        assert_eq!(history.global_all_time(), seed);
        assert!(history.verify().is_ok());
    }

    #[test]
    fn test_window_keys() {
        // 2024-12-30 is in ISO week 1 of 2025
        let t = DateTime::parse_from_rfc3339("2024-12-30T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(day_key(t), "2024-12-30");
        assert_eq!(week_key(t), "2025-W01");
        assert_eq!(month_key(t), "2024-12");
    }

    #[test]
    fn test_windowed_getters() {
        let mut history = UsageHistory::new();
        let day1 = DateTime::parse_from_rfc3339("2025-03-03T09:00:00Z").unwrap().with_timezone(&Utc);
        let day2 = DateTime::parse_from_rfc3339("2025-03-04T09:00:00Z").unwrap().with_timezone(&Utc);
        let next_month = DateTime::parse_from_rfc3339("2025-04-01T09:00:00Z").unwrap().with_timezone(&Utc);

        history.apply(&UsageRecord::new("seed", TokenUsage::new(10, 5), day1)).unwrap();
        history.apply(&UsageRecord::new("seed", TokenUsage::new(20, 5), day2)).unwrap();
        history.apply(&UsageRecord::new("sprint", TokenUsage::new(1, 1), day2)).unwrap();

        assert_eq!(history.ceremony_day("seed", day1).total, 15);
        assert_eq!(history.ceremony_week("seed", day2).total, 40);
        assert_eq!(history.ceremony_month("seed", day1).executions, 2);
        assert_eq!(history.ceremony_month("seed", next_month), UsageWindow::default());
        assert_eq!(history.global_day(day2).total, 27);
        assert_eq!(history.global_month(day1).executions, 3);
        assert_eq!(history.ceremony_all_time("unknown"), UsageWindow::default());
    }

    #[test]
    fn test_reserved_names_rejected() {
        let mut history = UsageHistory::new();
        for name in RESERVED_NAMES {
            let err = history.apply(&record(name, 1, 1, 0)).unwrap_err();
            assert_eq!(err, UsageError::ReservedCeremonyName(name.to_string()));
        }
        assert_eq!(history.apply(&record(" ", 1, 1, 0)), Err(UsageError::EmptyCeremonyName));
        assert_eq!(history.global_all_time().executions, 0);
    }

    #[test]
    fn test_document_shape() {
        let mut history = UsageHistory::new();
        history.apply(&record("seed", 3, 4, 1_700_000_000)).unwrap();
        let json = serde_json::to_value(&history).unwrap();

        assert_eq!(json["version"], 1);
        assert_eq!(json["totals"]["allTime"]["total"], 7);
        assert_eq!(json["seed"]["allTime"]["executions"], 1);
        assert!(json["seed"]["daily"]["2023-11-14"].is_object());
        assert!(json["seed"]["allTime"]["firstExecution"].is_string());

        let back: UsageHistory = serde_json::from_value(json).unwrap();
        assert_eq!(back, history);
    }

    #[test]
    fn test_verify_detects_hand_edits() {
        let mut history = UsageHistory::new();
        history.apply(&record("seed", 3, 4, 1_700_000_000)).unwrap();

        let mut bad_total = history.clone();
        bad_total.totals.all_time.total = 99;
        assert!(bad_total.verify().unwrap_err().contains("totals.allTime"));

        let mut bad_sum = history.clone();
        bad_sum.ceremonies.get_mut("seed").unwrap().all_time.executions = 5;
        assert!(bad_sum.verify().is_err());

        let mut missing = history;
        missing.ceremonies.clear();
        assert!(missing.verify().is_err());
    }

    #[test]
    fn test_empty_history_verifies() {
        assert!(UsageHistory::new().verify().is_ok());
    }

    fn arb_record() -> impl Strategy<Value = UsageRecord> {
        (
            prop::sample::select(vec!["seed", "sprint-planning", "retro"]),
            0u64..50_000,
            0u64..50_000,
            1_600_000_000i64..1_800_000_000,
        )
            .prop_map(|(c, i, o, t)| record(c, i, o, t))
    }

    proptest! {
        #[test]
        fn prop_totals_are_additive(records in prop::collection::vec(arb_record(), 0..30)) {
            let mut history = UsageHistory::new();
            for r in &records {
                history.apply(r).unwrap();
            }

            let input: u64 = records.iter().map(|r| r.input_tokens).sum();
            let output: u64 = records.iter().map(|r| r.output_tokens).sum();
            let all = history.global_all_time();
            prop_assert_eq!(all.input, input);
            prop_assert_eq!(all.output, output);
            prop_assert_eq!(all.total, input + output);
            prop_assert_eq!(all.executions, records.len() as u64);
            prop_assert!(history.verify().is_ok());
        }

        #[test]
        fn prop_order_independent(records in prop::collection::vec(arb_record(), 0..30)) {
            let mut forward = UsageHistory::new();
            for r in &records {
                forward.apply(r).unwrap();
            }
            let mut backward = UsageHistory::new();
            for r in records.iter().rev() {
                backward.apply(r).unwrap();
            }
            prop_assert_eq!(forward, backward);
        }
    }
}
