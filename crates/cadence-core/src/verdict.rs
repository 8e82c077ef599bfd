//! Validator verdicts: the structured output of one validator run.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

/// Issue severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Major,
    Minor,
}

/// The validator's own summary status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationStatus {
    Excellent,
    Acceptable,
    NeedsImprovement,
}

/// One issue raised by a validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// Issue counts by severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub major: usize,
    pub minor: usize,
}

impl SeverityCounts {
    /// Count issues by severity.
    pub fn of(issues: &[Issue]) -> Self {
        let mut counts = Self::default();
        for issue in issues {
            match issue.severity {
                Severity::Critical => counts.critical += 1,
                Severity::Major => counts.major += 1,
                Severity::Minor => counts.minor += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.critical + self.major + self.minor
    }
}

impl std::ops::Add for SeverityCounts {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            critical: self.critical + other.critical,
            major: self.major + other.major,
            minor: self.minor + other.minor,
        }
    }
}

/// One validator's verdict on a work item.
///
/// Severity counts are always derived from `issues`, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationVerdict {
    pub validator_id: String,
    pub validation_status: ValidationStatus,
    pub overall_score: u8,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub improvement_priorities: Vec<String>,
    pub ready_for_use: bool,
}

/// Validator output as the model returns it (no validator id).
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerdictPayload {
    validation_status: ValidationStatus,
    #[serde(deserialize_with = "whole_score")]
    overall_score: u8,
    #[serde(default)]
    issues: Vec<Issue>,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    improvement_priorities: Vec<String>,
    ready_for_use: bool,
}

/// Accepts `85` and `85.0`; rejects fractions and anything outside 0..=100.
fn whole_score<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let score = f64::deserialize(deserializer)?;
    if score.fract() != 0.0 || !(0.0..=100.0).contains(&score) {
        return Err(D::Error::custom(format!(
            "overallScore must be a whole number from 0 to 100, got {}",
            score
        )));
    }
    Ok(score as u8)
}

impl ValidationVerdict {
    /// Build a verdict from a schema-checked payload.
    pub fn from_payload(validator_id: impl Into<String>, payload: &JsonValue) -> Result<Self, String> {
        let parsed: VerdictPayload =
            serde_json::from_value(payload.clone()).map_err(|e| e.to_string())?;

        Ok(Self {
            validator_id: validator_id.into(),
            validation_status: parsed.validation_status,
            overall_score: parsed.overall_score,
            issues: parsed.issues,
            strengths: parsed.strengths,
            improvement_priorities: parsed.improvement_priorities,
            ready_for_use: parsed.ready_for_use,
        })
    }

    pub fn severity_counts(&self) -> SeverityCounts {
        SeverityCounts::of(&self.issues)
    }

    pub fn has_critical(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Critical)
    }
}

/// JSON Schema every validator response must satisfy.
pub fn verdict_schema() -> JsonValue {
    serde_json::json!({
        "type": "object",
        "required": ["validationStatus", "overallScore", "issues", "strengths", "readyForUse"],
        "properties": {
            "validationStatus": {
                "type": "string",
                "enum": ["excellent", "acceptable", "needs-improvement"]
            },
            "overallScore": { "type": "integer", "minimum": 0, "maximum": 100 },
            "issues": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["severity", "description"],
                    "properties": {
                        "severity": { "type": "string", "enum": ["critical", "major", "minor"] },
                        "category": { "type": "string" },
                        "description": { "type": "string" },
                        "suggestion": { "type": "string" }
                    }
                }
            },
            "strengths": { "type": "array", "items": { "type": "string" } },
            "improvementPriorities": { "type": "array", "items": { "type": "string" } },
            "readyForUse": { "type": "boolean" }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> JsonValue {
        serde_json::json!({
            "validationStatus": "needs-improvement",
            "overallScore": 62,
            "issues": [
                {"severity": "critical", "description": "No auth on admin endpoints"},
                {"severity": "minor", "category": "naming", "description": "Inconsistent ids"},
                {"severity": "minor", "description": "Typo", "suggestion": "Fix it"}
            ],
            "strengths": ["Clear scope"],
            "improvementPriorities": ["Add authorization"],
            "readyForUse": false
        })
    }

    #[test]
    fn test_from_payload() {
        let verdict = ValidationVerdict::from_payload("security", &payload()).unwrap();
        assert_eq!(verdict.validator_id, "security");
        assert_eq!(verdict.validation_status, ValidationStatus::NeedsImprovement);
        assert_eq!(verdict.overall_score, 62);
        assert!(verdict.has_critical());
    }

    #[test]
    fn test_severity_counts_match_issues() {
        let verdict = ValidationVerdict::from_payload("security", &payload()).unwrap();
        let counts = verdict.severity_counts();
        assert_eq!(counts, SeverityCounts { critical: 1, major: 0, minor: 2 });
        assert_eq!(counts.total(), verdict.issues.len());
    }

    #[test]
    fn test_score_above_100_rejected() {
        let mut p = payload();
        p["overallScore"] = serde_json::json!(140);
        assert!(ValidationVerdict::from_payload("security", &p).is_err());
    }

    #[test]
    fn test_integral_float_score_accepted() {
        let mut p = payload();
        p["overallScore"] = serde_json::json!(85.0);
        let verdict = ValidationVerdict::from_payload("security", &p).unwrap();
        assert_eq!(verdict.overall_score, 85);
    }

    #[test]
    fn test_fractional_score_rejected_with_clear_reason() {
        let mut p = payload();
        p["overallScore"] = serde_json::json!(85.5);
        let err = ValidationVerdict::from_payload("security", &p).unwrap_err();
        assert!(err.contains("whole number from 0 to 100"), "{}", err);
    }

    #[test]
    fn test_missing_ready_flag_rejected() {
        let mut p = payload();
        p.as_object_mut().unwrap().remove("readyForUse");
        assert!(ValidationVerdict::from_payload("security", &p).is_err());
    }

    #[test]
    fn test_serializes_camel_case() {
        let verdict = ValidationVerdict::from_payload("security", &payload()).unwrap();
        let json = serde_json::to_value(&verdict).unwrap();
        assert_eq!(json["validatorId"], "security");
        assert_eq!(json["readyForUse"], false);
        assert_eq!(json["validationStatus"], "needs-improvement");
    }
}
