//! Prompt text shared by every validation run.
//!
//! Validator templates come from a [`TemplateStore`](crate::templates::TemplateStore)
//! and may use these placeholders:
//! - `{{VALIDATOR_ID}}`, `{{DOMAIN}}`
//! - `{{ITEM_ID}}`, `{{ITEM_TITLE}}`, `{{ITEM_CONTEXT}}`
//!
//! The agent instructions below are attached to every validator request. The
//! response schema itself is appended by the adapter.

use serde_json::Value as JsonValue;

/// Instructions attached to every validator call.
pub const VALIDATOR_INSTRUCTIONS: &str = r#"
You are one validator in an independent review panel.

You see only the work item and your own focus area. You have no visibility
into other validators or their findings.

## Review rules
1. Judge the item only against your focus area
2. Every issue needs a concrete description; add a suggestion when you can
3. Use "critical" only for problems that make the item unsafe or unbuildable
4. readyForUse is false whenever you raise a critical issue

## Output Format (JSON)
{
  "validationStatus": "excellent" | "acceptable" | "needs-improvement",
  "overallScore": 0-100,
  "issues": [
    {
      "severity": "critical" | "major" | "minor",
      "category": "short label",
      "description": "what is wrong",
      "suggestion": "how to fix it"
    }
  ],
  "strengths": ["..."],
  "improvementPriorities": ["..."],
  "readyForUse": true | false
}
"#;

/// Template used for every catalog validator when no template directory is
/// configured.
pub const GENERIC_VALIDATOR_TEMPLATE: &str = r#"Validator: {{VALIDATOR_ID}}
Focus area: {{DOMAIN}}

Review the work item below from the {{DOMAIN}} point of view.

## Work item {{ITEM_ID}}: {{ITEM_TITLE}}

{{ITEM_CONTEXT}}
"#;

/// Marker line that identifies a classification prompt.
pub const CLASSIFICATION_HEADER: &str = "Validator classification";

/// Prompt for the optional classification call.
pub const CLASSIFICATION_TEMPLATE: &str = r#"Validator classification

Choose which validators should review the work item below. Universal
validators always run; pick the additional ones whose focus area the item
actually touches. Choose between {{MIN}} and {{MAX}} validators in total.

## Available validators
{{CATALOG}}

## Work item {{ITEM_ID}}: {{ITEM_TITLE}}

{{ITEM_CONTEXT}}

Respond with JSON: {"validators": ["validator-id", ...]}
"#;

/// Schema for the classification response.
pub fn classification_schema() -> JsonValue {
    serde_json::json!({
        "type": "object",
        "required": ["validators"],
        "properties": {
            "validators": {
                "type": "array",
                "items": { "type": "string" }
            }
        }
    })
}

/// One line per catalog entry, for the classification prompt.
pub fn catalog_listing() -> String {
    cadence_core::CATALOG
        .iter()
        .map(|spec| {
            let marker = if spec.universal { " (universal)" } else { "" };
            format!("- {} [{}]{}", spec.id, spec.domain, marker)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
