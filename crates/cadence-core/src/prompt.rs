//! Prompt assembly: placeholder substitution, agent instructions and output
//! budget classes.
//!
//! Placeholders use `{{NAME}}` syntax. Substitution is a single pass over the
//! template, so substituted values are opaque text: a value that itself
//! contains `{{OTHER}}` is emitted verbatim and never expanded.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

lazy_static! {
    /// `{{ NAME }}` with optional inner whitespace.
    static ref PLACEHOLDER: Regex =
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.\-]*)\s*\}\}").unwrap();
}

/// Errors from prompt assembly.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("Unresolved placeholders: {}", .0.join(", "))]
    UnresolvedPlaceholders(Vec<String>),

    #[error("Unknown template reference: {0}")]
    UnknownTemplate(String),
}

/// Named output-size classes. Callers pick a class, never a raw number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputBudget {
    /// A single value: a name, a label, a short list of ids
    Small,
    /// Several fields or a structured verdict
    #[default]
    Medium,
    /// A full document
    Large,
}

impl OutputBudget {
    /// Maximum output tokens for this class.
    pub fn max_tokens(&self) -> u32 {
        match self {
            OutputBudget::Small => 512,
            OutputBudget::Medium => 4_096,
            OutputBudget::Large => 16_384,
        }
    }
}

/// Where agent instructions go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstructionPlacement {
    /// Prepended to the prompt text
    #[default]
    Inline,
    /// Sent separately as the backend's system prompt
    System,
}

/// A request for one generation call, before assembly.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    /// Template text with `{{NAME}}` placeholders
    pub template: String,

    /// Placeholder values
    pub values: BTreeMap<String, String>,

    /// Output size class
    pub budget: OutputBudget,

    /// Optional agent instructions
    pub agent_instructions: Option<String>,

    /// Where the agent instructions go
    pub placement: InstructionPlacement,

    /// JSON Schema the output must satisfy, when structured output is expected
    pub output_schema: Option<JsonValue>,
}

impl GenerationRequest {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            ..Default::default()
        }
    }

    /// Supply a placeholder value.
    pub fn value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn budget(mut self, budget: OutputBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.agent_instructions = Some(instructions.into());
        self
    }

    pub fn placement(mut self, placement: InstructionPlacement) -> Self {
        self.placement = placement;
        self
    }

    /// Expect structured output matching `schema`.
    pub fn structured(mut self, schema: JsonValue) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn expects_structured_output(&self) -> bool {
        self.output_schema.is_some()
    }
}

/// A fully assembled prompt ready for an adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledPrompt {
    /// User-facing prompt text (with inline instructions, if any)
    pub text: String,

    /// System instructions, when placement is [`InstructionPlacement::System`]
    pub system: Option<String>,

    /// Output budget class
    pub budget: OutputBudget,
}

impl AssembledPrompt {
    pub fn max_tokens(&self) -> u32 {
        self.budget.max_tokens()
    }
}

/// Fills templates and attaches agent instructions.
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    separator: String,
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self {
            separator: "\n\n".to_string(),
        }
    }
}

impl PromptAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different separator between instructions and prompt.
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Assemble a request into prompt text.
    pub fn assemble(&self, request: &GenerationRequest) -> Result<AssembledPrompt, AssemblyError> {
        let body = fill(&request.template, &request.values)?;

        let instructions = request
            .agent_instructions
            .as_deref()
            .filter(|i| !i.trim().is_empty());

        let (text, system) = match (instructions, request.placement) {
            (Some(i), InstructionPlacement::Inline) => {
                (format!("{}{}{}", i.trim_end(), self.separator, body), None)
            }
            (Some(i), InstructionPlacement::System) => (body, Some(i.to_string())),
            (None, _) => (body, None),
        };

        Ok(AssembledPrompt {
            text,
            system,
            budget: request.budget,
        })
    }
}

/// Substitute every `{{NAME}}` in `template` with its value.
///
/// Fails with every missing name (sorted, deduplicated) if any placeholder
/// has no value. Values supplied but not referenced are ignored.
pub fn fill(template: &str, values: &BTreeMap<String, String>) -> Result<String, AssemblyError> {
    let missing: BTreeSet<String> = PLACEHOLDER
        .captures_iter(template)
        .map(|c| c[1].to_string())
        .filter(|name| !values.contains_key(name))
        .collect();

    if !missing.is_empty() {
        return Err(AssemblyError::UnresolvedPlaceholders(missing.into_iter().collect()));
    }

    let filled = PLACEHOLDER.replace_all(template, |caps: &Captures| {
        // Presence checked above
        values.get(&caps[1]).cloned().unwrap_or_default()
    });

    Ok(filled.into_owned())
}

/// Names of all placeholders in a template, in order of first appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    PLACEHOLDER
        .captures_iter(template)
        .map(|c| c[1].to_string())
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_fill_hello_world() {
        let out = fill("Hello {{NAME}}", &values(&[("NAME", "World")])).unwrap();
        assert_eq!(out, "Hello World");
    }

    #[test]
    fn test_fill_missing_value_is_error() {
        let err = fill("Hello {{NAME}}", &BTreeMap::new()).unwrap_err();
        assert_eq!(err, AssemblyError::UnresolvedPlaceholders(vec!["NAME".to_string()]));
    }

    #[test]
    fn test_fill_reports_all_missing_names_once() {
        let err = fill("{{B}} {{A}} {{B}} {{C}}", &values(&[("C", "x")])).unwrap_err();
        assert_eq!(
            err,
            AssemblyError::UnresolvedPlaceholders(vec!["A".to_string(), "B".to_string()])
        );
        assert_eq!(err.to_string(), "Unresolved placeholders: A, B");
    }

    #[test]
    fn test_fill_repeated_placeholder() {
        let out = fill("{{X}}-{{ X }}", &values(&[("X", "1")])).unwrap();
        assert_eq!(out, "1-1");
    }

    #[test]
    fn test_values_are_opaque() {
        let out = fill(
            "Item: {{ITEM}}",
            &values(&[("ITEM", "{{SECRET}} $1 ${0}"), ("SECRET", "leaked")]),
        )
        .unwrap();
        assert_eq!(out, "Item: {{SECRET}} $1 ${0}");
    }

    #[test]
    fn test_placeholders_in_order() {
        assert_eq!(
            placeholders("{{B}} {{A}} {{B}}"),
            vec!["B".to_string(), "A".to_string()]
        );
    }

    #[test]
    fn test_inline_instructions_prepended() {
        let request = GenerationRequest::new("Describe {{THING}}")
            .value("THING", "the backlog")
            .instructions("You are a product owner.");
        let prompt = PromptAssembler::new().assemble(&request).unwrap();

        assert_eq!(prompt.text, "You are a product owner.\n\nDescribe the backlog");
        assert_eq!(prompt.system, None);
    }

    #[test]
    fn test_system_instructions_kept_separate() {
        let request = GenerationRequest::new("Describe it")
            .instructions("You are a product owner.")
            .placement(InstructionPlacement::System);
        let prompt = PromptAssembler::new().assemble(&request).unwrap();

        assert_eq!(prompt.text, "Describe it");
        assert_eq!(prompt.system.as_deref(), Some("You are a product owner."));
    }

    #[test]
    fn test_blank_instructions_ignored() {
        let request = GenerationRequest::new("Describe it").instructions("   ");
        let prompt = PromptAssembler::new().assemble(&request).unwrap();
        assert_eq!(prompt.text, "Describe it");
    }

    #[test]
    fn test_budget_classes() {
        assert!(OutputBudget::Small.max_tokens() < OutputBudget::Medium.max_tokens());
        assert!(OutputBudget::Medium.max_tokens() < OutputBudget::Large.max_tokens());

        let request = GenerationRequest::new("x").budget(OutputBudget::Large);
        let prompt = PromptAssembler::new().assemble(&request).unwrap();
        assert_eq!(prompt.max_tokens(), 16_384);
    }

    proptest! {
        #[test]
        fn prop_fill_is_total(
            names in proptest::collection::btree_set("[A-Z][A-Z0-9_]{0,6}", 1..6),
            filler in "[a-z ]{0,12}",
        ) {
            let template: String = names
                .iter()
                .map(|n| format!("{} {{{{{}}}}}", filler, n))
                .collect::<Vec<_>>()
                .join("|");
            let vals: BTreeMap<String, String> =
                names.iter().map(|n| (n.clone(), format!("<{}>", n.to_lowercase()))).collect();

            let out = fill(&template, &vals).unwrap();
            prop_assert!(!out.contains("{{"));
            for n in &names {
                let expected = format!("<{}>", n.to_lowercase());
                prop_assert_eq!(out.matches(expected.as_str()).count(), 1);
            }

            let mut partial = vals.clone();
            let dropped = names.iter().next().unwrap().clone();
            partial.remove(&dropped);
            prop_assert_eq!(
                fill(&template, &partial),
                Err(AssemblyError::UnresolvedPlaceholders(vec![dropped]))
            );
        }
    }
}
