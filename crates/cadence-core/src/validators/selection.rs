//! Validator selection: static keyword rules and classified selections.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::catalog::{find, ValidatorSpec, CATALOG};
use super::WorkItem;

/// How many validators a run may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionBounds {
    pub min: usize,
    pub max: usize,
}

impl Default for SelectionBounds {
    fn default() -> Self {
        Self { min: 5, max: 8 }
    }
}

impl SelectionBounds {
    /// Bounds clamped to what the catalog can supply, with `min <= max`.
    pub fn normalized(self) -> Self {
        let max = self.max.clamp(1, CATALOG.len());
        let min = self.min.min(max);
        Self { min, max }
    }
}

/// How a selection was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionMethod {
    /// Static keyword rules
    Static,
    /// An extra classification call chose the validators
    Classified,
    /// Classification was requested but failed; static rules were used
    ClassificationFallback,
}

/// The recorded selection for one validation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionRecord {
    pub method: SelectionMethod,
    pub validator_ids: Vec<String>,
    /// Keywords that matched, for static selections
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matched_keywords: Vec<String>,
}

impl SelectionRecord {
    /// Build a record from classifier output.
    ///
    /// Unknown ids are dropped, duplicates collapsed, universal validators
    /// kept first, and the result clamped to `bounds`.
    pub fn from_classified(ids: &[String], bounds: SelectionBounds) -> Self {
        let bounds = bounds.normalized();
        let mut picked: Vec<&'static ValidatorSpec> = CATALOG.iter().filter(|v| v.universal).collect();

        for id in ids {
            match find(id.trim()) {
                Some(spec) if !picked.iter().any(|p| p.id == spec.id) => picked.push(spec),
                Some(_) => {}
                None => tracing::debug!(validator = %id, "Classifier proposed unknown validator, ignoring"),
            }
        }

        Self {
            method: SelectionMethod::Classified,
            validator_ids: clamp(picked, bounds),
            matched_keywords: Vec::new(),
        }
    }

    /// Mark a static selection as the fallback after a failed classification.
    pub fn into_fallback(mut self) -> Self {
        self.method = SelectionMethod::ClassificationFallback;
        self
    }

    /// Catalog entries for the selected ids.
    pub fn specs(&self) -> Vec<&'static ValidatorSpec> {
        self.validator_ids.iter().filter_map(|id| find(id)).collect()
    }
}

/// Select validators for an item from static keyword rules.
///
/// Universal validators come first, then keyword matches ordered by hit
/// count (catalog order breaks ties). The list is cut to `bounds.max` and
/// padded to `bounds.min` in catalog order.
pub fn select_static(item: &WorkItem, bounds: SelectionBounds) -> SelectionRecord {
    let bounds = bounds.normalized();
    let tokens = tokenize(&item.signal_text());

    let mut matched_keywords = Vec::new();
    let mut scored: Vec<(usize, usize, &'static ValidatorSpec)> = Vec::new();

    for (position, spec) in CATALOG.iter().enumerate() {
        if spec.universal {
            continue;
        }
        let hits: Vec<&str> = spec
            .keywords
            .iter()
            .copied()
            .filter(|kw| tokens.contains(*kw))
            .collect();
        if !hits.is_empty() {
            matched_keywords.extend(hits.iter().map(|h| h.to_string()));
            scored.push((hits.len(), position, spec));
        }
    }

    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

    let mut picked: Vec<&'static ValidatorSpec> = CATALOG.iter().filter(|v| v.universal).collect();
    picked.extend(scored.into_iter().map(|(_, _, spec)| spec));

    matched_keywords.sort();
    matched_keywords.dedup();

    SelectionRecord {
        method: SelectionMethod::Static,
        validator_ids: clamp(picked, bounds),
        matched_keywords,
    }
}

fn clamp(mut picked: Vec<&'static ValidatorSpec>, bounds: SelectionBounds) -> Vec<String> {
    picked.truncate(bounds.max);

    for spec in CATALOG {
        if picked.len() >= bounds.min {
            break;
        }
        if !picked.iter().any(|p| p.id == spec.id) {
            picked.push(spec);
        }
    }

    picked.into_iter().map(|s| s.id.to_string()).collect()
}

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '-'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_item_gets_universal_plus_padding() {
        let item = WorkItem::new("e1", "Rename a button");
        let record = select_static(&item, SelectionBounds::default());

        assert_eq!(record.method, SelectionMethod::Static);
        assert_eq!(record.validator_ids.len(), 5);
        assert_eq!(
            &record.validator_ids[..3],
            &["scope-clarity", "acceptance-criteria", "solution-architecture"]
        );
        assert!(record.matched_keywords.is_empty());
    }

    #[test]
    fn test_keywords_select_domain_validators() {
        let item = WorkItem::new("e2", "User login with OAuth")
            .with_description("Store the session token in the database")
            .with_feature("Password reset via email");
        let record = select_static(&item, SelectionBounds::default());

        assert!(record.validator_ids.contains(&"security".to_string()));
        assert!(record.validator_ids.contains(&"data-model".to_string()));
        // Security has more hits than data-model, so it comes first
        let sec = record.validator_ids.iter().position(|v| v == "security").unwrap();
        let data = record.validator_ids.iter().position(|v| v == "data-model").unwrap();
        assert!(sec < data);
        assert!(record.matched_keywords.contains(&"oauth".to_string()));
    }

    #[test]
    fn test_selection_capped_at_max() {
        let item = WorkItem::new("e3", "Everything")
            .with_description(
                "api database security ui accessibility performance deploy gdpr test",
            );
        let record = select_static(&item, SelectionBounds::default());
        assert_eq!(record.validator_ids.len(), 8);
    }

    #[test]
    fn test_selection_always_within_bounds() {
        for text in ["", "api", "api ui", "gdpr payment audit privacy"] {
            let item = WorkItem::new("x", text);
            let record = select_static(&item, SelectionBounds::default());
            assert!((5..=8).contains(&record.validator_ids.len()), "{}", text);
        }
    }

    #[test]
    fn test_tokenize_keeps_hyphenated_words() {
        let tokens = tokenize("Supports Screen-Reader users; CI/CD");
        assert!(tokens.contains("screen-reader"));
        assert!(tokens.contains("ci"));
        assert!(tokens.contains("cd"));
    }

    #[test]
    fn test_from_classified_filters_unknown_and_duplicates() {
        let ids = vec![
            "security".to_string(),
            "astrology".to_string(),
            "security".to_string(),
            "devops".to_string(),
        ];
        let record = SelectionRecord::from_classified(&ids, SelectionBounds::default());

        assert_eq!(record.method, SelectionMethod::Classified);
        assert_eq!(
            record.validator_ids,
            vec![
                "scope-clarity",
                "acceptance-criteria",
                "solution-architecture",
                "security",
                "devops"
            ]
        );
    }

    #[test]
    fn test_bounds_normalized() {
        let bounds = SelectionBounds { min: 20, max: 50 }.normalized();
        assert_eq!(bounds.max, CATALOG.len());
        assert_eq!(bounds.min, CATALOG.len());
    }

    #[test]
    fn test_specs_resolve() {
        let record = select_static(&WorkItem::new("e", "x"), SelectionBounds::default());
        assert_eq!(record.specs().len(), record.validator_ids.len());
    }
}
