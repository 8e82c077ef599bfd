//! Validator catalog and selection.
//!
//! The catalog is fixed. Selection picks a bounded subset for a work item,
//! either from static keyword rules or from a classification call made by
//! the runtime; either way the method and resulting ids are recorded.

mod catalog;
mod selection;

pub use catalog::{find, Domain, ValidatorSpec, CATALOG};
pub use selection::{select_static, SelectionBounds, SelectionMethod, SelectionRecord};

use serde::{Deserialize, Serialize};

/// The work item under validation.
///
/// `context` is the opaque, already-rendered item description shared by
/// every validator prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub id: String,

    pub title: String,

    #[serde(default)]
    pub description: String,

    /// Domain hint (e.g. "payments", "mobile")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    /// Feature or acceptance-criteria lines
    #[serde(default)]
    pub features: Vec<String>,

    /// Rendered item context passed to every validator
    #[serde(default)]
    pub context: String,
}

impl WorkItem {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.features.push(feature.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Text the static selection rules look at.
    pub fn signal_text(&self) -> String {
        let mut parts = vec![self.title.as_str(), self.description.as_str()];
        if let Some(domain) = &self.domain {
            parts.push(domain);
        }
        parts.extend(self.features.iter().map(String::as_str));
        parts.join("\n")
    }

    /// Context handed to validators, falling back to a rendering of the
    /// item's own fields when no context was supplied.
    pub fn rendered_context(&self) -> String {
        if !self.context.trim().is_empty() {
            return self.context.clone();
        }

        let mut out = format!("# {}\n", self.title);
        if !self.description.is_empty() {
            out.push_str(&format!("\n{}\n", self.description));
        }
        if let Some(domain) = &self.domain {
            out.push_str(&format!("\nDomain: {}\n", domain));
        }
        if !self.features.is_empty() {
            out.push_str("\nFeatures:\n");
            for feature in &self.features {
                out.push_str(&format!("- {}\n", feature));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rendered_context_prefers_supplied_context() {
        let item = WorkItem::new("e1", "Checkout").with_context("custom context");
        assert_eq!(item.rendered_context(), "custom context");
    }

    #[test]
    fn test_rendered_context_from_fields() {
        let item = WorkItem::new("e1", "Checkout")
            .with_description("Pay for the cart")
            .with_domain("payments")
            .with_feature("Card payments");
        let rendered = item.rendered_context();

        assert!(rendered.starts_with("# Checkout\n"));
        assert!(rendered.contains("Domain: payments"));
        assert!(rendered.contains("- Card payments"));
    }
}
