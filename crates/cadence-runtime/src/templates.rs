//! Validator template lookup.
//!
//! Templates are opaque text referenced by name (`validators/security`). A
//! store either holds them in memory or reads `<root>/<reference>.md`.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use cadence_core::{AssemblyError, CATALOG};

use crate::prompts::GENERIC_VALIDATOR_TEMPLATE;

/// Source of template text by reference.
pub trait TemplateStore: Send + Sync {
    /// Template text for `reference`, or [`AssemblyError::UnknownTemplate`].
    fn template(&self, reference: &str) -> Result<String, AssemblyError>;
}

/// Templates held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTemplates {
    templates: BTreeMap<String, String>,
}

impl InMemoryTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every catalog validator mapped to the generic validator template.
    pub fn generic() -> Self {
        CATALOG.iter().fold(Self::new(), |store, spec| {
            store.with(spec.template, GENERIC_VALIDATOR_TEMPLATE)
        })
    }

    pub fn with(mut self, reference: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(reference, text);
        self
    }

    pub fn insert(&mut self, reference: impl Into<String>, text: impl Into<String>) {
        self.templates.insert(reference.into(), text.into());
    }

    pub fn remove(&mut self, reference: &str) -> Option<String> {
        self.templates.remove(reference)
    }
}

impl TemplateStore for InMemoryTemplates {
    fn template(&self, reference: &str) -> Result<String, AssemblyError> {
        self.templates
            .get(reference)
            .cloned()
            .ok_or_else(|| AssemblyError::UnknownTemplate(reference.to_string()))
    }
}

/// Templates read from `<root>/<reference>.md` on each lookup.
#[derive(Debug, Clone)]
pub struct DirectoryTemplates {
    root: PathBuf,
}

impl DirectoryTemplates {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, reference: &str) -> Option<PathBuf> {
        let relative = Path::new(reference);
        let contained = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if reference.is_empty() || !contained {
            return None;
        }
        Some(self.root.join(format!("{}.md", reference)))
    }
}

impl TemplateStore for DirectoryTemplates {
    fn template(&self, reference: &str) -> Result<String, AssemblyError> {
        let unknown = || AssemblyError::UnknownTemplate(reference.to_string());
        let path = self.path_for(reference).ok_or_else(unknown)?;

        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(text),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Template not readable");
                Err(unknown())
            }
        }
    }
}
