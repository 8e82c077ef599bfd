//! Ceremony configuration: parsing, validation and atomic persistence.
//!
//! The persisted document lists ceremonies with a default provider/model and
//! optional per-stage and per-validation-type overrides. It is loaded once per
//! process and rewritten only through [`ConfigStore::update`].

mod parser;
mod store;

pub use parser::{CeremonyConfig, CeremonyEntry, ConfigError, ConfigFormat, ModelOverride, StageEntry};
pub use store::ConfigStore;
