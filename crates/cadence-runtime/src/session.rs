//! In-memory usage for the current process, with a cost estimate.
//!
//! This sits next to the persisted ledger and is never written to disk.

use parking_lot::RwLock;
use serde::Serialize;

use cadence_core::{ProviderName, TokenUsage};

/// Accumulated usage for this process.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageSummary {
    /// Successful generation calls
    pub calls: u64,

    pub input_tokens: u64,
    pub output_tokens: u64,

    /// Estimated cost in USD
    pub estimated_cost: f64,
}

impl UsageSummary {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    fn add(&mut self, provider: ProviderName, model: &str, usage: TokenUsage) {
        self.calls += 1;
        self.input_tokens += usage.input_tokens;
        self.output_tokens += usage.output_tokens;
        self.estimated_cost += estimate_cost(provider, model, usage);
    }
}

/// Thread-safe session usage tracker.
#[derive(Debug, Default)]
pub struct SessionUsage {
    summary: RwLock<UsageSummary>,
}

impl SessionUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, provider: ProviderName, model: &str, usage: TokenUsage) {
        self.summary.write().add(provider, model, usage);
    }

    pub fn snapshot(&self) -> UsageSummary {
        self.summary.read().clone()
    }

    pub fn reset(&self) {
        *self.summary.write() = UsageSummary::default();
    }
}

/// (input, output) USD per million tokens.
fn rates(provider: ProviderName, model: &str) -> (f64, f64) {
    match (provider, model) {
        (_, m) if m.contains("opus") => (15.0, 75.0),
        (_, m) if m.contains("haiku") => (1.0, 5.0),
        (ProviderName::Claude, _) => (3.0, 15.0),
        (_, m) if m.contains("gpt-4o-mini") => (0.15, 0.6),
        (_, m) if m.contains("gpt-4o") => (2.5, 10.0),
        (_, m) if m.contains("gpt-5") => (1.25, 10.0),
        (ProviderName::OpenAi, _) => (2.5, 10.0),
        (_, m) if m.contains("flash") => (0.3, 2.5),
        (ProviderName::Gemini, _) => (1.25, 10.0),
    }
}

/// Estimate the USD cost of one call.
pub fn estimate_cost(provider: ProviderName, model: &str, usage: TokenUsage) -> f64 {
    let (input_rate, output_rate) = rates(provider, model);
    (usage.input_tokens as f64 / 1_000_000.0) * input_rate
        + (usage.output_tokens as f64 / 1_000_000.0) * output_rate
}
