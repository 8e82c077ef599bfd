//! Scripted adapters for runtime tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cadence_core::{ProviderName, TokenUsage};

use crate::providers::{
    missing_credential_message, AdapterSource, Completion, LlmProvider, ProviderError,
};

/// Usage reported by every scripted call.
pub const CALL_USAGE: TokenUsage = TokenUsage {
    input_tokens: 100,
    output_tokens: 50,
};

type Responder = dyn Fn(&str) -> Result<String, ProviderError> + Send + Sync;

/// Adapter source whose adapters answer from a shared responder.
pub struct ScriptedSource {
    responder: Arc<Responder>,
    delay: Duration,
    missing: BTreeSet<ProviderName>,
    calls: Arc<AtomicUsize>,
    builds: AtomicUsize,
    prompts: Arc<Mutex<Vec<String>>>,
    built: Mutex<Vec<(ProviderName, String)>>,
}

impl ScriptedSource {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            delay: Duration::ZERO,
            missing: BTreeSet::new(),
            calls: Arc::new(AtomicUsize::new(0)),
            builds: AtomicUsize::new(0),
            prompts: Arc::new(Mutex::new(Vec::new())),
            built: Mutex::new(Vec::new()),
        }
    }

    /// Answer calls in order; once the script runs out every call returns "ok".
    pub fn sequence(script: Vec<Result<String, ProviderError>>) -> Self {
        let script = Mutex::new(VecDeque::from(script));
        Self::new(move |_| script.lock().pop_front().unwrap_or_else(|| Ok("ok".to_string())))
    }

    /// Every call sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Behave as if the provider's credential were not set.
    pub fn without_credential(mut self, provider: ProviderName) -> Self {
        self.missing.insert(provider);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    pub fn built(&self) -> Vec<(ProviderName, String)> {
        self.built.lock().clone()
    }
}

impl AdapterSource for ScriptedSource {
    fn build(&self, provider: ProviderName, model: &str) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        self.check_credential(provider)?;
        self.builds.fetch_add(1, Ordering::SeqCst);
        self.built.lock().push((provider, model.to_string()));
        Ok(Arc::new(ScriptedProvider {
            provider,
            model: model.to_string(),
            responder: Arc::clone(&self.responder),
            delay: self.delay,
            calls: Arc::clone(&self.calls),
            prompts: Arc::clone(&self.prompts),
        }))
    }

    fn check_credential(&self, provider: ProviderName) -> Result<(), ProviderError> {
        if self.missing.contains(&provider) {
            return Err(ProviderError::auth(missing_credential_message(provider)));
        }
        Ok(())
    }
}

struct ScriptedProvider {
    provider: ProviderName,
    model: String,
    responder: Arc<Responder>,
    delay: Duration,
    calls: Arc<AtomicUsize>,
    prompts: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn generate(
        &self,
        prompt: &str,
        _max_tokens: u32,
        _instructions: Option<&str>,
    ) -> Result<Completion, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        (self.responder)(prompt).map(|text| Completion {
            text,
            usage: CALL_USAGE,
            model: self.model.clone(),
        })
    }

    fn name(&self) -> ProviderName {
        self.provider
    }

    fn model(&self) -> &str {
        &self.model
    }
}
