//! Provider factory: credential lookup and adapter construction.
//!
//! The set of backends is closed. [`ProviderFactory`] is a fixed match on
//! [`ProviderName`]; there is no plugin registry.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use cadence_core::ProviderName;

use super::secrets::{ApiCredential, CredentialSource};
use super::{LlmProvider, ProviderError};

/// The message shown when a provider's credential variable is not set.
///
/// The calling surface prints this verbatim.
pub fn missing_credential_message(provider: ProviderName) -> String {
    let var = provider.credential_env_var();
    format!(
        "Missing credential for provider '{provider}': environment variable {var} is not set.\n\
         Set it with `export {var}=<your-api-key>`, or switch this stage to another provider \
         in the ceremony configuration."
    )
}

/// Where credentials and base URLs are read from.
#[derive(Debug, Clone, Default)]
pub enum CredentialLookup {
    /// The process environment
    #[default]
    Process,
    /// A fixed set of variables
    Fixed(BTreeMap<String, String>),
}

impl CredentialLookup {
    pub fn fixed<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        CredentialLookup::Fixed(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// Value of `var`; blank values count as unset.
    pub fn get(&self, var: &str) -> Option<String> {
        let value = match self {
            CredentialLookup::Process => std::env::var(var).ok(),
            CredentialLookup::Fixed(vars) => vars.get(var).cloned(),
        };
        value.filter(|v| !v.trim().is_empty())
    }

    fn source(&self) -> CredentialSource {
        match self {
            CredentialLookup::Process => CredentialSource::Process,
            CredentialLookup::Fixed(_) => CredentialSource::Supplied,
        }
    }
}

/// Builds adapters for a (provider, model) pair.
///
/// [`ProviderFactory`] is the production source; tests substitute scripted
/// adapters.
pub trait AdapterSource: Send + Sync {
    fn build(&self, provider: ProviderName, model: &str) -> Result<Arc<dyn LlmProvider>, ProviderError>;

    /// Fail early if the provider's credential is missing.
    fn check_credential(&self, provider: ProviderName) -> Result<(), ProviderError>;
}

/// Constructs the adapter for each backend family.
#[derive(Debug, Clone)]
pub struct ProviderFactory {
    lookup: CredentialLookup,
    request_timeout: Duration,
}

impl Default for ProviderFactory {
    fn default() -> Self {
        Self::new(CredentialLookup::Process)
    }
}

impl ProviderFactory {
    pub fn new(lookup: CredentialLookup) -> Self {
        Self {
            lookup,
            request_timeout: Duration::from_secs(60),
        }
    }

    /// Per-request HTTP timeout for built adapters.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Load the credential for `provider`.
    ///
    /// A missing variable fails with [`ProviderError::Auth`] carrying
    /// [`missing_credential_message`].
    pub fn credential(&self, provider: ProviderName) -> Result<ApiCredential, ProviderError> {
        let var = provider.credential_env_var();
        self.lookup
            .get(var)
            .map(|value| ApiCredential::new(value, self.lookup.source(), var))
            .ok_or_else(|| ProviderError::auth(missing_credential_message(provider)))
    }

    fn base_url(&self, provider: ProviderName) -> Option<String> {
        self.lookup.get(provider.base_url_env_var())
    }

    #[allow(unused_variables)]
    fn construct(
        &self,
        provider: ProviderName,
        model: &str,
        credential: ApiCredential,
    ) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let base_url = self.base_url(provider);

        match provider {
            #[cfg(feature = "anthropic")]
            ProviderName::Claude => {
                let mut adapter =
                    super::AnthropicProvider::new(credential, model, super::http::client(self.request_timeout)?);
                if let Some(url) = base_url {
                    adapter = adapter.with_base_url(url);
                }
                Ok(Arc::new(adapter))
            }
            #[cfg(feature = "openai")]
            ProviderName::OpenAi => {
                let mut adapter =
                    super::OpenAiProvider::new(credential, model, super::http::client(self.request_timeout)?);
                if let Some(url) = base_url {
                    adapter = adapter.with_base_url(url);
                }
                Ok(Arc::new(adapter))
            }
            #[cfg(feature = "gemini")]
            ProviderName::Gemini => {
                let mut adapter =
                    super::GeminiProvider::new(credential, model, super::http::client(self.request_timeout)?);
                if let Some(url) = base_url {
                    adapter = adapter.with_base_url(url);
                }
                Ok(Arc::new(adapter))
            }
            #[allow(unreachable_patterns)]
            other => Err(ProviderError::Unsupported(format!(
                "{} support is not compiled in (enable the cargo feature)",
                other
            ))),
        }
    }
}

impl AdapterSource for ProviderFactory {
    fn build(&self, provider: ProviderName, model: &str) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let credential = self.credential(provider)?;
        tracing::debug!(%provider, model, credential = %credential, "Building provider adapter");
        self.construct(provider, model, credential)
    }

    fn check_credential(&self, provider: ProviderName) -> Result<(), ProviderError> {
        self.credential(provider).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ErrorKind;

    #[test]
    fn test_missing_credential_message_is_exact() {
        assert_eq!(
            missing_credential_message(ProviderName::Claude),
            "Missing credential for provider 'claude': environment variable ANTHROPIC_API_KEY is not set.\n\
             Set it with `export ANTHROPIC_API_KEY=<your-api-key>`, or switch this stage to another \
             provider in the ceremony configuration."
        );
    }

    #[test]
    fn test_missing_credential_is_auth_error() {
        let factory = ProviderFactory::new(CredentialLookup::fixed(Vec::<(String, String)>::new()));
        for provider in ProviderName::ALL {
            let err = factory.build(provider, "any-model").err().unwrap();
            assert_eq!(err.kind(), ErrorKind::Auth);
            assert!(err.to_string().contains(provider.credential_env_var()));
            assert_eq!(err, factory.check_credential(provider).unwrap_err());
        }
    }

    #[test]
    fn test_blank_credential_counts_as_missing() {
        let factory = ProviderFactory::new(CredentialLookup::fixed([("OPENAI_API_KEY", "   ")]));
        assert!(factory.check_credential(ProviderName::OpenAi).is_err());
    }

    #[test]
    fn test_credential_is_redacted_and_tracked() {
        let factory = ProviderFactory::new(CredentialLookup::fixed([("GEMINI_API_KEY", "g-secret")]));
        let cred = factory.credential(ProviderName::Gemini).unwrap();
        assert_eq!(cred.expose(), "g-secret");
        assert_eq!(cred.source(), CredentialSource::Supplied);
        assert!(!format!("{:?}", cred).contains("g-secret"));
    }

    #[cfg(feature = "all-providers")]
    #[test]
    fn test_builds_every_family() {
        let factory = ProviderFactory::new(CredentialLookup::fixed([
            ("ANTHROPIC_API_KEY", "a"),
            ("OPENAI_API_KEY", "o"),
            ("GEMINI_API_KEY", "g"),
            ("OPENAI_BASE_URL", "http://localhost:9999/v1"),
        ]));
        for provider in ProviderName::ALL {
            let adapter = factory.build(provider, "model-x").unwrap();
            assert_eq!(adapter.name(), provider);
            assert_eq!(adapter.model(), "model-x");
        }
    }
}
