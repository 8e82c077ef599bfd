//! Provider keys, held as [`SecretString`] from the moment they are read.
//!
//! Formatting an [`ApiCredential`] never shows the key. Adapters read it once
//! per request through [`ApiCredential::expose`] when building the auth header.

use secrecy::{ExposeSecret, SecretString};
use std::fmt;

/// How a key reached the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Read from the process environment at adapter construction.
    Process,
    /// Handed over directly, e.g. by a test or an embedding host.
    Supplied,
}

impl CredentialSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialSource::Process => "process environment",
            CredentialSource::Supplied => "supplied value",
        }
    }
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provider key plus the variable name it is known by.
pub struct ApiCredential {
    key: SecretString,
    origin: CredentialSource,
    variable: &'static str,
}

impl ApiCredential {
    pub fn new(key: impl Into<String>, origin: CredentialSource, variable: &'static str) -> Self {
        Self {
            key: SecretString::from(key.into()),
            origin,
            variable,
        }
    }

    /// The raw key, for the request header only.
    pub fn expose(&self) -> &str {
        self.key.expose_secret()
    }

    /// Whitespace-only keys count as missing.
    pub fn is_empty(&self) -> bool {
        self.expose().trim().is_empty()
    }

    pub fn source(&self) -> CredentialSource {
        self.origin
    }

    pub fn env_var(&self) -> &'static str {
        self.variable
    }
}

impl Clone for ApiCredential {
    fn clone(&self) -> Self {
        Self::new(self.expose(), self.origin, self.variable)
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiCredential({}, {}, <hidden>)", self.variable, self.origin)
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.variable, self.origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "sk-cadence-ceremony-key-0042";

    #[test]
    fn test_formatting_never_shows_the_key() {
        let cred = ApiCredential::new(KEY, CredentialSource::Process, "ANTHROPIC_API_KEY");

        let debug = format!("{:?}", cred);
        assert!(!debug.contains(KEY));
        assert_eq!(
            debug,
            "ApiCredential(ANTHROPIC_API_KEY, process environment, <hidden>)"
        );

        let shown = cred.to_string();
        assert!(!shown.contains(KEY));
        assert_eq!(shown, "ANTHROPIC_API_KEY (process environment)");
    }

    #[test]
    fn test_clone_keeps_key_and_origin() {
        let cred = ApiCredential::new(KEY, CredentialSource::Supplied, "GEMINI_API_KEY");
        let copy = cred.clone();
        assert_eq!(copy.expose(), KEY);
        assert_eq!(copy.source(), CredentialSource::Supplied);
        assert_eq!(copy.env_var(), "GEMINI_API_KEY");
    }

    #[test]
    fn test_whitespace_key_is_missing() {
        assert!(ApiCredential::new(" \t", CredentialSource::Supplied, "OPENAI_API_KEY").is_empty());
        assert!(!ApiCredential::new("k", CredentialSource::Supplied, "OPENAI_API_KEY").is_empty());
    }
}
