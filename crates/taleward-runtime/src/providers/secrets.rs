//! Credential handling for hosted providers.
//!
//! API keys are wrapped in [`secrecy::SecretString`] as soon as they are read
//! and are only exposed when a request header is built.

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;
use std::fmt;

use super::ProviderError;

/// Where a credential was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Config,
    Environment,
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Config => write!(f, "config"),
            CredentialSource::Environment => write!(f, "environment"),
            CredentialSource::Programmatic => write!(f, "programmatic"),
        }
    }
}

/// An API key that prints as `[REDACTED]`.
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    name: &'static str,
}

impl ApiCredential {
    pub fn new(value: impl Into<String>, source: CredentialSource, name: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name,
        }
    }

    /// Read `config[config_key]`, falling back to the `env_var` environment variable.
    pub fn from_config_or_env(
        config: &JsonValue,
        config_key: &str,
        env_var: &str,
        name: &'static str,
    ) -> Result<Self, ProviderError> {
        if let Some(value) = config[config_key].as_str() {
            return Ok(Self::new(value, CredentialSource::Config, name));
        }

        if let Ok(value) = std::env::var(env_var) {
            return Ok(Self::new(value, CredentialSource::Environment, name));
        }

        Err(ProviderError::NotConfigured(format!(
            "{} required: set '{}' in config or {} environment variable",
            name, config_key, env_var
        )))
    }

    /// Whether a credential could be loaded, without loading it.
    pub fn is_available(config: &JsonValue, config_key: &str, env_var: &str) -> bool {
        config[config_key].as_str().is_some() || std::env::var(env_var).is_ok()
    }

    /// The raw value. Call only where the header is set.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.value.expose_secret().is_empty()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} [REDACTED]", self.name, self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "sk-ant-adventure-key-12345";

    #[test]
    fn test_redacted_everywhere() {
        let cred = ApiCredential::new(SECRET, CredentialSource::Config, "Anthropic API key");

        let debug = format!("{:?}", cred);
        let display = format!("{}", cred);
        assert!(!debug.contains(SECRET));
        assert!(!display.contains(SECRET));
        assert!(display.contains("[REDACTED]"));
        assert!(display.contains("config"));
        assert_eq!(cred.expose(), SECRET);
    }

    #[test]
    fn test_config_wins_over_env() {
        let config = serde_json::json!({ "api_key": "from-config" });
        let cred = ApiCredential::from_config_or_env(
            &config,
            "api_key",
            "TALEWARD_TEST_UNUSED_KEY",
            "Test key",
        )
        .unwrap();
        assert_eq!(cred.expose(), "from-config");
        assert_eq!(cred.source(), CredentialSource::Config);
    }

    #[test]
    fn test_missing_everywhere() {
        let config = serde_json::json!({});
        let result = ApiCredential::from_config_or_env(
            &config,
            "api_key",
            "TALEWARD_TEST_SURELY_UNSET_VAR",
            "Test key",
        );
        assert!(matches!(result, Err(ProviderError::NotConfigured(_))));
        assert!(!ApiCredential::is_available(
            &config,
            "api_key",
            "TALEWARD_TEST_SURELY_UNSET_VAR"
        ));
    }

    #[test]
    fn test_empty_credential() {
        let cred = ApiCredential::new("", CredentialSource::Programmatic, "Test key");
        assert!(cred.is_empty());
    }
}
