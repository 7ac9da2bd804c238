//! Runtime configuration.
//!
//! Everything the engine needs besides the adventure itself: mode names,
//! rendezvous timings, the storyteller timeout, router rule tables and
//! provider settings. Every field has a default, so an empty document is a
//! working configuration against a local Ollama server.
//!
//! ```yaml
//! modes:
//!   base: cyoa-base
//!   moderated: cyoa-moderated
//! rendezvous:
//!   ttl: 30s
//!   poll_interval: 500ms
//! providers:
//!   ollama:
//!     base_url: http://gpu-box:11434
//! ```

use crate::invoker::RoutedInvoker;
use crate::orchestrator::ModeTable;
use crate::providers::{ProviderError, ProviderRegistry};
use crate::rendezvous::{DEFAULT_POLL_INTERVAL, DEFAULT_TTL, DEFAULT_WAIT_TIMEOUT};
use crate::router::{ModelRouter, Provider, RouterRules};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[cfg(feature = "ollama")]
use crate::providers::{CachedCatalog, OllamaProvider};
#[cfg(feature = "ollama")]
use std::sync::Arc;

const DEFAULT_STORYTELLER_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_CATALOG_TTL: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum RuntimeConfigError {
    #[error("Failed to read runtime config: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse runtime config: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Provider '{name}' could not be built: {source}")]
    Provider {
        name: String,
        #[source]
        source: ProviderError,
    },
}

/// Durations written as `30s`, `500ms`, `2m`.
mod human_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

/// Timings of the base/moderated hand-off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendezvousSettings {
    /// Age after which a stored base turn is ignored
    #[serde(with = "human_duration")]
    pub ttl: Duration,

    /// How long a moderated request waits for its base turn
    #[serde(with = "human_duration")]
    pub wait_timeout: Duration,

    #[serde(with = "human_duration")]
    pub poll_interval: Duration,
}

impl Default for RendezvousSettings {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Runtime configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub modes: ModeTable,

    pub rendezvous: RendezvousSettings,

    /// Bound on a single storyteller call
    #[serde(with = "human_duration")]
    pub storyteller_timeout: Duration,

    /// How long the local model list is reused by the router
    #[serde(with = "human_duration")]
    pub catalog_ttl: Duration,

    pub router: RouterRules,

    /// Provider type name → settings handed to its factory
    pub providers: BTreeMap<String, JsonValue>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            modes: ModeTable::default(),
            rendezvous: RendezvousSettings::default(),
            storyteller_timeout: DEFAULT_STORYTELLER_TIMEOUT,
            catalog_ttl: DEFAULT_CATALOG_TTL,
            router: RouterRules::default(),
            providers: BTreeMap::new(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, RuntimeConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RuntimeConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Settings for one provider type, or an empty object.
    pub fn provider_settings(&self, provider: Provider) -> JsonValue {
        self.providers
            .get(provider.as_str())
            .cloned()
            .unwrap_or_else(|| JsonValue::Object(Default::default()))
    }

    /// Build the router and one client per provider compiled into this build.
    ///
    /// A provider listed under `providers` must build; an unlisted one that
    /// cannot (say, Anthropic without an API key) is skipped with a warning and
    /// its routes fail when used.
    pub fn build_invoker(&self) -> Result<RoutedInvoker, RuntimeConfigError> {
        let registry = ProviderRegistry::with_defaults();

        #[allow(unused_mut)]
        let mut router = ModelRouter::new(self.router.clone());

        #[cfg(feature = "ollama")]
        {
            let catalog = OllamaProvider::from_config(&self.provider_settings(Provider::Ollama));
            router = router.with_catalog(CachedCatalog::new(Arc::new(catalog), self.catalog_ttl));
        }

        let mut invoker = RoutedInvoker::new(router);
        for provider in [Provider::Anthropic, Provider::Ollama] {
            let name = provider.as_str();
            if !registry.has_provider(name) {
                tracing::debug!(provider = %provider, "provider not compiled in");
                continue;
            }

            let explicit = self.providers.contains_key(name);
            let settings = self.provider_settings(provider);
            let built = registry
                .validate(name, &settings)
                .and_then(|_| registry.create(name, &settings));
            match built {
                Ok(client) => invoker = invoker.with_provider(provider, client),
                Err(source) if explicit => {
                    return Err(RuntimeConfigError::Provider {
                        name: name.to_string(),
                        source,
                    })
                }
                Err(e) => {
                    tracing::warn!(provider = %provider, error = %e, "provider unavailable");
                }
            }
        }

        Ok(invoker)
    }
}
