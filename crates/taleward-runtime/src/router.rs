//! Model routing.
//!
//! Maps a backend model id to the provider that serves it. Rules are tried in
//! a fixed order and the first match wins:
//!
//! 1. explicit provider prefix (`ollama/llama3`), stripped from the name
//! 2. hosted family prefix (`claude-*` goes to Anthropic)
//! 3. membership in the live local model list
//! 4. local naming heuristic (a `:tag`, or a known local family prefix)
//!
//! Nothing matching is an error. There is no default provider.

use crate::providers::CachedCatalog;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Backends a model id can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Anthropic,
    Ollama,
}

impl Provider {
    /// Type name used by the provider registry.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
            Provider::Ollama => "ollama",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which routing rule produced a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteRule {
    ExplicitPrefix,
    FamilyPrefix,
    LiveCatalog,
    NameHeuristic,
}

/// Result of routing a model id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub provider: Provider,

    /// Model name to send to the provider
    pub model: String,

    pub rule: RouteRule,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("No provider rule matches model '{0}'")]
    UnroutableModel(String),
}

/// Rule tables for the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterRules {
    /// Prefix → provider; the prefix is removed from the model name
    pub explicit_prefixes: BTreeMap<String, Provider>,

    /// Name prefixes that identify hosted Anthropic models
    pub anthropic_families: Vec<String>,

    /// Name prefixes that identify locally served model families
    pub local_families: Vec<String>,

    /// Separator between a local model name and its version tag
    pub version_separator: char,
}

impl Default for RouterRules {
    fn default() -> Self {
        let explicit_prefixes = BTreeMap::from([
            ("anthropic/".to_string(), Provider::Anthropic),
            ("ollama/".to_string(), Provider::Ollama),
        ]);

        let local_families = [
            "llama", "qwen", "gemma", "mistral", "mixtral", "phi", "deepseek", "gpt-oss",
            "tinyllama", "granite", "smollm", "codellama", "olmo", "dolphin", "hermes",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        Self {
            explicit_prefixes,
            anthropic_families: vec!["claude".to_string()],
            local_families,
            version_separator: ':',
        }
    }
}

/// Routes model ids to providers.
#[derive(Debug, Default)]
pub struct ModelRouter {
    rules: RouterRules,
    catalog: Option<CachedCatalog>,
}

impl ModelRouter {
    pub fn new(rules: RouterRules) -> Self {
        Self {
            rules,
            catalog: None,
        }
    }

    /// Enable the live-catalog rule.
    pub fn with_catalog(mut self, catalog: CachedCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn rules(&self) -> &RouterRules {
        &self.rules
    }

    /// Route a model id.
    ///
    /// A failing catalog lookup is logged and skipped; it never fails routing.
    pub async fn route(&self, model_id: &str) -> Result<Route, RouteError> {
        let model_id = model_id.trim();

        if let Some(route) = self.route_by_prefix(model_id)? {
            return Ok(route);
        }

        if let Some(route) = self.route_by_catalog(model_id).await {
            return Ok(route);
        }

        self.route_by_heuristic(model_id)
            .ok_or_else(|| RouteError::UnroutableModel(model_id.to_string()))
    }

    /// Rules 1 and 2.
    fn route_by_prefix(&self, model_id: &str) -> Result<Option<Route>, RouteError> {
        for (prefix, provider) in &self.rules.explicit_prefixes {
            if let Some(stripped) = model_id.strip_prefix(prefix.as_str()) {
                if stripped.is_empty() {
                    return Err(RouteError::UnroutableModel(model_id.to_string()));
                }
                return Ok(Some(Route {
                    provider: *provider,
                    model: stripped.to_string(),
                    rule: RouteRule::ExplicitPrefix,
                }));
            }
        }

        let lowered = model_id.to_lowercase();
        let hosted = self
            .rules
            .anthropic_families
            .iter()
            .any(|family| lowered.starts_with(&family.to_lowercase()));
        if hosted {
            return Ok(Some(Route {
                provider: Provider::Anthropic,
                model: model_id.to_string(),
                rule: RouteRule::FamilyPrefix,
            }));
        }

        Ok(None)
    }

    /// Rule 3.
    async fn route_by_catalog(&self, model_id: &str) -> Option<Route> {
        let catalog = self.catalog.as_ref()?;
        if model_id.is_empty() {
            return None;
        }

        match catalog.models().await {
            Ok(models) => {
                let tagged = format!("{}{}latest", model_id, self.rules.version_separator);
                models
                    .iter()
                    .any(|m| m == model_id || *m == tagged)
                    .then(|| Route {
                        provider: Provider::Ollama,
                        model: model_id.to_string(),
                        rule: RouteRule::LiveCatalog,
                    })
            }
            Err(e) => {
                tracing::warn!(model = %model_id, error = %e, "local model list unavailable, skipping catalog rule");
                None
            }
        }
    }

    /// Rule 4.
    fn route_by_heuristic(&self, model_id: &str) -> Option<Route> {
        let lowered = model_id.to_lowercase();
        let tagged = model_id.contains(self.rules.version_separator);
        let family = self
            .rules
            .local_families
            .iter()
            .any(|f| lowered.starts_with(&f.to_lowercase()));

        (tagged || family).then(|| Route {
            provider: Provider::Ollama,
            model: model_id.to_string(),
            rule: RouteRule::NameHeuristic,
        })
    }
}
