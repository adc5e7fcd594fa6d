// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Provider Registry
//
// Holds one entry per configured provider and builds a provider instance for
// each (provider, model) pair an agent asks for. Model aliases from the
// configuration resolve to the provider's model identifier.

use crate::domain::llm::{LLMError, LLMProvider};
use crate::domain::swarm_config::{LLMProviderConfig, ModelConfig, SwarmConfigSpec};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::ollama::OllamaAdapter;
use super::openai::OpenAIAdapter;

enum ProviderKind {
    Ollama { endpoint: String },
    OpenAI { endpoint: String, api_key: String },
    /// Pre-built provider shared by every agent that selects it
    Shared(Arc<dyn LLMProvider>),
}

struct ProviderEntry {
    kind: ProviderKind,
    models: Vec<ModelConfig>,
}

/// A provider ready for one agent, with the alias already resolved.
#[derive(Clone)]
pub struct ResolvedProvider {
    pub provider: Arc<dyn LLMProvider>,
    pub provider_name: String,
    pub model: String,
}

impl std::fmt::Debug for ResolvedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedProvider")
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .finish()
    }
}

/// Configured providers by name, plus the swarm-wide default
pub struct ProviderRegistry {
    entries: HashMap<String, ProviderEntry>,
    default_provider: Option<String>,
    client: reqwest::Client,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            default_provider: None,
            client: reqwest::Client::new(),
        }
    }

    /// Build the registry from `spec.llm_providers`.
    ///
    /// A provider that cannot be set up (unknown type, missing API key
    /// variable) is logged and left out; the rest still register.
    pub fn from_config(config: &SwarmConfigSpec) -> anyhow::Result<Self> {
        let mut registry = Self::new();
        registry.default_provider = config.llm_selection.default_provider.clone();

        for provider in config.llm_providers.iter().filter(|p| p.enabled) {
            let entry = match Self::create_entry(provider) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(provider = %provider.name, error = %e, "Skipping unusable LLM provider");
                    continue;
                }
            };
            info!(
                provider = %provider.name,
                kind = %provider.provider_type,
                models = entry.models.len(),
                "Registered LLM provider"
            );
            registry.entries.insert(provider.name.clone(), entry);
        }

        let disabled = config.llm_providers.iter().filter(|p| !p.enabled).count();
        if disabled > 0 {
            info!(disabled, "Disabled LLM providers left out");
        }
        if registry.entries.is_empty() {
            warn!("No LLM providers available; agent creation will fail until one is registered");
        }

        Ok(registry)
    }

    fn create_entry(config: &LLMProviderConfig) -> anyhow::Result<ProviderEntry> {
        if config.models.is_empty() {
            anyhow::bail!("no models configured");
        }

        let endpoint = config.endpoint.clone();
        let kind = match config.provider_type.as_str() {
            "ollama" => ProviderKind::Ollama { endpoint },
            "openai" | "openai-compatible" => ProviderKind::OpenAI {
                endpoint,
                api_key: Self::api_key(config.api_key.as_deref())?,
            },
            other => anyhow::bail!("provider type '{}' is not supported", other),
        };

        Ok(ProviderEntry {
            kind,
            models: config.models.clone(),
        })
    }

    /// `env:NAME` reads the key from the environment; no key means an
    /// unauthenticated endpoint.
    fn api_key(configured: Option<&str>) -> anyhow::Result<String> {
        let Some(raw) = configured else {
            return Ok(String::new());
        };
        match raw.strip_prefix("env:") {
            Some(var) => std::env::var(var)
                .map_err(|_| anyhow::anyhow!("API key variable {} is not set", var)),
            None => Ok(raw.to_string()),
        }
    }

    /// Register a pre-built provider under `name`.
    ///
    /// With no `models` any model string is accepted as-is.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn LLMProvider>, models: Vec<ModelConfig>) {
        let name = name.into();
        info!(provider = %name, "Registered shared LLM provider");
        self.entries.insert(
            name,
            ProviderEntry {
                kind: ProviderKind::Shared(provider),
                models,
            },
        );
    }

    pub fn set_default_provider(&mut self, name: impl Into<String>) {
        self.default_provider = Some(name.into());
    }

    /// Build the provider for an agent.
    ///
    /// An empty `provider` selects the default provider (or the only one
    /// registered). An empty `model` selects the provider's first model.
    pub fn resolve(&self, provider: &str, model: &str) -> Result<ResolvedProvider, LLMError> {
        let provider_name = self.select_provider_name(provider)?;
        let entry = self
            .entries
            .get(&provider_name)
            .ok_or_else(|| LLMError::Provider(format!("Provider '{}' not found", provider_name)))?;

        let model = Self::resolve_model(&provider_name, entry, model)?;

        let instance: Arc<dyn LLMProvider> = match &entry.kind {
            ProviderKind::Ollama { endpoint } => Arc::new(OllamaAdapter::new(
                self.client.clone(),
                provider_name.clone(),
                endpoint.clone(),
                model.clone(),
            )),
            ProviderKind::OpenAI { endpoint, api_key } => Arc::new(OpenAIAdapter::new(
                self.client.clone(),
                provider_name.clone(),
                endpoint.clone(),
                api_key.clone(),
                model.clone(),
            )),
            ProviderKind::Shared(shared) => Arc::clone(shared),
        };

        Ok(ResolvedProvider {
            provider: instance,
            provider_name,
            model,
        })
    }

    fn select_provider_name(&self, requested: &str) -> Result<String, LLMError> {
        if !requested.is_empty() {
            return Ok(requested.to_string());
        }
        if let Some(default) = &self.default_provider {
            return Ok(default.clone());
        }
        match self.entries.len() {
            1 => Ok(self.entries.keys().next().cloned().unwrap_or_default()),
            0 => Err(LLMError::Provider("No LLM providers configured".into())),
            _ => Err(LLMError::InvalidInput(
                "Provider name required when several providers are configured".into(),
            )),
        }
    }

    fn resolve_model(provider_name: &str, entry: &ProviderEntry, requested: &str) -> Result<String, LLMError> {
        if entry.models.is_empty() {
            return if requested.is_empty() {
                Err(LLMError::InvalidInput(format!(
                    "Provider '{}' has no default model",
                    provider_name
                )))
            } else {
                Ok(requested.to_string())
            };
        }

        if requested.is_empty() {
            return Ok(entry.models[0].model.clone());
        }

        entry
            .models
            .iter()
            .find(|m| m.alias == requested)
            .or_else(|| entry.models.iter().find(|m| m.model == requested))
            .map(|m| m.model.clone())
            .ok_or_else(|| {
                LLMError::ModelNotFound(format!(
                    "Model '{}' not configured for provider '{}'",
                    requested, provider_name
                ))
            })
    }

    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn has_provider(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Get list of model aliases for a provider
    pub fn available_aliases(&self, provider: &str) -> Vec<String> {
        self.entries
            .get(provider)
            .map(|entry| entry.models.iter().map(|m| m.alias.clone()).collect())
            .unwrap_or_default()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
