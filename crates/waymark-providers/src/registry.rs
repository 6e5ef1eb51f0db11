use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use waymark_types::ProviderInfo;

use crate::{retry_policy, ChatMessage, Provider, StreamChunk, ToolSchema};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub url: Option<String>,
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    pub default_provider: Option<String>,
}

/// Global, process-wide registry of providers: identity is fixed once
/// constructed, inner counters/contents are guarded by async locks. The
/// ordered provider list doubles as the fallback chain.
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: Arc<RwLock<Vec<Arc<dyn Provider>>>>,
    default_provider: Arc<RwLock<Option<String>>>,
}

impl ProviderRegistry {
    pub fn new(providers: Vec<Arc<dyn Provider>>, default_provider: Option<String>) -> Self {
        Self {
            providers: Arc::new(RwLock::new(providers)),
            default_provider: Arc::new(RwLock::new(default_provider)),
        }
    }

    pub async fn reload(&self, providers: Vec<Arc<dyn Provider>>, default_provider: Option<String>) {
        *self.providers.write().await = providers;
        *self.default_provider.write().await = default_provider;
    }

    pub async fn list(&self) -> Vec<ProviderInfo> {
        self.providers.read().await.iter().map(|p| p.info()).collect()
    }

    async fn select_provider(&self, provider_id: Option<&str>) -> anyhow::Result<Arc<dyn Provider>> {
        let providers = self.providers.read().await;
        let available = providers.iter().map(|p| p.info().id).collect::<Vec<_>>();

        if let Some(id) = provider_id {
            if let Some(provider) = providers.iter().find(|p| p.info().id == id) {
                return Ok(provider.clone());
            }
            anyhow::bail!(
                "provider `{}` is not configured. configured providers: {}",
                id,
                available.join(", ")
            );
        }

        let configured_default = self.default_provider.read().await.clone();
        if let Some(default_id) = configured_default {
            if let Some(provider) = providers.iter().find(|p| p.info().id == default_id) {
                return Ok(provider.clone());
            }
        }

        let Some(provider) = providers.first() else {
            anyhow::bail!("no provider configured");
        };
        Ok(provider.clone())
    }

    /// Ordered fallback list starting from `provider_id` (or the default),
    /// followed by every other configured provider in registration order.
    async fn fallback_chain(&self, provider_id: Option<&str>) -> anyhow::Result<Vec<Arc<dyn Provider>>> {
        let primary = self.select_provider(provider_id).await?;
        let providers = self.providers.read().await;
        let mut chain = vec![primary.clone()];
        for p in providers.iter() {
            if p.info().id != primary.info().id {
                chain.push(p.clone());
            }
        }
        Ok(chain)
    }

    pub async fn default_complete(&self, prompt: &str) -> anyhow::Result<String> {
        self.complete_for_provider(None, prompt, None).await
    }

    /// `complete` with retry/fallback discipline: transient errors are
    /// retried with exponential backoff on the same provider; once retries
    /// are exhausted, the next provider in the fallback chain is tried.
    pub async fn complete_for_provider(
        &self,
        provider_id: Option<&str>,
        prompt: &str,
        model_id: Option<&str>,
    ) -> anyhow::Result<String> {
        let chain = self.fallback_chain(provider_id).await?;
        let policy = retry_policy();
        let mut last_err = None;

        for provider in &chain {
            for attempt in 0..=policy.max_retries {
                match provider.complete(prompt, model_id).await {
                    Ok(out) => return Ok(out),
                    Err(e) => {
                        let class = crate::classify_provider_error(&e.to_string());
                        last_err = Some(e);
                        if !matches!(
                            class,
                            crate::ProviderErrorClass::RateLimit | crate::ProviderErrorClass::Transient
                        ) {
                            break;
                        }
                        if attempt < policy.max_retries {
                            tokio::time::sleep(policy.delay_for_attempt(attempt, 0.0)).await;
                        }
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("no provider available")))
    }

    pub async fn default_stream(
        &self,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolSchema>>,
        cancel: CancellationToken,
    ) -> anyhow::Result<Pin<Box<dyn Stream<Item = anyhow::Result<StreamChunk>> + Send>>> {
        self.stream_for_provider(None, None, messages, tools, cancel).await
    }

    pub async fn stream_for_provider(
        &self,
        provider_id: Option<&str>,
        model_id: Option<&str>,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolSchema>>,
        cancel: CancellationToken,
    ) -> anyhow::Result<Pin<Box<dyn Stream<Item = anyhow::Result<StreamChunk>> + Send>>> {
        let provider = self.select_provider(provider_id).await?;
        provider.stream(messages, model_id, tools, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StubProvider;

    #[tokio::test]
    async fn selects_default_when_no_id_given() {
        let registry = ProviderRegistry::new(
            vec![Arc::new(StubProvider::new("a", "A")), Arc::new(StubProvider::new("b", "B"))],
            Some("b".to_string()),
        );
        let out = registry.default_complete("hi").await.unwrap();
        assert_eq!(out, "B");
    }

    #[tokio::test]
    async fn falls_back_to_first_provider_when_no_default() {
        let registry = ProviderRegistry::new(vec![Arc::new(StubProvider::new("a", "A"))], None);
        let out = registry.default_complete("hi").await.unwrap();
        assert_eq!(out, "A");
    }

    #[tokio::test]
    async fn unknown_provider_id_errors() {
        let registry = ProviderRegistry::new(vec![Arc::new(StubProvider::new("a", "A"))], None);
        let err = registry.complete_for_provider(Some("missing"), "hi", None).await;
        assert!(err.is_err());
    }
}
