use async_trait::async_trait;
use waymark_types::{ModelInfo, ProviderInfo};

use crate::Provider;

/// Deterministic, dependency-free provider used by tests and the CLI smoke
/// test. Generalizes a `LocalEchoProvider` pattern.
pub struct StubProvider {
    pub id: String,
    pub canned_response: String,
}

impl StubProvider {
    pub fn new(id: impl Into<String>, canned_response: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            canned_response: canned_response.into(),
        }
    }

    pub fn echo(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            canned_response: String::new(),
        }
    }
}

#[async_trait]
impl Provider for StubProvider {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            id: self.id.clone(),
            name: format!("Stub ({})", self.id),
            models: vec![ModelInfo {
                id: "stub-1".to_string(),
                provider_id: self.id.clone(),
                display_name: "Stub Model".to_string(),
                context_window: 8192,
            }],
        }
    }

    async fn complete(&self, prompt: &str, _model_override: Option<&str>) -> anyhow::Result<String> {
        if self.canned_response.is_empty() {
            Ok(format!("stub-echo: {prompt}"))
        } else {
            Ok(self.canned_response.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_stub_reflects_prompt() {
        let provider = StubProvider::echo("local");
        let out = provider.complete("2+2?", None).await.unwrap();
        assert!(out.contains("2+2?"));
    }

    #[tokio::test]
    async fn canned_stub_returns_fixed_response() {
        let provider = StubProvider::new("local", "4");
        let out = provider.complete("2+2?", None).await.unwrap();
        assert_eq!(out, "4");
    }
}
