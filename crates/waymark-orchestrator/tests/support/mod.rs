use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use waymark_providers::Provider;
use waymark_types::{ModelInfo, ProviderInfo};

/// One scripted response or failure, matched against the assembled prompt by
/// substring. Rules are tried in order; the first match wins.
pub enum Rule {
    Respond(&'static str, &'static str),
    Fail(&'static str, &'static str),
}

/// Test-only `Provider` that scripts responses by prompt substring instead of
/// a fixed canned string, so a single provider can drive a multi-agent
/// workflow where each agent needs a different answer. Every prompt it
/// receives is appended to `log` in call order, which lets a test assert on
/// fan-out/dependency ordering without a live model.
pub struct ScriptedProvider {
    rules: Vec<Rule>,
    fallback: &'static str,
    pub log: Arc<Mutex<Vec<String>>>,
}

impl ScriptedProvider {
    pub fn new(rules: Vec<Rule>, fallback: &'static str) -> Self {
        Self { rules, fallback, log: Arc::new(Mutex::new(Vec::new())) }
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            id: "scripted".to_string(),
            name: "Scripted test provider".to_string(),
            models: vec![ModelInfo {
                id: "scripted-1".to_string(),
                provider_id: "scripted".to_string(),
                display_name: "Scripted".to_string(),
                context_window: 8192,
            }],
        }
    }

    async fn complete(&self, prompt: &str, _model_override: Option<&str>) -> anyhow::Result<String> {
        self.log.lock().unwrap().push(prompt.to_string());
        for rule in &self.rules {
            match rule {
                Rule::Respond(needle, response) if prompt.contains(needle) => return Ok(response.to_string()),
                Rule::Fail(needle, reason) if prompt.contains(needle) => return Err(anyhow::anyhow!(reason.to_string())),
                _ => continue,
            }
        }
        Ok(self.fallback.to_string())
    }
}
