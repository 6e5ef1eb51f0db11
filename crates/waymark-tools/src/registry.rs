use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::{sandbox::Workspace, schema::ToolSchema, Tool, ToolError, ToolResult};

/// Process-wide tool registry: immutable in identity once built; per-tenant/
/// per-workflow allow/deny lists are applied by the caller at `execute` time,
/// not baked into the registry.
#[derive(Clone)]
pub struct ToolRegistry {
    tools: Arc<RwLock<HashMap<String, Arc<dyn Tool>>>>,
}

pub struct ToolRegistryBuilder {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistryBuilder {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    pub fn with_tool(mut self, name: impl Into<String>, tool: Arc<dyn Tool>) -> Self {
        self.tools.insert(name.into(), tool);
        self
    }

    pub fn build(self) -> ToolRegistry {
        ToolRegistry {
            tools: Arc::new(RwLock::new(self.tools)),
        }
    }
}

impl Default for ToolRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    /// Representative built-in set: bash/read/write/edit/glob/grep plus the
    /// two provider-backed research tools.
    pub fn with_defaults() -> Self {
        ToolRegistryBuilder::new()
            .with_tool("bash", Arc::new(crate::tools::BashTool::default()))
            .with_tool("read", Arc::new(crate::tools::ReadTool))
            .with_tool("write", Arc::new(crate::tools::WriteTool))
            .with_tool("edit", Arc::new(crate::tools::EditTool))
            .with_tool("glob", Arc::new(crate::tools::GlobTool))
            .with_tool("grep", Arc::new(crate::tools::GrepTool))
            .with_tool("web_fetch", Arc::new(crate::tools::WebFetchTool::default()))
            .with_tool("web_search", Arc::new(crate::tools::WebSearchTool::default()))
            .build()
    }

    pub async fn list(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self.tools.read().await.values().map(|t| t.schema()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.tools.read().await.contains_key(name)
    }

    /// Unknown tools are rejected synchronously, not routed through a tool
    /// and reported as an observation.
    pub async fn execute(&self, name: &str, args: Value, workspace: &Workspace) -> Result<ToolResult, ToolError> {
        let tool = self.lookup(name).await?;
        tool.execute(args, workspace).await
    }

    pub async fn execute_with_cancel(
        &self,
        name: &str,
        args: Value,
        workspace: &Workspace,
        cancel: CancellationToken,
    ) -> Result<ToolResult, ToolError> {
        let tool = self.lookup(name).await?;
        tool.execute_with_cancel(args, workspace, cancel).await
    }

    async fn lookup(&self, name: &str) -> Result<Arc<dyn Tool>, ToolError> {
        self.tools
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn unknown_tool_is_rejected_synchronously() {
        let registry = ToolRegistry::with_defaults();
        let dir = tempdir().unwrap();
        let workspace = Workspace::new(dir.path());
        let err = registry.execute("does_not_exist", json!({}), &workspace).await.unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(_)));
    }

    #[tokio::test]
    async fn write_then_read_round_trips_within_workspace() {
        let registry = ToolRegistry::with_defaults();
        let dir = tempdir().unwrap();
        let workspace = Workspace::new(dir.path());
        registry
            .execute("write", json!({"path": "notes.txt", "content": "hello"}), &workspace)
            .await
            .unwrap();
        let result = registry.execute("read", json!({"path": "notes.txt"}), &workspace).await.unwrap();
        assert_eq!(result.output["content"], "hello");
    }

    #[tokio::test]
    async fn write_outside_workspace_is_rejected() {
        let registry = ToolRegistry::with_defaults();
        let dir = tempdir().unwrap();
        let workspace = Workspace::new(dir.path());
        let err = registry
            .execute("write", json!({"path": "../escape.txt", "content": "x"}), &workspace)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Sandbox(_)));
    }

    #[tokio::test]
    async fn web_search_without_credential_fails_fast() {
        std::env::remove_var("WAYMARK_SEARCH_API_KEY");
        let registry = ToolRegistry::with_defaults();
        let dir = tempdir().unwrap();
        let workspace = Workspace::new(dir.path());
        let err = registry.execute("web_search", json!({"query": "rust"}), &workspace).await.unwrap_err();
        assert!(matches!(err, ToolError::MissingCredential { .. }));
    }

    #[tokio::test]
    async fn web_fetch_without_credential_fails_fast() {
        std::env::remove_var("WAYMARK_FETCH_API_KEY");
        let registry = ToolRegistry::with_defaults();
        let dir = tempdir().unwrap();
        let workspace = Workspace::new(dir.path());
        let err = registry.execute("web_fetch", json!({"url": "https://example.com"}), &workspace).await.unwrap_err();
        assert!(matches!(err, ToolError::MissingCredential { .. }));
    }
}
