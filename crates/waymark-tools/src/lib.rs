//! Tool Executor Interface: a uniform, schema-validated capability for
//! invoking sandboxed tools with parameters, timeouts, and structured
//! results.

mod registry;
mod sandbox;
mod schema;
mod tools;

pub use registry::{ToolRegistry, ToolRegistryBuilder};
pub use sandbox::{SandboxError, Workspace};
pub use schema::{validate_tool_schemas, ToolSchema, ToolSchemaValidationError};

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Structured result of a tool invocation, mirroring a `ToolExecution` record.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: Value,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(output: Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: Value::Null,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("parameters invalid for tool `{tool}`: {reason}")]
    InvalidParams { tool: String, reason: String },
    #[error("missing credential for tool `{tool}`: set {env_hint}")]
    MissingCredential { tool: String, env_hint: String },
    #[error("sandbox violation: {0}")]
    Sandbox(#[from] SandboxError),
    #[error("tool `{tool}` timed out after {timeout_ms}ms")]
    Timeout { tool: String, timeout_ms: u64 },
    #[error("tool `{tool}` failed: {reason}")]
    Failed { tool: String, reason: String },
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn schema(&self) -> ToolSchema;

    async fn execute(&self, args: Value, workspace: &Workspace) -> Result<ToolResult, ToolError>;

    /// Default delegates to `execute`; tools that can observe cancellation
    /// mid-flight (long shells, network fetches) override this.
    async fn execute_with_cancel(
        &self,
        args: Value,
        workspace: &Workspace,
        _cancel: CancellationToken,
    ) -> Result<ToolResult, ToolError> {
        self.execute(args, workspace).await
    }
}

pub use tools::{BashTool, EditTool, GlobTool, GrepTool, ReadTool, WebFetchTool, WebSearchTool, WriteTool};
