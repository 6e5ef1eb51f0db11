use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::{sandbox::Workspace, schema::ToolSchema, Tool, ToolError, ToolResult};

fn str_arg(args: &Value, key: &str, tool: &str) -> Result<String, ToolError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| ToolError::InvalidParams {
            tool: tool.to_string(),
            reason: format!("missing required string field `{key}`"),
        })
}

pub struct BashTool {
    pub timeout_secs: u64,
}

impl Default for BashTool {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

#[async_trait]
impl Tool for BashTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "bash".to_string(),
            description: "Run a shell command inside the session workspace".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {"command": {"type": "string"}},
                "required": ["command"],
            }),
        }
    }

    async fn execute(&self, args: Value, workspace: &Workspace) -> Result<ToolResult, ToolError> {
        self.execute_with_cancel(args, workspace, CancellationToken::new()).await
    }

    async fn execute_with_cancel(
        &self,
        args: Value,
        workspace: &Workspace,
        cancel: CancellationToken,
    ) -> Result<ToolResult, ToolError> {
        let command = str_arg(&args, "command", "bash")?;
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .current_dir(workspace.root())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| ToolError::Failed {
                tool: "bash".to_string(),
                reason: e.to_string(),
            })?;

        let timeout = tokio::time::sleep(std::time::Duration::from_secs(self.timeout_secs));
        tokio::pin!(timeout);

        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                Err(ToolError::Failed { tool: "bash".to_string(), reason: "cancelled".to_string() })
            }
            _ = &mut timeout => {
                let _ = child.kill().await;
                Err(ToolError::Timeout { tool: "bash".to_string(), timeout_ms: self.timeout_secs * 1000 })
            }
            output = child.wait_with_output() => {
                let output = output.map_err(|e| ToolError::Failed { tool: "bash".to_string(), reason: e.to_string() })?;
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                if output.status.success() {
                    Ok(ToolResult::ok(json!({"stdout": stdout, "stderr": stderr})))
                } else {
                    Ok(ToolResult::failure(format!("exit {:?}: {stderr}", output.status.code())))
                }
            }
        }
    }
}

pub struct ReadTool;

#[async_trait]
impl Tool for ReadTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "read".to_string(),
            description: "Read a file from the session workspace".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {"path": {"type": "string"}},
                "required": ["path"],
            }),
        }
    }

    async fn execute(&self, args: Value, workspace: &Workspace) -> Result<ToolResult, ToolError> {
        let path = str_arg(&args, "path", "read")?;
        let resolved = workspace.resolve_for_read(&path)?;
        let content = tokio::fs::read_to_string(&resolved).await.map_err(|e| ToolError::Failed {
            tool: "read".to_string(),
            reason: e.to_string(),
        })?;
        Ok(ToolResult::ok(json!({"content": content})))
    }
}

pub struct WriteTool;

#[async_trait]
impl Tool for WriteTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "write".to_string(),
            description: "Write a file in the session workspace, creating parent directories".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {"path": {"type": "string"}, "content": {"type": "string"}},
                "required": ["path", "content"],
            }),
        }
    }

    async fn execute(&self, args: Value, workspace: &Workspace) -> Result<ToolResult, ToolError> {
        let path = str_arg(&args, "path", "write")?;
        let content = str_arg(&args, "content", "write")?;
        let resolved = workspace.resolve_for_write(&path)?;
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| ToolError::Failed {
                tool: "write".to_string(),
                reason: e.to_string(),
            })?;
        }
        tokio::fs::write(&resolved, content).await.map_err(|e| ToolError::Failed {
            tool: "write".to_string(),
            reason: e.to_string(),
        })?;
        Ok(ToolResult::ok(json!({"bytes_written": true})))
    }
}

pub struct EditTool;

#[async_trait]
impl Tool for EditTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "edit".to_string(),
            description: "Replace the first occurrence of a string in a workspace file".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "old_string": {"type": "string"},
                    "new_string": {"type": "string"},
                },
                "required": ["path", "old_string", "new_string"],
            }),
        }
    }

    async fn execute(&self, args: Value, workspace: &Workspace) -> Result<ToolResult, ToolError> {
        let path = str_arg(&args, "path", "edit")?;
        let old_string = str_arg(&args, "old_string", "edit")?;
        let new_string = str_arg(&args, "new_string", "edit")?;
        let resolved = workspace.resolve_for_read(&path)?;
        let content = tokio::fs::read_to_string(&resolved).await.map_err(|e| ToolError::Failed {
            tool: "edit".to_string(),
            reason: e.to_string(),
        })?;
        if !content.contains(&old_string) {
            return Ok(ToolResult::failure("old_string not found in file"));
        }
        let updated = content.replacen(&old_string, &new_string, 1);
        tokio::fs::write(&resolved, updated).await.map_err(|e| ToolError::Failed {
            tool: "edit".to_string(),
            reason: e.to_string(),
        })?;
        Ok(ToolResult::ok(json!({"replaced": true})))
    }
}

pub struct GlobTool;

#[async_trait]
impl Tool for GlobTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "glob".to_string(),
            description: "List workspace files matching a glob pattern".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {"pattern": {"type": "string"}},
                "required": ["pattern"],
            }),
        }
    }

    async fn execute(&self, args: Value, workspace: &Workspace) -> Result<ToolResult, ToolError> {
        let pattern = str_arg(&args, "pattern", "glob")?;
        let full_pattern = format!("{}/{}", workspace.root().display(), pattern);
        let mut matches = Vec::new();
        for entry in glob::glob(&full_pattern).map_err(|e| ToolError::InvalidParams {
            tool: "glob".to_string(),
            reason: e.to_string(),
        })? {
            if let Ok(path) = entry {
                matches.push(path.display().to_string());
            }
        }
        Ok(ToolResult::ok(json!({"matches": matches})))
    }
}

pub struct GrepTool;

#[async_trait]
impl Tool for GrepTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "grep".to_string(),
            description: "Search workspace files for a regular expression".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {"pattern": {"type": "string"}, "path": {"type": "string"}},
                "required": ["pattern"],
            }),
        }
    }

    async fn execute(&self, args: Value, workspace: &Workspace) -> Result<ToolResult, ToolError> {
        let pattern = str_arg(&args, "pattern", "grep")?;
        let path = args.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        let resolved = workspace.resolve_for_read(path)?;
        let regex = regex::Regex::new(&pattern).map_err(|e| ToolError::InvalidParams {
            tool: "grep".to_string(),
            reason: e.to_string(),
        })?;

        let mut hits = Vec::new();
        for entry in ignore::WalkBuilder::new(&resolved).build() {
            let Ok(entry) = entry else { continue };
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let Ok(content) = std::fs::read_to_string(entry.path()) else { continue };
            for (lineno, line) in content.lines().enumerate() {
                if regex.is_match(line) {
                    hits.push(json!({"file": entry.path().display().to_string(), "line": lineno + 1, "text": line}));
                }
            }
        }
        Ok(ToolResult::ok(json!({"matches": hits})))
    }
}

fn provider_credential(env_var: &str) -> Option<String> {
    std::env::var(env_var).ok().filter(|v| !v.trim().is_empty())
}

/// Provider-backed fetch tool. Surfaces `MISSING_CREDENTIAL` (fail-fast, not
/// a retry candidate) when no API key is configured, same gate as `WebSearchTool`.
pub struct WebFetchTool {
    pub api_key_env: &'static str,
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self { api_key_env: "WAYMARK_FETCH_API_KEY" }
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "web_fetch".to_string(),
            description: "Fetch a URL and return its text content".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {"url": {"type": "string"}},
                "required": ["url"],
            }),
        }
    }

    async fn execute(&self, args: Value, _workspace: &Workspace) -> Result<ToolResult, ToolError> {
        let url = str_arg(&args, "url", "web_fetch")?;
        let Some(api_key) = provider_credential(self.api_key_env) else {
            return Err(ToolError::MissingCredential {
                tool: "web_fetch".to_string(),
                env_hint: self.api_key_env.to_string(),
            });
        };
        let _ = api_key;
        let response = reqwest::get(&url).await.map_err(|e| ToolError::Failed {
            tool: "web_fetch".to_string(),
            reason: e.to_string(),
        })?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Ok(ToolResult::failure(format!("http {status}")));
        }
        Ok(ToolResult::ok(json!({"url": url, "body": body})))
    }
}

/// Provider-backed search tool. Surfaces `MISSING_CREDENTIAL` (fail-fast, not
/// a retry candidate) when no API key is configured.
pub struct WebSearchTool {
    pub api_key_env: &'static str,
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self { api_key_env: "WAYMARK_SEARCH_API_KEY" }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "web_search".to_string(),
            description: "Search the web and return ranked results with source URLs".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "required": ["query"],
            }),
        }
    }

    async fn execute(&self, args: Value, _workspace: &Workspace) -> Result<ToolResult, ToolError> {
        let query = str_arg(&args, "query", "web_search")?;
        let Some(api_key) = provider_credential(self.api_key_env) else {
            return Err(ToolError::MissingCredential {
                tool: "web_search".to_string(),
                env_hint: self.api_key_env.to_string(),
            });
        };
        let _ = api_key;
        // Real vendor HTTP integration is external collaborator territory;
        // this stub returns an empty result set once credentials are present.
        Ok(ToolResult::ok(json!({"query": query, "results": []})))
    }
}
