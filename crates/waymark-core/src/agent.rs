//! Agent Executor: prompt assembly, the streaming LLM call, and the bounded
//! ReAct tool loop behind a single
//! `execute(agent_id, input, role?, model_hint?, tool_allowlist?,
//! iteration_cap, budget)` contract.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::Level;

use waymark_observability::{emit_event, ObservabilityEvent, ProcessKind};
use waymark_providers::{
    classify_provider_error, retry_policy, ChatMessage, Provider, ProviderErrorClass, ProviderRegistry,
    StreamChunk, ToolSchema as ProviderToolSchema,
};
use waymark_tools::{ToolRegistry, Workspace};
use waymark_types::{AgentState, Event, EventType, ToolExecution, Usage};

use crate::checkpoint::{Checkpoint, CheckpointOutcome};
use crate::event_bus::EventBus;

#[derive(Debug, Clone)]
pub struct AgentInput {
    pub agent_id: String,
    pub workflow_id: String,
    pub role: Option<String>,
    pub system_prompt: Option<String>,
    pub input_text: String,
    pub model_hint: Option<String>,
    pub provider_hint: Option<String>,
    pub tool_allowlist: Option<Vec<String>>,
    pub iteration_cap: u32,
}

impl AgentInput {
    pub fn new(agent_id: impl Into<String>, workflow_id: impl Into<String>, input_text: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            workflow_id: workflow_id.into(),
            role: None,
            system_prompt: None,
            input_text: input_text.into(),
            model_hint: None,
            provider_hint: None,
            tool_allowlist: None,
            iteration_cap: 6,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentOutput {
    pub output: String,
    pub usage: Usage,
    pub state_trace: Vec<AgentState>,
    pub tool_executions: Vec<ToolExecution>,
}

#[derive(Debug, thiserror::Error)]
pub enum AgentExecutorError {
    #[error("cancelled")]
    Cancelled,
    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("tool error: {0}")]
    Tool(String),
    #[error("invalid agent state transition: {0}")]
    InvalidState(String),
}

/// Validates and records one FSM transition against `AgentState::can_transition_to`,
/// mirroring how `Task::transition` enforces `TaskStatus::can_transition_to`.
fn push_state(trace: &mut Vec<AgentState>, next: AgentState) -> Result<AgentState, AgentExecutorError> {
    let current = *trace.last().expect("state trace always has an initial state");
    if !current.can_transition_to(next) {
        return Err(AgentExecutorError::InvalidState(format!("{current:?} -> {next:?}")));
    }
    trace.push(next);
    Ok(next)
}

/// `(_, Failed)` is always a legal transition; used on every error exit so the
/// trace reflects where the agent actually died.
fn fail_state(trace: &mut Vec<AgentState>) {
    let _ = push_state(trace, AgentState::Failed);
}

/// How many characters of accumulated transcript trigger the context-overflow
/// compression path before the provider itself ever complains.
const COMPRESSION_TRIGGER_CHARS: usize = 24_000;
const COMPRESSION_TARGET_CHARS: usize = 8_000;

#[derive(Default)]
struct StreamedToolCall {
    name: String,
    args: String,
}

/// Bundles prompt assembly, the provider call, and the bounded tool loop. One
/// instance is shared by a workflow for every agent it schedules.
pub struct AgentExecutor {
    providers: ProviderRegistry,
    tools: ToolRegistry,
    event_bus: Arc<EventBus>,
}

impl AgentExecutor {
    pub fn new(providers: ProviderRegistry, tools: ToolRegistry, event_bus: Arc<EventBus>) -> Self {
        Self { providers, tools, event_bus }
    }

    async fn emit(&self, workflow_id: &str, event_type: EventType, agent_id: &str, payload: Value) {
        self.event_bus
            .publish(Event::new(workflow_id, event_type, payload).with_agent(agent_id))
            .await;
    }

    /// Runs the ReAct loop to completion or failure. `checkpoint` is consulted
    /// at the top of every iteration and before every LLM/tool call.
    pub async fn execute(
        &self,
        input: AgentInput,
        checkpoint: &Checkpoint,
        workspace: &Workspace,
        cancel: CancellationToken,
    ) -> Result<AgentOutput, AgentExecutorError> {
        let mut state_trace = vec![AgentState::Idle];

        push_state(&mut state_trace, AgentState::Analyzing)?;
        self.emit(&input.workflow_id, EventType::AgentStarted, &input.agent_id, json!({"role": input.role})).await;
        self.emit(&input.workflow_id, EventType::AgentThinking, &input.agent_id, json!({"phase": "analyzing"})).await;

        let mut transcript: Vec<ChatMessage> = Vec::new();
        if let Some(system_prompt) = &input.system_prompt {
            transcript.push(ChatMessage { role: "system".to_string(), content: system_prompt.clone() });
        }
        transcript.push(ChatMessage { role: "user".to_string(), content: input.input_text.clone() });

        push_state(&mut state_trace, AgentState::Planning)?;
        let tool_schemas = self.tool_schemas_for(&input.tool_allowlist).await;

        push_state(&mut state_trace, AgentState::Executing)?;
        let mut total_usage = Usage::default();
        let mut tool_executions: Vec<ToolExecution> = Vec::new();
        let mut compressed_once = false;
        let mut iterations = 0u32;
        let final_output;

        loop {
            if let Err(outcome) = checkpoint.enter().await {
                let err = map_checkpoint_outcome(outcome);
                fail_state(&mut state_trace);
                self.emit(&input.workflow_id, EventType::AgentFailed, &input.agent_id, json!({"error": err.to_string()})).await;
                return Err(err);
            }
            iterations += 1;
            if iterations > input.iteration_cap {
                final_output = transcript.last().map(|m| m.content.clone()).unwrap_or_default();
                break;
            }

            self.emit(&input.workflow_id, EventType::LlmPrompt, &input.agent_id, json!({"iteration": iterations})).await;

            let estimate = estimate_tokens(&transcript);
            if let Err(outcome) = checkpoint.reserve_tokens(estimate).await {
                let err = map_checkpoint_outcome(outcome);
                fail_state(&mut state_trace);
                self.emit(&input.workflow_id, EventType::AgentFailed, &input.agent_id, json!({"error": err.to_string()})).await;
                return Err(err);
            }

            let (completion, tool_calls, usage) = match self
                .stream_once(&input, transcript.clone(), tool_schemas.clone(), cancel.clone())
                .await
            {
                Ok(result) => result,
                Err(err) => {
                    checkpoint.commit_tokens(estimate, 0).await;
                    let class = classify_provider_error(&err.to_string());
                    if class == ProviderErrorClass::ContextOverflow && !compressed_once {
                        compressed_once = true;
                        compress_transcript(&mut transcript);
                        self.emit(&input.workflow_id, EventType::ErrorRecovery, &input.agent_id, json!({"reason": "context_overflow_compressed"})).await;
                        continue;
                    }
                    self.emit(&input.workflow_id, EventType::LlmError, &input.agent_id, json!({"error": err.to_string()})).await;
                    fail_state(&mut state_trace);
                    self.emit(&input.workflow_id, EventType::AgentFailed, &input.agent_id, json!({"error": err.to_string()})).await;
                    return Err(AgentExecutorError::Provider(err.to_string()));
                }
            };

            checkpoint.commit_tokens(estimate, usage.total_tokens).await;
            total_usage.add(&usage);
            self.emit(
                &input.workflow_id,
                EventType::LlmOutput,
                &input.agent_id,
                json!({"tokens": usage.total_tokens, "tool_calls": tool_calls.len()}),
            )
            .await;

            if tool_calls.is_empty() || is_termination(&completion) {
                transcript.push(ChatMessage { role: "assistant".to_string(), content: completion.clone() });
                final_output = completion;
                break;
            }

            transcript.push(ChatMessage { role: "assistant".to_string(), content: completion });
            push_state(&mut state_trace, AgentState::Validating)?;

            for (tool_name, args) in tool_calls {
                if let Err(outcome) = checkpoint.enter().await {
                    let err = map_checkpoint_outcome(outcome);
                    fail_state(&mut state_trace);
                    self.emit(&input.workflow_id, EventType::AgentFailed, &input.agent_id, json!({"error": err.to_string()})).await;
                    return Err(err);
                }
                if let Some(allow) = &input.tool_allowlist {
                    if !allow.iter().any(|t| t == &tool_name) {
                        transcript.push(ChatMessage {
                            role: "tool".to_string(),
                            content: format!("tool `{tool_name}` is not on the allowlist for this agent"),
                        });
                        continue;
                    }
                }
                self.emit(&input.workflow_id, EventType::ToolInvoked, &input.agent_id, json!({"tool": tool_name, "args": args})).await;
                let tool_started = std::time::Instant::now();
                match self.tools.execute_with_cancel(&tool_name, args.clone(), workspace, cancel.clone()).await {
                    Ok(result) if result.success => {
                        self.emit(&input.workflow_id, EventType::ToolObservation, &input.agent_id, json!({"tool": tool_name, "output": result.output})).await;
                        tool_executions.push(ToolExecution {
                            id: uuid::Uuid::new_v4().to_string(),
                            workflow_id: input.workflow_id.clone(),
                            agent_id: input.agent_id.clone(),
                            tool_name: tool_name.clone(),
                            input: args,
                            output: Some(result.output.clone()),
                            success: true,
                            error: None,
                            duration_ms: tool_started.elapsed().as_millis() as u64,
                            tokens: Usage::default(),
                        });
                        transcript.push(ChatMessage { role: "tool".to_string(), content: result.output.to_string() });
                    }
                    Ok(result) => {
                        self.emit(&input.workflow_id, EventType::ToolError, &input.agent_id, json!({"tool": tool_name, "error": result.error})).await;
                        tool_executions.push(ToolExecution {
                            id: uuid::Uuid::new_v4().to_string(),
                            workflow_id: input.workflow_id.clone(),
                            agent_id: input.agent_id.clone(),
                            tool_name: tool_name.clone(),
                            input: args,
                            output: None,
                            success: false,
                            error: result.error.clone(),
                            duration_ms: tool_started.elapsed().as_millis() as u64,
                            tokens: Usage::default(),
                        });
                        transcript.push(ChatMessage { role: "tool".to_string(), content: result.error.unwrap_or_default() });
                    }
                    Err(err) => {
                        self.emit(&input.workflow_id, EventType::ToolError, &input.agent_id, json!({"tool": tool_name, "error": err.to_string()})).await;
                        tool_executions.push(ToolExecution {
                            id: uuid::Uuid::new_v4().to_string(),
                            workflow_id: input.workflow_id.clone(),
                            agent_id: input.agent_id.clone(),
                            tool_name: tool_name.clone(),
                            input: args,
                            output: None,
                            success: false,
                            error: Some(err.to_string()),
                            duration_ms: tool_started.elapsed().as_millis() as u64,
                            tokens: Usage::default(),
                        });
                        transcript.push(ChatMessage { role: "tool".to_string(), content: err.to_string() });
                    }
                }
            }
            push_state(&mut state_trace, AgentState::Executing)?;
        }

        // Every exit above either returns or breaks while in `Executing`; validate
        // the final answer before synthesizing it even when no tool ran this turn.
        push_state(&mut state_trace, AgentState::Validating)?;
        push_state(&mut state_trace, AgentState::Synthesizing)?;
        push_state(&mut state_trace, AgentState::Completed)?;

        self.emit(
            &input.workflow_id,
            EventType::AgentCompleted,
            &input.agent_id,
            json!({"tokens": total_usage.total_tokens}),
        )
        .await;

        Ok(AgentOutput { output: final_output, usage: total_usage, state_trace, tool_executions })
    }

    async fn tool_schemas_for(&self, allowlist: &Option<Vec<String>>) -> Vec<ProviderToolSchema> {
        let schemas = self.tools.list().await;
        schemas
            .into_iter()
            .filter(|schema| allowlist.as_ref().map(|allow| allow.iter().any(|t| t == &schema.name)).unwrap_or(true))
            .map(|schema| ProviderToolSchema {
                name: schema.name,
                description: schema.description,
                parameters: schema.input_schema,
            })
            .collect()
    }

    /// One streamed provider call: accumulates `TextDelta`s into the
    /// completion, `ToolCallStart/Delta/End` into per-id tool calls, and
    /// retries transient failures with exponential backoff before falling
    /// to the next provider in the registry's fallback chain.
    async fn stream_once(
        &self,
        input: &AgentInput,
        messages: Vec<ChatMessage>,
        tools: Vec<ProviderToolSchema>,
        cancel: CancellationToken,
    ) -> anyhow::Result<(String, Vec<(String, Value)>, waymark_providers::TokenUsage)> {
        let policy = retry_policy();
        let mut last_err = None;

        for attempt in 0..=policy.max_retries {
            let stream_result = self
                .providers
                .stream_for_provider(
                    input.provider_hint.as_deref(),
                    input.model_hint.as_deref(),
                    messages.clone(),
                    Some(tools.clone()),
                    cancel.clone(),
                )
                .await;

            let stream = match stream_result {
                Ok(stream) => stream,
                Err(err) => {
                    last_err = Some(err);
                    if attempt < policy.max_retries {
                        tokio::time::sleep(policy.delay_for_attempt(attempt, jitter_unit(attempt))).await;
                        continue;
                    }
                    break;
                }
            };
            tokio::pin!(stream);

            let mut completion = String::new();
            let mut calls: HashMap<String, StreamedToolCall> = HashMap::new();
            let mut usage = waymark_providers::TokenUsage::default();
            let mut stream_err = None;

            while let Some(chunk) = stream.next().await {
                if cancel.is_cancelled() {
                    break;
                }
                match chunk {
                    Ok(StreamChunk::TextDelta(delta)) => {
                        self.emit(&input.workflow_id, EventType::LlmPartial, &input.agent_id, json!({"delta": delta})).await;
                        completion.push_str(&delta);
                    }
                    Ok(StreamChunk::ReasoningDelta(_)) => {}
                    Ok(StreamChunk::ToolCallStart { id, name }) => {
                        calls.entry(id).or_default().name = name;
                    }
                    Ok(StreamChunk::ToolCallDelta { id, args_delta }) => {
                        calls.entry(id).or_default().args.push_str(&args_delta);
                    }
                    Ok(StreamChunk::ToolCallEnd { .. }) => {}
                    Ok(StreamChunk::Done { usage: chunk_usage, .. }) => {
                        if let Some(u) = chunk_usage {
                            usage = u;
                        }
                        break;
                    }
                    Err(err) => {
                        stream_err = Some(err);
                        break;
                    }
                }
            }

            if let Some(err) = stream_err {
                let class = classify_provider_error(&err.to_string());
                last_err = Some(err);
                if matches!(class, ProviderErrorClass::RateLimit | ProviderErrorClass::Transient) && attempt < policy.max_retries {
                    tokio::time::sleep(policy.delay_for_attempt(attempt, jitter_unit(attempt))).await;
                    continue;
                }
                break;
            }

            let parsed_calls = calls
                .into_values()
                .filter(|c| !c.name.trim().is_empty())
                .map(|c| (c.name, parse_tool_args(&c.args)))
                .collect::<Vec<_>>();

            emit_event(
                Level::INFO,
                ProcessKind::Orchestrator,
                ObservabilityEvent {
                    event: "agent.stream.complete",
                    component: "agent_executor",
                    correlation_id: Some(&input.workflow_id),
                    session_id: None,
                    run_id: Some(&input.agent_id),
                    message_id: None,
                    provider_id: input.provider_hint.as_deref(),
                    model_id: input.model_hint.as_deref(),
                    status: Some("ok"),
                    error_code: None,
                    detail: None,
                },
            );

            return Ok((completion, parsed_calls, usage));
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("provider stream failed with no error detail")))
    }
}

/// Rough pre-call token estimate (~4 chars/token) used to reserve budget
/// ahead of a streamed call whose actual usage is unknown until it returns.
fn estimate_tokens(transcript: &[ChatMessage]) -> u64 {
    let chars: usize = transcript.iter().map(|m| m.content.len()).sum();
    (chars / 4).max(1) as u64
}

fn jitter_unit(attempt: u32) -> f64 {
    // Deterministic pseudo-jitter derived from the attempt index rather than
    // a random source, so retry timing stays reproducible in tests.
    match attempt % 3 {
        0 => 0.0,
        1 => 0.5,
        _ => -0.5,
    }
}

fn parse_tool_args(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| json!({"raw": raw}))
}

fn is_termination(completion: &str) -> bool {
    let trimmed = completion.trim_end();
    trimmed.ends_with("[DONE]") || trimmed.ends_with("<final_answer>")
}

/// Window-trim compression: keeps the system prompt, the original user
/// request, and the tail of the transcript, dropping the middle.
fn compress_transcript(transcript: &mut Vec<ChatMessage>) {
    let total_chars: usize = transcript.iter().map(|m| m.content.len()).sum();
    if total_chars <= COMPRESSION_TRIGGER_CHARS {
        return;
    }
    let mut kept = Vec::new();
    if let Some(first) = transcript.first() {
        if first.role == "system" {
            kept.push(first.clone());
        }
    }
    kept.push(ChatMessage {
        role: "system".to_string(),
        content: "[earlier conversation summarized to fit the context window]".to_string(),
    });

    let mut tail_chars = 0usize;
    let mut tail = Vec::new();
    for msg in transcript.iter().rev() {
        if tail_chars >= COMPRESSION_TARGET_CHARS {
            break;
        }
        tail_chars += msg.content.len();
        tail.push(msg.clone());
    }
    tail.reverse();
    kept.extend(tail);
    *transcript = kept;
}

fn map_checkpoint_outcome(outcome: CheckpointOutcome) -> AgentExecutorError {
    match outcome {
        CheckpointOutcome::Cancelled => AgentExecutorError::Cancelled,
        CheckpointOutcome::BudgetExceeded(reason) => AgentExecutorError::BudgetExceeded(reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlStateStore;
    use std::sync::Arc;
    use waymark_providers::StubProvider;
    use waymark_tools::ToolRegistry as ToolReg;

    fn checkpoint_for(workflow_id: &str) -> (Checkpoint, Arc<crate::accountant::TokenAccountant>) {
        let control = ControlStateStore::new();
        let bus = Arc::new(EventBus::new());
        let accountant = Arc::new(crate::accountant::TokenAccountant::new(
            workflow_id,
            waymark_types::Budget::new(10, 100_000, 3600, 5),
            bus,
        ));
        (Checkpoint::new(workflow_id, control, accountant.clone()), accountant)
    }

    #[tokio::test]
    async fn simple_completion_with_no_tool_calls_terminates_immediately() {
        let providers = ProviderRegistry::new(vec![Arc::new(StubProvider::new("stub", "4"))], None);
        let tools = ToolReg::with_defaults();
        let bus = Arc::new(EventBus::new());
        let executor = AgentExecutor::new(providers, tools, bus.clone());
        let (checkpoint, _accountant) = checkpoint_for("wf-1");
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path());

        let input = AgentInput::new("agent-1", "wf-1", "What is 2+2?");
        let output = executor.execute(input, &checkpoint, &workspace, CancellationToken::new()).await.unwrap();
        assert_eq!(output.output, "4");
        assert_eq!(output.state_trace.last(), Some(&AgentState::Completed));
    }

    #[tokio::test]
    async fn cancelled_control_state_aborts_the_loop() {
        let providers = ProviderRegistry::new(vec![Arc::new(StubProvider::new("stub", "4"))], None);
        let tools = ToolReg::with_defaults();
        let bus = Arc::new(EventBus::new());
        let executor = AgentExecutor::new(providers, tools, bus);
        let control = ControlStateStore::new();
        control.cancel("wf-2", Some("abort".to_string()), None).await;
        let accountant = Arc::new(crate::accountant::TokenAccountant::new(
            "wf-2",
            waymark_types::Budget::new(10, 100_000, 3600, 5),
            Arc::new(EventBus::new()),
        ));
        let checkpoint = Checkpoint::new("wf-2", control, accountant);
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path());

        let input = AgentInput::new("agent-1", "wf-2", "anything");
        let err = executor.execute(input, &checkpoint, &workspace, CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, AgentExecutorError::Cancelled));
    }
}
