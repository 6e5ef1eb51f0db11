//! Research / Iterative Coverage: decompose into
//! sub-questions, retrieve sources per sub-question via the `web_search`/
//! `web_fetch` tools, grade coverage, identify gaps, and repeat until the
//! coverage threshold is met or the iteration cap is reached.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::json;
use tokio::sync::Semaphore;
use url::Url;

use waymark_core::AgentInput;
use waymark_types::{EventType, Usage};

use crate::subtask::decompose_heuristic;

use super::{WorkflowContext, WorkflowError, WorkflowOutcome};

const COVERAGE_THRESHOLD: f64 = 0.85;
const DELTA_THRESHOLD: f64 = 0.05;
const DEFAULT_MAX_ITERATIONS: u32 = 3;
const MAX_SUB_QUESTIONS: usize = 8;
const RESEARCH_TOOL_ALLOWLIST: &[&str] = &["web_search", "web_fetch"];

pub async fn run(ctx: &WorkflowContext, query: &str) -> Result<WorkflowOutcome, WorkflowError> {
    ctx.emit(EventType::WorkflowStarted, json!({"strategy": "research"})).await;
    ctx.checkpoint_gate().await?;

    let mut sub_questions = decompose_heuristic(query, MAX_SUB_QUESTIONS);
    let mut findings: Vec<String> = Vec::new();
    let mut citations: HashSet<String> = HashSet::new();
    let mut previous_coverage = 0.0_f64;
    let mut total_usage = Usage::default();

    for iteration in 0..DEFAULT_MAX_ITERATIONS {
        ctx.checkpoint_gate().await?;

        let round_findings = retrieve_sources(ctx, &sub_questions).await?;
        for (text, urls, usage) in round_findings {
            total_usage.add(&usage);
            findings.push(text);
            for url in urls {
                citations.insert(url);
            }
        }

        let (coverage, usage) = grade_coverage(ctx, query, &findings).await?;
        total_usage.add(&usage);
        ctx.emit(
            EventType::Progress,
            json!({"phase": "coverage_graded", "iteration": iteration, "coverage": coverage}),
        )
        .await;

        let delta = (coverage - previous_coverage).abs();
        if coverage >= COVERAGE_THRESHOLD || delta < DELTA_THRESHOLD {
            previous_coverage = coverage;
            break;
        }
        previous_coverage = coverage;

        let (gaps, usage) = identify_gaps(ctx, query, &findings).await?;
        total_usage.add(&usage);
        sub_questions = gaps;
        if sub_questions.is_empty() {
            break;
        }
    }

    let synthesis_input = format!(
        "Write a final, well-cited answer to \"{query}\" from these findings:\n{}\n\nSources:\n{}",
        findings.join("\n---\n"),
        citations.iter().cloned().collect::<Vec<_>>().join("\n")
    );
    let synthesis_agent = AgentInput::new("research-synthesis", ctx.workflow_id.clone(), synthesis_input.clone());
    let synthesis = ctx
        .agent_executor
        .execute(synthesis_agent, &ctx.checkpoint, &ctx.workspace, ctx.cancel.clone())
        .await
        .map_err(|e| WorkflowError::AgentFailed(e.to_string()))?;
    ctx.record_agent_run("research-synthesis", "default", &synthesis_input, &synthesis).await;
    total_usage.add(&synthesis.usage);

    ctx.emit(
        EventType::WorkflowCompleted,
        json!({"coverage": previous_coverage, "citation_count": citations.len(), "tokens": total_usage.total_tokens}),
    )
    .await;

    Ok(WorkflowOutcome::new(synthesis.output, total_usage)
        .with_metadata(json!({"citations": citations, "coverage": previous_coverage})))
}

async fn retrieve_sources(
    ctx: &WorkflowContext,
    sub_questions: &[String],
) -> Result<Vec<(String, Vec<String>, Usage)>, WorkflowError> {
    let semaphore = Arc::new(Semaphore::new(ctx.max_concurrent_agents.max(1)));
    let mut futures = FuturesUnordered::new();
    for (i, question) in sub_questions.iter().enumerate() {
        let question = question.clone();
        let semaphore = semaphore.clone();
        futures.push(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
            retrieve_one(ctx, i, &question).await
        });
    }
    let mut out = Vec::with_capacity(sub_questions.len());
    while let Some(result) = futures.next().await {
        out.push(result.map_err(WorkflowError::AgentFailed)?);
    }
    Ok(out)
}

async fn retrieve_one(ctx: &WorkflowContext, index: usize, question: &str) -> Result<(String, Vec<String>, Usage), String> {
    ctx.checkpoint_gate().await.map_err(|e| e.to_string())?;
    let agent_id = format!("researcher-{index}");
    let mut input = AgentInput::new(agent_id.clone(), ctx.workflow_id.clone(), question);
    input.role = Some("researcher".to_string());
    input.tool_allowlist = Some(RESEARCH_TOOL_ALLOWLIST.iter().map(|s| s.to_string()).collect());
    let model_hint = input.model_hint.clone().unwrap_or_else(|| "default".to_string());
    let output = ctx
        .agent_executor
        .execute(input, &ctx.checkpoint, &ctx.workspace, ctx.cancel.clone())
        .await
        .map_err(|e| e.to_string())?;
    ctx.record_agent_run(&agent_id, &model_hint, question, &output).await;
    let urls = extract_canonical_urls(&output.output);
    Ok((output.output, urls, output.usage))
}

async fn grade_coverage(ctx: &WorkflowContext, query: &str, findings: &[String]) -> Result<(f64, Usage), WorkflowError> {
    let prompt = format!(
        "On a 0 to 1 scale, how completely do these findings answer \"{query}\"? Respond with just the number.\n\n{}",
        findings.join("\n---\n")
    );
    let mut input = AgentInput::new("coverage-grader", ctx.workflow_id.clone(), prompt.clone());
    input.role = Some("grader".to_string());
    let output = ctx
        .agent_executor
        .execute(input, &ctx.checkpoint, &ctx.workspace, ctx.cancel.clone())
        .await
        .map_err(|e| WorkflowError::AgentFailed(e.to_string()))?;
    ctx.record_agent_run("coverage-grader", "default", &prompt, &output).await;
    Ok((parse_leading_float(&output.output).unwrap_or(0.0).clamp(0.0, 1.0), output.usage))
}

async fn identify_gaps(ctx: &WorkflowContext, query: &str, findings: &[String]) -> Result<(Vec<String>, Usage), WorkflowError> {
    let prompt = format!(
        "What remains unanswered about \"{query}\" given these findings? List each gap as its own sub-question, one per line.\n\n{}",
        findings.join("\n---\n")
    );
    let mut input = AgentInput::new("gap-finder", ctx.workflow_id.clone(), prompt.clone());
    input.role = Some("gap_finder".to_string());
    let output = ctx
        .agent_executor
        .execute(input, &ctx.checkpoint, &ctx.workspace, ctx.cancel.clone())
        .await
        .map_err(|e| WorkflowError::AgentFailed(e.to_string()))?;
    ctx.record_agent_run("gap-finder", "default", &prompt, &output).await;
    let gaps = output
        .output
        .lines()
        .map(|l| l.trim().trim_start_matches(['-', '*']).trim().to_string())
        .filter(|l| !l.is_empty())
        .take(MAX_SUB_QUESTIONS)
        .collect();
    Ok((gaps, output.usage))
}

fn extract_canonical_urls(text: &str) -> Vec<String> {
    text.split_whitespace()
        .filter_map(|token| Url::parse(token.trim_matches(|c: char| matches!(c, '.' | ',' | ')' | '('))).ok())
        .map(canonicalize_url)
        .collect()
}

/// Canonical key for citation dedup: scheme + host + path with the trailing
/// slash and query/fragment stripped.
fn canonicalize_url(url: Url) -> String {
    let mut canonical = format!("{}://{}{}", url.scheme(), url.host_str().unwrap_or(""), url.path());
    if canonical.ends_with('/') && canonical.len() > 1 {
        canonical.pop();
    }
    canonical
}

fn parse_leading_float(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    let end = trimmed
        .char_indices()
        .take_while(|(_, c)| c.is_ascii_digit() || *c == '.')
        .last()
        .map(|(i, c)| i + c.len_utf8())?;
    trimmed[..end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_trailing_slash_and_query() {
        let a = Url::parse("https://example.com/docs/?ref=123").unwrap();
        let b = Url::parse("https://example.com/docs").unwrap();
        assert_eq!(canonicalize_url(a), canonicalize_url(b));
    }

    #[test]
    fn parses_leading_float_from_grader_output() {
        assert_eq!(parse_leading_float("0.92 - well covered"), Some(0.92));
        assert_eq!(parse_leading_float("no number here"), None);
    }
}
