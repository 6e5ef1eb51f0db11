//! Shared subtask shape consumed by the Standard, DAG, and Supervisor
//! workflow families. Dependencies are indices into the same flat array
//! rather than a separate id-keyed graph, mirroring the Design Notes'
//! "represent the DAG as indices into a flat subtask array".

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    pub index: usize,
    pub query: String,
    #[serde(default)]
    pub depends_on: Vec<usize>,
    /// Defaults to `false`: the original source left `required` vs optional
    /// subtasks unspecified for Standard workflows, resolved here as
    /// per-subtask opt-in rather than opt-out.
    #[serde(default)]
    pub required: bool,
    pub status: SubtaskStatus,
    pub output: Option<String>,
    pub error: Option<String>,
}

impl Subtask {
    pub fn new(index: usize, query: impl Into<String>) -> Self {
        Self {
            index,
            query: query.into(),
            depends_on: Vec::new(),
            required: false,
            status: SubtaskStatus::Pending,
            output: None,
            error: None,
        }
    }

    pub fn with_dependencies(mut self, depends_on: Vec<usize>) -> Self {
        self.depends_on = depends_on;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Builds a subtask from decomposed text, honoring a `REQUIRED:` prefix
    /// convention so a caller can mark a subtask required through the plain
    /// query text without a separate structured subtask channel.
    pub fn parse(index: usize, text: impl Into<String>) -> Self {
        let text = text.into();
        match text.strip_prefix("REQUIRED:") {
            Some(rest) => Self::new(index, rest.trim().to_string()).required(),
            None => Self::new(index, text),
        }
    }
}

/// Splits a free-form query into independent subtask strings. A real system
/// would delegate this to a planning LLM call through the Agent Executor;
/// here the heuristic gives deterministic, testable fan-out without a live
/// model: split on top-level conjunctions, then enumerated list markers,
/// falling back to the whole query as a single subtask.
pub fn decompose_heuristic(query: &str, cap: usize) -> Vec<String> {
    let numbered: Vec<&str> = query
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim_start();
            let after_digit = trimmed
                .find(|c: char| !c.is_ascii_digit())
                .filter(|&i| i > 0 && trimmed[i..].starts_with(['.', ')']))?;
            Some(trimmed[after_digit + 1..].trim())
        })
        .filter(|s| !s.is_empty())
        .collect();

    let parts: Vec<String> = if numbered.len() > 1 {
        numbered.into_iter().map(|s| s.to_string()).collect()
    } else {
        query
            .split(" and ")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    };

    if parts.len() <= 1 {
        vec![query.trim().to_string()]
    } else {
        parts.into_iter().take(cap).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_top_level_and() {
        let parts = decompose_heuristic("fetch the changelog and summarize the release notes", 8);
        assert_eq!(parts.len(), 2);
    }

    #[test]
    fn falls_back_to_single_subtask() {
        let parts = decompose_heuristic("what is the capital of france", 8);
        assert_eq!(parts, vec!["what is the capital of france".to_string()]);
    }

    #[test]
    fn numbered_list_wins_over_and_split() {
        let query = "1. look up the weather\n2. draft a status update and send it";
        let parts = decompose_heuristic(query, 8);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1], "draft a status update and send it");
    }
}
