//! DAG scheduling over a flat `Subtask` array: dependency-ready selection and
//! cycle detection, generalized from a `TaskScheduler` that operated on
//! id-keyed tasks to index-keyed subtasks.

use std::collections::HashSet;

use crate::subtask::{Subtask, SubtaskStatus};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DagError {
    #[error("dependency cycle detected: {0:?}")]
    Cycle(Vec<usize>),
    #[error("subtask {0} depends on out-of-range index {1}")]
    DanglingDependency(usize, usize),
    #[error("subtask {0} depends on itself")]
    SelfDependency(usize),
}

/// Validates the graph once before scheduling starts: reject cycles and
/// dangling edges up front rather than deadlocking mid-run.
pub fn validate(subtasks: &[Subtask]) -> Result<(), DagError> {
    for subtask in subtasks {
        for &dep in &subtask.depends_on {
            if dep == subtask.index {
                return Err(DagError::SelfDependency(subtask.index));
            }
            if dep >= subtasks.len() {
                return Err(DagError::DanglingDependency(subtask.index, dep));
            }
        }
    }
    if let Some(cycle) = detect_cycle(subtasks) {
        return Err(DagError::Cycle(cycle));
    }
    Ok(())
}

fn detect_cycle(subtasks: &[Subtask]) -> Option<Vec<usize>> {
    fn dfs(
        index: usize,
        subtasks: &[Subtask],
        visited: &mut HashSet<usize>,
        path: &mut Vec<usize>,
    ) -> bool {
        if path.contains(&index) {
            path.push(index);
            return true;
        }
        if visited.contains(&index) {
            return false;
        }
        visited.insert(index);
        path.push(index);
        for &dep in &subtasks[index].depends_on {
            if dfs(dep, subtasks, visited, path) {
                return true;
            }
        }
        path.pop();
        false
    }

    for subtask in subtasks {
        let mut visited = HashSet::new();
        let mut path = Vec::new();
        if dfs(subtask.index, subtasks, &mut visited, &mut path) {
            return Some(path);
        }
    }
    None
}

/// Indices whose dependencies are all completed and that are themselves
/// still pending.
pub fn ready_set(subtasks: &[Subtask]) -> Vec<usize> {
    let completed: HashSet<usize> = subtasks
        .iter()
        .filter(|s| s.status == SubtaskStatus::Completed)
        .map(|s| s.index)
        .collect();

    subtasks
        .iter()
        .filter(|s| s.status == SubtaskStatus::Pending && s.depends_on.iter().all(|d| completed.contains(d)))
        .map(|s| s.index)
        .collect()
}

pub fn all_terminal(subtasks: &[Subtask]) -> bool {
    subtasks
        .iter()
        .all(|s| matches!(s.status, SubtaskStatus::Completed | SubtaskStatus::Failed | SubtaskStatus::Skipped))
}

pub fn any_failed(subtasks: &[Subtask]) -> bool {
    subtasks.iter().any(|s| s.status == SubtaskStatus::Failed && s.required)
}

/// Transitively marks every subtask reachable from a failed required index as
/// `Skipped`.
pub fn propagate_skips(subtasks: &mut [Subtask]) {
    let mut changed = true;
    while changed {
        changed = false;
        let blocked: HashSet<usize> = subtasks
            .iter()
            .filter(|s| s.status == SubtaskStatus::Failed || s.status == SubtaskStatus::Skipped)
            .map(|s| s.index)
            .collect();

        for subtask in subtasks.iter_mut() {
            if subtask.status == SubtaskStatus::Pending
                && subtask.depends_on.iter().any(|d| blocked.contains(d))
            {
                subtask.status = SubtaskStatus::Skipped;
                changed = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> Vec<Subtask> {
        vec![
            Subtask::new(0, "a"),
            Subtask::new(1, "b").with_dependencies(vec![0]),
            Subtask::new(2, "c").with_dependencies(vec![1]),
        ]
    }

    #[test]
    fn ready_set_starts_with_roots_only() {
        let subtasks = chain();
        assert_eq!(ready_set(&subtasks), vec![0]);
    }

    #[test]
    fn detects_a_two_node_cycle() {
        let subtasks = vec![
            Subtask::new(0, "a").with_dependencies(vec![1]),
            Subtask::new(1, "b").with_dependencies(vec![0]),
        ];
        assert!(matches!(validate(&subtasks), Err(DagError::Cycle(_))));
    }

    #[test]
    fn dangling_dependency_is_rejected() {
        let subtasks = vec![Subtask::new(0, "a").with_dependencies(vec![5])];
        assert_eq!(validate(&subtasks), Err(DagError::DanglingDependency(0, 5)));
    }

    #[test]
    fn failure_skips_descendants() {
        let mut subtasks = chain();
        subtasks[0].status = SubtaskStatus::Failed;
        propagate_skips(&mut subtasks);
        assert_eq!(subtasks[1].status, SubtaskStatus::Skipped);
        assert_eq!(subtasks[2].status, SubtaskStatus::Skipped);
    }
}
