//! End-to-end submissions through `Orchestrator::submit`, one per workflow
//! family's defining behavior: a single-agent run, pause/resume and cancel
//! while paused, parallel fan-out with a required failure, a dependency
//! chain, and the research loop's early stop on coverage.

mod support;

use std::sync::Arc;
use std::time::Duration;

use support::{Rule, ScriptedProvider};

use waymark_core::{AgentExecutor, ControlStateStore, EventBus};
use waymark_orchestrator::persistence::InMemoryPersistence;
use waymark_orchestrator::router::RouterOverrides;
use waymark_orchestrator::workflow::WorkflowError;
use waymark_orchestrator::Orchestrator;
use waymark_providers::ProviderRegistry;
use waymark_tools::{ToolRegistry, Workspace};
use waymark_types::{Budget, Strategy};

fn orchestrator_with(provider: ScriptedProvider) -> (Orchestrator, Arc<std::sync::Mutex<Vec<String>>>, tempfile::TempDir) {
    let log = provider.log.clone();
    let event_bus = Arc::new(EventBus::new());
    let control = ControlStateStore::new();
    let providers = ProviderRegistry::new(vec![Arc::new(provider)], None);
    let tools = ToolRegistry::with_defaults();
    let agent_executor = Arc::new(AgentExecutor::new(providers, tools, event_bus.clone()));
    let persistence = InMemoryPersistence::new();
    let orchestrator = Orchestrator::new(event_bus, control, agent_executor, persistence, None);
    let dir = tempfile::tempdir().unwrap();
    (orchestrator, log, dir)
}

fn workspace_in(dir: &tempfile::TempDir) -> Workspace {
    Workspace::new(dir.path().to_path_buf())
}

fn generous_budget() -> Budget {
    Budget::new(50, 200_000, 3600, 20)
}

#[tokio::test]
async fn simple_arithmetic_returns_the_single_agent_answer() {
    let (orchestrator, _log, dir) = orchestrator_with(ScriptedProvider::new(vec![], "4"));
    let overrides = RouterOverrides { cognitive_strategy: Some(Strategy::SimpleTask), ..Default::default() };

    let outcome = orchestrator
        .submit("wf-arithmetic", "user-1", "what is 2 + 2?", overrides, workspace_in(&dir), generous_budget())
        .await
        .unwrap();

    assert_eq!(outcome.output.as_deref(), Some("4"));
    assert!(outcome.usage.total_tokens > 0);
}

#[tokio::test]
async fn pause_blocks_a_dag_workflow_until_resumed() {
    let (orchestrator, _log, dir) = orchestrator_with(ScriptedProvider::new(vec![], "done"));
    let workflow_id = "wf-pause-resume";
    let overrides = RouterOverrides { cognitive_strategy: Some(Strategy::Dag), ..Default::default() };

    orchestrator.control.pause(workflow_id, Some("operator review".to_string()), None).await;

    let query = "draft the notes and write the summary and send the email";
    let orchestrator_clone = orchestrator.clone();
    let workspace = workspace_in(&dir);
    let budget = generous_budget();
    let handle = tokio::spawn(async move {
        orchestrator_clone.submit(workflow_id, "user-1", query, overrides, workspace, budget).await
    });

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!handle.is_finished(), "workflow should still be blocked on the paused checkpoint");

    orchestrator.control.resume(workflow_id, None, Some("operator".to_string())).await;

    let outcome = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("workflow did not resume in time")
        .unwrap()
        .unwrap();
    assert!(outcome.output.unwrap().contains("done"));
}

#[tokio::test]
async fn cancel_while_paused_short_circuits_with_cancelled() {
    let (orchestrator, _log, dir) = orchestrator_with(ScriptedProvider::new(vec![], "done"));
    let workflow_id = "wf-cancel-while-paused";
    let overrides = RouterOverrides { cognitive_strategy: Some(Strategy::Dag), ..Default::default() };

    orchestrator.control.pause(workflow_id, Some("operator review".to_string()), None).await;

    let query = "draft the notes and write the summary and send the email";
    let orchestrator_clone = orchestrator.clone();
    let workspace = workspace_in(&dir);
    let budget = generous_budget();
    let handle = tokio::spawn(async move {
        orchestrator_clone.submit(workflow_id, "user-1", query, overrides, workspace, budget).await
    });

    tokio::time::sleep(Duration::from_millis(30)).await;
    orchestrator.control.cancel(workflow_id, Some("user abort".to_string()), None).await;

    let result = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("workflow did not unblock after cancel")
        .unwrap();
    assert!(matches!(result, Err(WorkflowError::Cancelled)));
}

#[tokio::test]
async fn parallel_fan_out_fails_the_workflow_on_a_required_subtask_failure() {
    let provider = ScriptedProvider::new(
        vec![Rule::Fail("critical migration", "fatal: migration blocked by a lock")],
        "status sent",
    );
    let (orchestrator, log, dir) = orchestrator_with(provider);
    let overrides = RouterOverrides { cognitive_strategy: Some(Strategy::Standard), ..Default::default() };

    let query = "REQUIRED: run the critical migration and send a status update";
    let err = tokio::time::timeout(
        Duration::from_secs(5),
        orchestrator.submit("wf-required-failure", "user-1", query, overrides, workspace_in(&dir), generous_budget()),
    )
    .await
    .expect("workflow should fail well within the retry backoff window")
    .unwrap_err();

    assert!(matches!(err, WorkflowError::AgentFailed(_)));
    // Both subtasks still ran concurrently; only the required one failing
    // aborts the workflow, not the optional one. The failing call retries
    // against the same provider before giving up, so it appears more than once.
    let calls = log.lock().unwrap().clone();
    assert!(calls.iter().any(|p| p.contains("critical migration")));
    assert!(calls.iter().any(|p| p.contains("status update")));
}

#[tokio::test]
async fn dag_runs_dependent_subtasks_in_order() {
    let provider = ScriptedProvider::new(
        vec![
            Rule::Respond("clone the repository", "cloned"),
            Rule::Respond("run the build", "built"),
            Rule::Respond("execute the test suite", "tested"),
        ],
        "unexpected",
    );
    let (orchestrator, log, dir) = orchestrator_with(provider);
    let overrides = RouterOverrides { cognitive_strategy: Some(Strategy::Dag), ..Default::default() };

    let query = "clone the repository and run the build and execute the test suite";
    let outcome = orchestrator
        .submit("wf-dag-order", "user-1", query, overrides, workspace_in(&dir), generous_budget())
        .await
        .unwrap();

    assert!(outcome.output.as_deref().unwrap().contains("tested"));
    let calls = log.lock().unwrap().clone();
    assert_eq!(calls.len(), 3);
    assert!(calls[0].contains("clone the repository"));
    assert!(calls[1].contains("run the build"));
    assert!(calls[2].contains("execute the test suite"));
}

#[tokio::test]
async fn research_stops_after_one_round_once_coverage_clears_the_threshold() {
    let provider = ScriptedProvider::new(
        vec![
            Rule::Respond("0 to 1 scale", "0.95 - thorough coverage"),
            Rule::Respond(
                "remains unanswered",
                "should never be reached once coverage clears on round one",
            ),
        ],
        "Found at https://example.com/a and also at https://example.com/a/?ref=1 today.",
    );
    let (orchestrator, log, dir) = orchestrator_with(provider);
    let overrides = RouterOverrides { cognitive_strategy: Some(Strategy::Research), ..Default::default() };

    let query = "research the history of tea and summarize the findings and cite sources";
    let outcome = orchestrator
        .submit("wf-research-stop", "user-1", query, overrides, workspace_in(&dir), generous_budget())
        .await
        .unwrap();

    let citations = outcome.metadata["citations"].as_array().unwrap();
    assert_eq!(citations.len(), 1, "the two URL variants should dedup to one canonical citation");
    assert!(outcome.metadata["coverage"].as_f64().unwrap() >= 0.85);

    let calls = log.lock().unwrap().clone();
    let grading_calls = calls.iter().filter(|p| p.contains("0 to 1 scale")).count();
    assert_eq!(grading_calls, 1, "coverage cleared on the first round, so no second grading call should happen");
    assert!(calls.iter().all(|p| !p.contains("remains unanswered")), "gap-finding should be skipped once coverage clears");
}
