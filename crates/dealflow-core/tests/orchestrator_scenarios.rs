//! End-to-end orchestrator scenarios over scripted agents.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dealflow_core::agents::{
    AgentRegistry, ProgressSink, ScriptedAgent, StepAgent, StepContext,
};
use dealflow_core::error::ServerError;
use dealflow_core::events::WorkflowEvent;
use dealflow_core::models::artifact::StepArtifact;
use dealflow_core::models::company::{CompanyProfile, DocumentKind, SourceDocument};
use dealflow_core::models::workflow::{StepName, StepStatus, WorkflowSnapshot};
use dealflow_core::workflow::{Orchestrator, OrchestratorConfig};

fn company() -> CompanyProfile {
    CompanyProfile {
        company_name: "Bizzi".to_string(),
        website: "https://bizzi.vn/en/".to_string(),
        sector: "SaaS".to_string(),
        region: "Vietnam".to_string(),
        hq_location: None,
    }
}

fn document() -> SourceDocument {
    SourceDocument {
        filename: "financials.xlsx".to_string(),
        kind: DocumentKind::Excel,
        text: "ARR $4.2M, burn $150k/mo".to_string(),
    }
}

fn scripted_registry() -> AgentRegistry {
    let mut registry = AgentRegistry::new();
    for step in [
        StepName::Research,
        StepName::DataRoom,
        StepName::RiskScan,
        StepName::Memo,
    ] {
        registry.register(
            step,
            Arc::new(ScriptedAgent::new(step).with_delay(Duration::from_millis(20))),
        );
    }
    registry
}

fn orchestrator(registry: AgentRegistry) -> Arc<Orchestrator> {
    Arc::new(Orchestrator::new(registry, OrchestratorConfig::default()))
}

/// Poll `inspect` until a step reaches the wanted status.
async fn wait_for_status(
    orch: &Orchestrator,
    workflow_id: &str,
    step: StepName,
    status: StepStatus,
) -> WorkflowSnapshot {
    for _ in 0..500 {
        let snapshot = orch.inspect(workflow_id).await.unwrap();
        if snapshot
            .steps
            .iter()
            .any(|s| s.name == step && s.status == status)
        {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("step {} never reached {}", step, status);
}

// ── Property: at most one step runs at a time ───────────────────────────────

/// Delay-injecting agent that records how many executions overlap.
struct GuardAgent {
    inner: ScriptedAgent,
    active: Arc<AtomicUsize>,
    max_seen: Arc<AtomicUsize>,
}

#[async_trait]
impl StepAgent for GuardAgent {
    async fn execute(
        &self,
        ctx: &StepContext,
        sink: &ProgressSink,
    ) -> Result<StepArtifact, ServerError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);
        let result = self.inner.execute(ctx, sink).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[tokio::test]
async fn test_no_overlapping_step_executions() {
    let active = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));

    let mut registry = AgentRegistry::new();
    for step in [StepName::Research, StepName::RiskScan, StepName::Memo] {
        registry.register(
            step,
            Arc::new(GuardAgent {
                inner: ScriptedAgent::new(step).with_delay(Duration::from_millis(30)),
                active: active.clone(),
                max_seen: max_seen.clone(),
            }),
        );
    }
    let orch = orchestrator(registry);

    let started = orch.start(company(), vec![]).await.unwrap();
    let id = &started.workflow_id;

    for step in [StepName::Research, StepName::RiskScan, StepName::Memo] {
        wait_for_status(&orch, id, step, StepStatus::AwaitingReview).await;
        orch.approve(id).await.unwrap();
    }

    let snapshot = orch.inspect(id).await.unwrap();
    assert!(snapshot.terminal);
    assert_eq!(max_seen.load(Ordering::SeqCst), 1);
}

// ── Property: cursor strictly increases, never revisits ─────────────────────

#[tokio::test]
async fn test_cursor_monotonic_over_continue_and_skip() {
    let orch = orchestrator(scripted_registry());
    let started = orch.start(company(), vec![document()]).await.unwrap();
    let id = &started.workflow_id;
    assert_eq!(started.step_sequence.len(), 4);

    let mut last_cursor = 0;
    for (i, step) in started.step_sequence.iter().enumerate() {
        let snapshot = wait_for_status(&orch, id, *step, StepStatus::AwaitingReview).await;
        assert_eq!(snapshot.cursor, i);
        assert!(snapshot.cursor >= last_cursor);
        last_cursor = snapshot.cursor;

        // alternate continue and skip
        if i % 2 == 0 {
            orch.approve(id).await.unwrap();
        } else {
            orch.skip(id).await.unwrap();
        }
    }

    let snapshot = orch.inspect(id).await.unwrap();
    assert_eq!(snapshot.cursor, 4);
    assert!(snapshot.terminal);
    // settled steps are never revisited
    for step in &snapshot.steps {
        assert!(matches!(
            step.status,
            StepStatus::Completed | StepStatus::Skipped
        ));
    }
}

// ── Property: refine keeps the cursor, bumps the attempt, keeps history ─────

#[tokio::test]
async fn test_refine_increments_attempt_and_retains_history() {
    let orch = orchestrator(scripted_registry());
    let started = orch.start(company(), vec![]).await.unwrap();
    let id = &started.workflow_id;

    wait_for_status(&orch, id, StepName::Research, StepStatus::AwaitingReview).await;
    let before = orch.inspect(id).await.unwrap();

    orch.refine(id, "focus on unit economics").await.unwrap();
    wait_for_status(&orch, id, StepName::Research, StepStatus::Refining).await;
    let snapshot = wait_for_status(&orch, id, StepName::Research, StepStatus::AwaitingReview).await;

    assert_eq!(snapshot.cursor, before.cursor);
    assert_eq!(snapshot.steps[0].attempt, 2);

    let versions = orch.artifact(id, StepName::Research).await.unwrap();
    assert_eq!(versions.current.attempt, 2);
    assert_eq!(versions.history.len(), 1);
    assert_eq!(versions.history[0].attempt, 1);
    // the refined artifact reflects the reviewer feedback
    let refined = versions.current.payload.as_research().unwrap();
    assert!(refined.sections[0].content.contains("focus on unit economics"));
}

#[tokio::test]
async fn test_refine_with_empty_feedback_is_rejected() {
    let orch = orchestrator(scripted_registry());
    let started = orch.start(company(), vec![]).await.unwrap();
    let id = &started.workflow_id;

    wait_for_status(&orch, id, StepName::Research, StepStatus::AwaitingReview).await;
    let err = orch.refine(id, "   ").await.unwrap_err();
    assert!(matches!(err, ServerError::BadRequest(_)));

    // nothing moved
    let snapshot = orch.inspect(id).await.unwrap();
    assert_eq!(snapshot.steps[0].status, StepStatus::AwaitingReview);
    assert_eq!(snapshot.steps[0].attempt, 1);
}

// ── Property: invalid continue/skip rejects idempotently ────────────────────

#[tokio::test]
async fn test_continue_while_running_is_invalid_state() {
    let mut registry = scripted_registry();
    registry.register(
        StepName::Research,
        Arc::new(ScriptedAgent::new(StepName::Research).with_delay(Duration::from_millis(200))),
    );
    let orch = orchestrator(registry);

    let started = orch.start(company(), vec![]).await.unwrap();
    let id = &started.workflow_id;

    let before = orch.inspect(id).await.unwrap();
    assert_eq!(before.steps[0].status, StepStatus::Running);

    assert!(matches!(
        orch.approve(id).await.unwrap_err(),
        ServerError::InvalidState(_)
    ));
    assert!(matches!(
        orch.skip(id).await.unwrap_err(),
        ServerError::InvalidState(_)
    ));

    // state unchanged by the rejected calls
    let after = orch.inspect(id).await.unwrap();
    assert_eq!(after.cursor, before.cursor);
    assert_eq!(after.steps[0].status, StepStatus::Running);
}

#[tokio::test]
async fn test_unknown_workflow_is_not_found() {
    let orch = orchestrator(scripted_registry());
    assert!(matches!(
        orch.inspect("no-such-id").await.unwrap_err(),
        ServerError::NotFound(_)
    ));
    assert!(matches!(
        orch.approve("no-such-id").await.unwrap_err(),
        ServerError::NotFound(_)
    ));
}

// ── Property: sequence derivation ───────────────────────────────────────────

#[tokio::test]
async fn test_no_documents_means_no_data_room_step() {
    let orch = orchestrator(scripted_registry());
    let started = orch.start(company(), vec![]).await.unwrap();

    assert_eq!(
        started.step_sequence,
        vec![StepName::Research, StepName::RiskScan, StepName::Memo]
    );
    let snapshot = orch.inspect(&started.workflow_id).await.unwrap();
    assert!(!snapshot.steps.iter().any(|s| s.name == StepName::DataRoom));
}

// ── Scenario A: skip after review ───────────────────────────────────────────

#[tokio::test]
async fn test_scenario_a_skip_discards_artifact_and_runs_next() {
    let orch = orchestrator(scripted_registry());
    let started = orch.start(company(), vec![]).await.unwrap();
    let id = &started.workflow_id;

    wait_for_status(&orch, id, StepName::Research, StepStatus::AwaitingReview).await;
    let next = orch.skip(id).await.unwrap();
    assert_eq!(next, Some(StepName::RiskScan));

    let snapshot = orch.inspect(id).await.unwrap();
    let research = snapshot
        .steps
        .iter()
        .find(|s| s.name == StepName::Research)
        .unwrap();
    assert_eq!(research.status, StepStatus::Skipped);
    assert!(!research.has_artifact);
    assert!(matches!(
        orch.artifact(id, StepName::Research).await.unwrap_err(),
        ServerError::NotFound(_)
    ));

    let risk_scan = snapshot
        .steps
        .iter()
        .find(|s| s.name == StepName::RiskScan)
        .unwrap();
    assert!(matches!(
        risk_scan.status,
        StepStatus::Running | StepStatus::AwaitingReview
    ));
}

// ── Scenario B: failure then refine ─────────────────────────────────────────

#[tokio::test]
async fn test_scenario_b_failed_step_recovers_through_refine() {
    let mut registry = scripted_registry();
    registry.register(
        StepName::Research,
        Arc::new(
            ScriptedAgent::new(StepName::Research)
                .failing_on(vec![1])
                .with_delay(Duration::from_millis(50)),
        ),
    );
    let orch = orchestrator(registry);

    let started = orch.start(company(), vec![]).await.unwrap();
    let id = &started.workflow_id;
    let mut events = orch.subscribe(id).await.unwrap();

    let snapshot = wait_for_status(&orch, id, StepName::Research, StepStatus::Failed).await;
    assert!(snapshot.steps[0].error.is_some());

    // an error event was emitted on the progress stream
    let mut saw_error = false;
    while let Ok(Ok(event)) =
        tokio::time::timeout(Duration::from_millis(500), events.recv()).await
    {
        if matches!(event, WorkflowEvent::Error { step: StepName::Research, .. }) {
            saw_error = true;
            break;
        }
    }
    assert!(saw_error);

    orch.refine(id, "try a narrower scope").await.unwrap();
    let snapshot = wait_for_status(&orch, id, StepName::Research, StepStatus::AwaitingReview).await;
    assert_eq!(snapshot.steps[0].attempt, 2);
    assert!(snapshot.steps[0].error.is_none());
}

// ── Scenario C: cancel mid-run ──────────────────────────────────────────────

#[tokio::test]
async fn test_scenario_c_cancel_mid_run() {
    let mut registry = scripted_registry();
    registry.register(
        StepName::Research,
        Arc::new(
            ScriptedAgent::new(StepName::Research)
                .with_chunks(vec!["a".into(), "b".into(), "c".into()])
                .with_delay(Duration::from_millis(100)),
        ),
    );
    let orch = orchestrator(registry);

    let started = orch.start(company(), vec![]).await.unwrap();
    let id = &started.workflow_id;
    let mut events = orch.subscribe(id).await.unwrap();

    tokio::time::sleep(Duration::from_millis(30)).await;
    orch.cancel(id).await.unwrap();

    let snapshot = orch.inspect(id).await.unwrap();
    assert!(snapshot.terminal);
    assert!(snapshot.cancelled);
    assert_eq!(snapshot.steps[0].status, StepStatus::Cancelled);

    // the subscription ends with a cancelled signal and no step_complete
    let mut saw_cancelled = false;
    loop {
        match events.recv().await {
            Ok(WorkflowEvent::StepComplete { .. }) => {
                panic!("step_complete emitted after cancel")
            }
            Ok(WorkflowEvent::Cancelled) => saw_cancelled = true,
            Ok(_) => {}
            Err(_) => break,
        }
    }
    assert!(saw_cancelled);

    // give the in-flight runner time to resolve; it must not store anything
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(matches!(
        orch.artifact(id, StepName::Research).await.unwrap_err(),
        ServerError::NotFound(_)
    ));
    // cancel on an already-terminal workflow is rejected
    assert!(matches!(
        orch.cancel(id).await.unwrap_err(),
        ServerError::InvalidState(_)
    ));
}

// ── Downstream steps see skipped upstream artifacts as absent ───────────────

#[tokio::test]
async fn test_memo_sources_reflect_skipped_steps() {
    let orch = orchestrator(scripted_registry());
    let started = orch.start(company(), vec![]).await.unwrap();
    let id = &started.workflow_id;

    // skip research, approve risk-scan, approve memo
    wait_for_status(&orch, id, StepName::Research, StepStatus::AwaitingReview).await;
    orch.skip(id).await.unwrap();
    wait_for_status(&orch, id, StepName::RiskScan, StepStatus::AwaitingReview).await;
    orch.approve(id).await.unwrap();
    wait_for_status(&orch, id, StepName::Memo, StepStatus::AwaitingReview).await;

    let memo = orch.artifact(id, StepName::Memo).await.unwrap();
    let sources = &memo.current.payload.as_memo().unwrap().sources_used;
    assert!(sources.contains(&"risk-scan".to_string()));
    assert!(!sources.contains(&"research".to_string()));
}

// ── Eviction ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_sweeper_evicts_idle_workflow_and_cancels_in_flight_run() {
    let mut registry = scripted_registry();
    registry.register(
        StepName::Research,
        Arc::new(ScriptedAgent::new(StepName::Research).with_delay(Duration::from_secs(2))),
    );
    let orch = Arc::new(Orchestrator::new(
        registry,
        OrchestratorConfig {
            retention: Duration::from_millis(50),
            sweep_interval: Duration::from_secs(3600),
        },
    ));

    let started = orch.start(company(), vec![]).await.unwrap();
    let id = &started.workflow_id;
    let mut events = orch.subscribe(id).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    orch.sweep().await;

    assert!(matches!(
        orch.inspect(id).await.unwrap_err(),
        ServerError::NotFound(_)
    ));

    // the abandoned run was cancelled, not orphaned
    let mut saw_cancelled = false;
    loop {
        match events.recv().await {
            Ok(WorkflowEvent::Cancelled) => saw_cancelled = true,
            Ok(_) => {}
            Err(_) => break,
        }
    }
    assert!(saw_cancelled);
}
