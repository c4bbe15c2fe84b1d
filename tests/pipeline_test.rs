//! End-to-end pipeline scenarios over the full stack.

mod common;

use common::Harness;
use triumvir::adapters::agents::MockBehavior;
use triumvir::domain::errors::CoreError;
use triumvir::domain::models::agent::{AgentKind, AgentRunStatus};
use triumvir::domain::models::task::TaskStatus;
use triumvir::domain::models::work::WorkPhase;
use triumvir::domain::ports::{Blackboard as _, TaskStore as _};

#[tokio::test]
async fn happy_path_completes_with_full_document() {
    let harness = Harness::new().await;
    let task = harness.submit("Analyze EV market 2025").await;

    let finished = harness.wait_terminal(&task.task_id).await;
    assert_eq!(finished.status, TaskStatus::Completed);
    assert_eq!(finished.progress, 100);
    assert!(finished.completed_at.is_some());

    let document = harness
        .store
        .result(&task.task_id)
        .await
        .unwrap()
        .expect("completed task must have a renderable document");
    assert!(!document.metadata.title.is_empty());
    assert!(!document.summary.highlights.is_empty());
    assert_eq!(document.sections.len(), 3);
    assert_eq!(document.sources.len(), 3);
    for engine in ["QueryEngine", "MediaEngine", "InsightEngine"] {
        assert!(document.sources.iter().any(|s| s.engine == engine && s.count == 1));
    }

    // Both reviews ran, each agent ran each phase once.
    assert_eq!(harness.chat.calls(), 2);
    for kind in AgentKind::ALL {
        let agent = harness.agent(kind);
        assert_eq!(agent.calls(WorkPhase::Plan).await, 1);
        assert_eq!(agent.calls(WorkPhase::Research).await, 1);
        assert_eq!(agent.calls(WorkPhase::Supplement).await, 0);
        assert_eq!(agent.calls(WorkPhase::Report).await, 1);
    }

    let progress = harness.store.agent_progress(&task.task_id).await.unwrap();
    assert!(progress.values().all(|p| p.status == AgentRunStatus::Completed));

    harness.shutdown();
}

#[tokio::test]
async fn supplement_round_runs_once_and_skips_rejudging() {
    let harness = Harness::new().await;
    harness.chat.push(Ok("DECISION: APPROVE".to_string())).await;
    harness
        .chat
        .push(Ok("DECISION: SUPPLEMENT\nGUIDANCE: dig into regional sales".to_string()))
        .await;

    let task = harness.submit("EV adoption by region").await;
    let finished = harness.wait_terminal(&task.task_id).await;
    assert_eq!(finished.status, TaskStatus::Completed);

    // One supplement round ran, with persisted guidance.
    assert_eq!(harness.blackboard.supplement_round(&task.task_id).await.unwrap(), 1);
    assert_eq!(
        harness
            .blackboard
            .guidance(&task.task_id, triumvir::domain::models::decision::ReviewPhase::Research)
            .await
            .unwrap()
            .as_deref(),
        Some("dig into regional sales")
    );
    for kind in AgentKind::ALL {
        assert_eq!(harness.agent(kind).calls(WorkPhase::Supplement).await, 1);
    }

    // The refined research record carries the supplement guidance.
    let research = harness
        .blackboard
        .phase_result(
            &task.task_id,
            AgentKind::Media,
            triumvir::domain::models::agent::AgentPhase::Research,
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(research["supplement"]["guidance"], "dig into regional sales");

    // The judge is not re-invoked after the supplement barrier.
    assert_eq!(harness.chat.calls(), 2);

    harness.shutdown();
}

#[tokio::test]
async fn supplement_capped_at_one_round() {
    let harness = Harness::without_workers().await;
    let task = harness.submit("EV supply chain risks").await;

    // A prior supplement round is already on the books.
    harness
        .blackboard
        .increment_supplement_round(&task.task_id)
        .await
        .unwrap();
    harness.chat.push(Ok("DECISION: APPROVE".to_string())).await;
    harness
        .chat
        .push(Ok("DECISION: SUPPLEMENT\nGUIDANCE: more".to_string()))
        .await;

    let _handles = harness.worker_pool.clone().spawn();
    let finished = harness.wait_terminal(&task.task_id).await;
    assert_eq!(finished.status, TaskStatus::Completed);

    // Downgraded to approve: no supplement executions, round unchanged.
    for kind in AgentKind::ALL {
        assert_eq!(harness.agent(kind).calls(WorkPhase::Supplement).await, 0);
    }
    assert_eq!(harness.blackboard.supplement_round(&task.task_id).await.unwrap(), 1);

    harness.shutdown();
}

#[tokio::test]
async fn one_failing_agent_degrades_to_fallbacks() {
    let harness = Harness::new().await;
    harness
        .agent(AgentKind::Media)
        .set_behavior(WorkPhase::Research, MockBehavior::failing("search backend down"))
        .await;

    let task = harness.submit("EV battery recycling").await;
    let finished = harness.wait_terminal(&task.task_id).await;
    assert_eq!(finished.status, TaskStatus::Completed);

    // Both attempts were spent before the fallback was recorded.
    assert_eq!(harness.agent(AgentKind::Media).calls(WorkPhase::Research).await, 2);

    let research = harness
        .blackboard
        .phase_result(
            &task.task_id,
            AgentKind::Media,
            triumvir::domain::models::agent::AgentPhase::Research,
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(research["fallback"], true);

    // The judge still reviewed, and the final document carries the
    // fallback note for the broken engine.
    assert_eq!(harness.chat.calls(), 2);
    let document = harness.store.result(&task.task_id).await.unwrap().unwrap();
    assert_eq!(document.sections.len(), 3);
    assert!(document
        .sections
        .iter()
        .any(|s| s.content.contains("MediaEngine report unavailable")));

    let progress = harness.store.agent_progress(&task.task_id).await.unwrap();
    assert_eq!(progress[&AgentKind::Media].status, AgentRunStatus::Failed);
    assert_eq!(progress[&AgentKind::Query].status, AgentRunStatus::Completed);

    let forum = harness.blackboard.forum_log(&task.task_id).await.unwrap();
    assert!(forum.iter().any(|e| e.speaker == "media" && e.content.contains("fallback")));

    harness.shutdown();
}

#[tokio::test]
async fn exact_cache_hit_skips_all_agent_work() {
    let harness = Harness::new().await;
    let first = harness.submit("Analyze EV market 2025").await;
    harness.wait_terminal(&first.task_id).await;
    let first_doc = harness.store.result(&first.task_id).await.unwrap().unwrap();

    let chat_calls = harness.chat.calls();

    let second = harness.submit("Analyze EV market 2025").await;
    let finished = harness.wait_terminal(&second.task_id).await;
    assert_eq!(finished.status, TaskStatus::Completed);
    assert_eq!(finished.progress, 100);

    // No agent or judge work ran for the cached submission.
    assert_eq!(harness.chat.calls(), chat_calls);
    for kind in AgentKind::ALL {
        assert_eq!(harness.agent(kind).calls(WorkPhase::Plan).await, 1);
    }

    // The served document matches the original byte for byte.
    let second_doc = harness.store.result(&second.task_id).await.unwrap().unwrap();
    assert_eq!(
        serde_json::to_vec(&first_doc).unwrap(),
        serde_json::to_vec(&second_doc).unwrap()
    );

    harness.shutdown();
}

#[tokio::test]
async fn similar_query_is_served_from_cache() {
    let harness = Harness::new().await;
    let first = harness.submit("电动汽车 2025 市场分析").await;
    harness.wait_terminal(&first.task_id).await;
    let first_doc = harness.store.result(&first.task_id).await.unwrap().unwrap();

    let second = harness.submit("2025 电动汽车市场 分析").await;
    let finished = harness.wait_terminal(&second.task_id).await;
    assert_eq!(finished.status, TaskStatus::Completed);

    for kind in AgentKind::ALL {
        assert_eq!(harness.agent(kind).calls(WorkPhase::Plan).await, 1);
    }
    let second_doc = harness.store.result(&second.task_id).await.unwrap().unwrap();
    assert_eq!(first_doc, second_doc);

    harness.shutdown();
}

#[tokio::test]
async fn judge_outage_never_wedges_the_pipeline() {
    let harness = Harness::new().await;
    harness
        .chat
        .push(Err(CoreError::TransientBackend("judge llm unreachable".to_string())))
        .await;
    harness
        .chat
        .push(Err(CoreError::TransientBackend("judge llm unreachable".to_string())))
        .await;

    let task = harness.submit("EV charging infrastructure").await;
    let finished = harness.wait_terminal(&task.task_id).await;
    assert_eq!(finished.status, TaskStatus::Completed);

    // Both reviews were attempted, both failure notes are on the log.
    assert_eq!(harness.chat.calls(), 2);
    let forum = harness.blackboard.forum_log(&task.task_id).await.unwrap();
    let failure_notes = forum
        .iter()
        .filter(|e| e.content.contains("review failed"))
        .count();
    assert_eq!(failure_notes, 2);

    harness.shutdown();
}

#[tokio::test]
async fn all_agents_failing_plan_still_terminates() {
    let harness = Harness::new().await;
    for kind in AgentKind::ALL {
        harness
            .agent(kind)
            .set_behavior(WorkPhase::Plan, MockBehavior::failing("planner offline"))
            .await;
    }

    let task = harness.submit("EV subsidies outlook").await;
    let finished = harness.wait_terminal(&task.task_id).await;
    assert_eq!(finished.status, TaskStatus::Completed);

    // The judge was still invoked for both reviews.
    assert_eq!(harness.chat.calls(), 2);

    // Fallback plans have no resume token, so research and report
    // cascade to fallbacks too; research never ran against the agents.
    for kind in AgentKind::ALL {
        assert_eq!(harness.agent(kind).calls(WorkPhase::Plan).await, 2);
        assert_eq!(harness.agent(kind).calls(WorkPhase::Research).await, 0);
        assert_eq!(harness.agent(kind).calls(WorkPhase::Report).await, 0);
    }

    let document = harness.store.result(&task.task_id).await.unwrap().unwrap();
    assert_eq!(document.sections.len(), 3);
    assert!(document.sections.iter().all(|s| s.content.contains("unavailable")));

    harness.shutdown();
}

#[tokio::test]
async fn standard_mode_skips_reviews() {
    let harness = Harness::new().await;
    let task = harness.submit_standard("EV fleet conversions").await;

    let finished = harness.wait_terminal(&task.task_id).await;
    assert_eq!(finished.status, TaskStatus::Completed);

    assert_eq!(harness.chat.calls(), 0);
    assert_eq!(harness.blackboard.supplement_round(&task.task_id).await.unwrap(), 0);
    for kind in AgentKind::ALL {
        assert_eq!(harness.agent(kind).calls(WorkPhase::Plan).await, 1);
        assert_eq!(harness.agent(kind).calls(WorkPhase::Research).await, 1);
        assert_eq!(harness.agent(kind).calls(WorkPhase::Report).await, 1);
    }

    let document = harness.store.result(&task.task_id).await.unwrap().unwrap();
    assert!(!document.metadata.phased);

    harness.shutdown();
}

#[tokio::test]
async fn flaky_agent_recovers_within_retry_budget() {
    let harness = Harness::new().await;
    harness
        .agent(AgentKind::Insight)
        .set_behavior(WorkPhase::Research, MockBehavior::flaky(1, "timeout"))
        .await;

    let task = harness.submit("EV insurance pricing").await;
    let finished = harness.wait_terminal(&task.task_id).await;
    assert_eq!(finished.status, TaskStatus::Completed);

    // One failure, one successful retry; no fallback involved.
    assert_eq!(harness.agent(AgentKind::Insight).calls(WorkPhase::Research).await, 2);
    let research = harness
        .blackboard
        .phase_result(
            &task.task_id,
            AgentKind::Insight,
            triumvir::domain::models::agent::AgentPhase::Research,
        )
        .await
        .unwrap()
        .unwrap();
    assert!(research.get("fallback").is_none());

    let progress = harness.store.agent_progress(&task.task_id).await.unwrap();
    assert_eq!(progress[&AgentKind::Insight].status, AgentRunStatus::Completed);

    harness.shutdown();
}
