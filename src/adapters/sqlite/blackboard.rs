//! SQLite implementation of the Blackboard.
//!
//! A flat keyed store per task. Phase results, phase markers and guidance
//! live in one key-value table; the supplement round counter and the
//! forum log get their own tables because their writes must be atomic
//! against concurrent writers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::BTreeMap;

use crate::adapters::sqlite::util::{expires_ts, fmt_ts, now_ts, parse_ts};
use crate::domain::errors::CoreResult;
use crate::domain::models::agent::{AgentKind, AgentPhase};
use crate::domain::models::decision::ReviewPhase;
use crate::domain::models::forum::ForumEntry;
use crate::domain::ports::{Blackboard, BlackboardSummary};

/// All task-scoped keys expire seven days after their last write.
const DEFAULT_TTL_SECS: i64 = 7 * 86_400;

/// Stored wrapper around a phase payload.
#[derive(Debug, Serialize, Deserialize)]
struct StoredPhaseResult {
    agent: AgentKind,
    payload: serde_json::Value,
    created_at: String,
}

/// Stored wrapper around a phase marker.
#[derive(Debug, Serialize, Deserialize)]
struct StoredPhaseMarker {
    phase: AgentPhase,
    updated_at: String,
}

/// Stored wrapper around guidance text.
#[derive(Debug, Serialize, Deserialize)]
struct StoredGuidance {
    phase: ReviewPhase,
    guidance: String,
    created_at: String,
}

#[derive(Clone)]
pub struct SqliteBlackboard {
    pool: SqlitePool,
}

impl SqliteBlackboard {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn phase_marker_key(agent: AgentKind) -> String {
        format!("agent:{agent}:phase")
    }

    fn phase_result_key(agent: AgentKind, phase: AgentPhase) -> String {
        format!("agent:{agent}:{phase}")
    }

    fn guidance_key(phase: ReviewPhase) -> String {
        format!("guidance:{phase}")
    }

    async fn kv_set(&self, task_id: &str, key: &str, value: &str) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO blackboard (task_id, key, value, updated_at, expires_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(task_id, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at,
                expires_at = excluded.expires_at",
        )
        .bind(task_id)
        .bind(key)
        .bind(value)
        .bind(now_ts())
        .bind(expires_ts(DEFAULT_TTL_SECS))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn kv_get(&self, task_id: &str, key: &str) -> CoreResult<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT value FROM blackboard WHERE task_id = ? AND key = ? AND expires_at > ?",
        )
        .bind(task_id)
        .bind(key)
        .bind(now_ts())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(v,)| v))
    }
}

#[async_trait]
impl Blackboard for SqliteBlackboard {
    async fn set_agent_phase(
        &self,
        task_id: &str,
        agent: AgentKind,
        phase: AgentPhase,
    ) -> CoreResult<()> {
        let marker = StoredPhaseMarker { phase, updated_at: now_ts() };
        self.kv_set(
            task_id,
            &Self::phase_marker_key(agent),
            &serde_json::to_string(&marker)?,
        )
        .await
    }

    async fn agent_phase(
        &self,
        task_id: &str,
        agent: AgentKind,
    ) -> CoreResult<Option<AgentPhase>> {
        match self.kv_get(task_id, &Self::phase_marker_key(agent)).await? {
            Some(raw) => {
                let marker: StoredPhaseMarker = serde_json::from_str(&raw)?;
                Ok(Some(marker.phase))
            }
            None => Ok(None),
        }
    }

    async fn all_agent_phases(
        &self,
        task_id: &str,
    ) -> CoreResult<BTreeMap<AgentKind, AgentPhase>> {
        let mut result = BTreeMap::new();
        for agent in AgentKind::ALL {
            if let Some(phase) = self.agent_phase(task_id, agent).await? {
                result.insert(agent, phase);
            }
        }
        Ok(result)
    }

    async fn save_phase_result(
        &self,
        task_id: &str,
        agent: AgentKind,
        phase: AgentPhase,
        payload: &serde_json::Value,
    ) -> CoreResult<()> {
        let record = StoredPhaseResult {
            agent,
            payload: payload.clone(),
            created_at: now_ts(),
        };
        self.kv_set(
            task_id,
            &Self::phase_result_key(agent, phase),
            &serde_json::to_string(&record)?,
        )
        .await
    }

    async fn phase_result(
        &self,
        task_id: &str,
        agent: AgentKind,
        phase: AgentPhase,
    ) -> CoreResult<Option<serde_json::Value>> {
        match self
            .kv_get(task_id, &Self::phase_result_key(agent, phase))
            .await?
        {
            Some(raw) => {
                let record: StoredPhaseResult = serde_json::from_str(&raw)?;
                Ok(Some(record.payload))
            }
            None => Ok(None),
        }
    }

    async fn all_phase_results(
        &self,
        task_id: &str,
        phase: AgentPhase,
    ) -> CoreResult<BTreeMap<AgentKind, serde_json::Value>> {
        let mut result = BTreeMap::new();
        for agent in AgentKind::ALL {
            if let Some(payload) = self.phase_result(task_id, agent, phase).await? {
                result.insert(agent, payload);
            }
        }
        Ok(result)
    }

    async fn save_guidance(
        &self,
        task_id: &str,
        phase: ReviewPhase,
        guidance: &str,
    ) -> CoreResult<()> {
        let record = StoredGuidance {
            phase,
            guidance: guidance.to_string(),
            created_at: now_ts(),
        };
        self.kv_set(
            task_id,
            &Self::guidance_key(phase),
            &serde_json::to_string(&record)?,
        )
        .await
    }

    async fn guidance(&self, task_id: &str, phase: ReviewPhase) -> CoreResult<Option<String>> {
        match self.kv_get(task_id, &Self::guidance_key(phase)).await? {
            Some(raw) => {
                let record: StoredGuidance = serde_json::from_str(&raw)?;
                Ok(Some(record.guidance))
            }
            None => Ok(None),
        }
    }

    async fn increment_supplement_round(&self, task_id: &str) -> CoreResult<u32> {
        let row: (i64,) = sqlx::query_as(
            "INSERT INTO supplement_rounds (task_id, round, updated_at, expires_at)
             VALUES (?, 1, ?, ?)
             ON CONFLICT(task_id) DO UPDATE SET
                round = round + 1,
                updated_at = excluded.updated_at,
                expires_at = excluded.expires_at
             RETURNING round",
        )
        .bind(task_id)
        .bind(now_ts())
        .bind(expires_ts(DEFAULT_TTL_SECS))
        .fetch_one(&self.pool)
        .await?;
        Ok(u32::try_from(row.0).unwrap_or(u32::MAX))
    }

    async fn supplement_round(&self, task_id: &str) -> CoreResult<u32> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT round FROM supplement_rounds WHERE task_id = ? AND expires_at > ?",
        )
        .bind(task_id)
        .bind(now_ts())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map_or(0, |(r,)| u32::try_from(r).unwrap_or(u32::MAX)))
    }

    async fn append_forum(&self, task_id: &str, entry: &ForumEntry) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO forum_log (task_id, speaker, content, created_at, expires_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(task_id)
        .bind(&entry.speaker)
        .bind(&entry.content)
        .bind(fmt_ts(entry.timestamp))
        .bind(expires_ts(DEFAULT_TTL_SECS))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn forum_log(&self, task_id: &str) -> CoreResult<Vec<ForumEntry>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT speaker, content, created_at FROM forum_log
             WHERE task_id = ? AND expires_at > ?
             ORDER BY seq",
        )
        .bind(task_id)
        .bind(now_ts())
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for (speaker, content, created_at) in rows {
            entries.push(ForumEntry {
                speaker,
                content,
                timestamp: parse_ts(&created_at)?,
            });
        }
        Ok(entries)
    }

    async fn task_summary(&self, task_id: &str) -> CoreResult<BlackboardSummary> {
        let reports = self
            .all_phase_results(task_id, AgentPhase::Report)
            .await?
            .into_iter()
            .map(|(agent, payload)| {
                let text = payload.as_str().map_or_else(|| payload.to_string(), String::from);
                (agent, text)
            })
            .collect();

        Ok(BlackboardSummary {
            phases: self.all_agent_phases(task_id).await?,
            plans: self.all_phase_results(task_id, AgentPhase::Plan).await?,
            research: self.all_phase_results(task_id, AgentPhase::Research).await?,
            reports,
            supplement_round: self.supplement_round(task_id).await?,
            guidance_plan: self.guidance(task_id, ReviewPhase::Plan).await?,
            guidance_research: self.guidance(task_id, ReviewPhase::Research).await?,
            forum_log: self.forum_log(task_id).await?,
        })
    }

    async fn sweep_expired(&self) -> CoreResult<u64> {
        let now = now_ts();
        let mut removed = 0;
        for table in ["blackboard", "supplement_rounds", "forum_log"] {
            let result = sqlx::query(&format!("DELETE FROM {table} WHERE expires_at <= ?"))
                .bind(&now)
                .execute(&self.pool)
                .await?;
            removed += result.rows_affected();
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::connection::create_test_pool;
    use crate::adapters::sqlite::migrations::Migrator;
    use serde_json::json;

    async fn blackboard() -> SqliteBlackboard {
        let pool = create_test_pool().await.unwrap();
        Migrator::new(pool.clone()).run().await.unwrap();
        SqliteBlackboard::new(pool)
    }

    #[tokio::test]
    async fn test_phase_result_round_trip() {
        let bb = blackboard().await;
        let payload = json!({"state_dict": {"cursor": 1}, "keywords": ["ev"]});

        bb.save_phase_result("t1", AgentKind::Query, AgentPhase::Plan, &payload)
            .await
            .unwrap();

        let read = bb
            .phase_result("t1", AgentKind::Query, AgentPhase::Plan)
            .await
            .unwrap();
        assert_eq!(read, Some(payload));

        // Absence is reported, not defaulted.
        let missing = bb
            .phase_result("t1", AgentKind::Media, AgentPhase::Plan)
            .await
            .unwrap();
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn test_batch_reads_omit_missing_agents() {
        let bb = blackboard().await;
        bb.save_phase_result("t1", AgentKind::Query, AgentPhase::Research, &json!({"a": 1}))
            .await
            .unwrap();
        bb.save_phase_result("t1", AgentKind::Insight, AgentPhase::Research, &json!({"b": 2}))
            .await
            .unwrap();

        let all = bb.all_phase_results("t1", AgentPhase::Research).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(!all.contains_key(&AgentKind::Media));
    }

    #[tokio::test]
    async fn test_phase_marker() {
        let bb = blackboard().await;
        bb.set_agent_phase("t1", AgentKind::Media, AgentPhase::Plan)
            .await
            .unwrap();
        bb.set_agent_phase("t1", AgentKind::Media, AgentPhase::Research)
            .await
            .unwrap();

        assert_eq!(
            bb.agent_phase("t1", AgentKind::Media).await.unwrap(),
            Some(AgentPhase::Research)
        );
        let all = bb.all_agent_phases("t1").await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_guidance_round_trip() {
        let bb = blackboard().await;
        assert_eq!(bb.guidance("t1", ReviewPhase::Plan).await.unwrap(), None);

        bb.save_guidance("t1", ReviewPhase::Research, "cover supply chains")
            .await
            .unwrap();
        assert_eq!(
            bb.guidance("t1", ReviewPhase::Research).await.unwrap(),
            Some("cover supply chains".to_string())
        );
        assert_eq!(bb.guidance("t1", ReviewPhase::Plan).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_supplement_round_counter() {
        let bb = blackboard().await;
        assert_eq!(bb.supplement_round("t1").await.unwrap(), 0);
        assert_eq!(bb.increment_supplement_round("t1").await.unwrap(), 1);
        assert_eq!(bb.increment_supplement_round("t1").await.unwrap(), 2);
        assert_eq!(bb.supplement_round("t1").await.unwrap(), 2);
        // Counters are per task.
        assert_eq!(bb.supplement_round("t2").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_forum_log_preserves_order() {
        let bb = blackboard().await;
        for i in 0..5 {
            bb.append_forum("t1", &ForumEntry::new("orchestrator", format!("entry {i}")))
                .await
                .unwrap();
        }
        let log = bb.forum_log("t1").await.unwrap();
        assert_eq!(log.len(), 5);
        for (i, entry) in log.iter().enumerate() {
            assert_eq!(entry.content, format!("entry {i}"));
        }
    }

    #[tokio::test]
    async fn test_task_summary_composition() {
        let bb = blackboard().await;
        bb.save_phase_result("t1", AgentKind::Query, AgentPhase::Plan, &json!({"p": 1}))
            .await
            .unwrap();
        bb.save_phase_result(
            "t1",
            AgentKind::Query,
            AgentPhase::Report,
            &json!("the query report"),
        )
        .await
        .unwrap();
        bb.set_agent_phase("t1", AgentKind::Query, AgentPhase::Report)
            .await
            .unwrap();
        bb.save_guidance("t1", ReviewPhase::Plan, "focus on 2025").await.unwrap();
        bb.append_forum("t1", &ForumEntry::orchestrator("decision: approve"))
            .await
            .unwrap();

        let summary = bb.task_summary("t1").await.unwrap();
        assert_eq!(summary.plans.len(), 1);
        assert_eq!(
            summary.reports.get(&AgentKind::Query).map(String::as_str),
            Some("the query report")
        );
        assert_eq!(summary.supplement_round, 0);
        assert_eq!(summary.guidance_plan.as_deref(), Some("focus on 2025"));
        assert_eq!(summary.guidance_research, None);
        assert_eq!(summary.forum_log.len(), 1);
    }
}
