//! Shared test harness: the full orchestration stack over a temporary
//! SQLite database, with scripted agents and a scripted judge model.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use triumvir::adapters::agents::{AgentRegistry, MockResearchAgent};
use triumvir::adapters::render::DocumentAssembler;
use triumvir::adapters::sqlite::{
    create_pool, Migrator, PoolConfig, SqliteBlackboard, SqliteQueryCache, SqliteTaskStore,
    SqliteWorkQueue,
};
use triumvir::application::{
    OrchestratorJudge, SubmissionService, WorkerPool, WorkflowEngine,
};
use triumvir::domain::errors::CoreResult;
use triumvir::domain::models::agent::AgentKind;
use triumvir::domain::models::config::{CacheConfig, RetryConfig, TimeoutsConfig, WorkersConfig};
use triumvir::domain::models::task::{AnalysisMode, AnalysisTask};
use triumvir::domain::ports::{ChatModel, ChatRequest};

/// Judge model with scripted replies. When the script is exhausted it
/// approves, so unrelated scenarios never block on review outcomes.
pub struct ScriptedChat {
    replies: Mutex<VecDeque<CoreResult<String>>>,
    calls: AtomicU32,
}

impl ScriptedChat {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            calls: AtomicU32::new(0),
        })
    }

    /// Queue the next reply (or error) the judge model will produce.
    pub async fn push(&self, reply: CoreResult<String>) {
        self.replies.lock().await.push_back(reply);
    }

    /// Number of completions requested so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn complete(&self, _request: &ChatRequest) -> CoreResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.replies.lock().await.pop_front() {
            Some(reply) => reply,
            None => Ok("DECISION: APPROVE".to_string()),
        }
    }
}

/// Full stack over a temporary database.
pub struct Harness {
    _dir: tempfile::TempDir,
    pub pool: sqlx::SqlitePool,
    pub store: Arc<SqliteTaskStore>,
    pub blackboard: Arc<SqliteBlackboard>,
    pub cache: Arc<SqliteQueryCache>,
    pub queue: Arc<SqliteWorkQueue>,
    pub submission: SubmissionService,
    pub chat: Arc<ScriptedChat>,
    pub agents: BTreeMap<AgentKind, Arc<MockResearchAgent>>,
    pub worker_pool: Arc<WorkerPool>,
    handles: Vec<JoinHandle<()>>,
}

impl Harness {
    /// Build the stack and start the worker pools.
    pub async fn new() -> Self {
        Self::build(true).await
    }

    /// Build the stack without workers; submitted tasks stay pending.
    pub async fn without_workers() -> Self {
        Self::build(false).await
    }

    async fn build(spawn_workers: bool) -> Self {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let db_path = dir.path().join("triumvir-test.db");
        let pool = create_pool(
            &format!("sqlite:{}", db_path.display()),
            Some(PoolConfig { max_connections: 8, ..PoolConfig::default() }),
        )
        .await
        .expect("pool");
        Migrator::new(pool.clone()).run().await.expect("migrations");

        let store = Arc::new(SqliteTaskStore::new(pool.clone()));
        let blackboard = Arc::new(SqliteBlackboard::new(pool.clone()));
        let cache = Arc::new(SqliteQueryCache::new(pool.clone(), CacheConfig::default()));
        let queue = Arc::new(SqliteWorkQueue::new(pool.clone()));

        let chat = ScriptedChat::new();
        let judge = Arc::new(OrchestratorJudge::new(
            blackboard.clone(),
            Some(chat.clone() as Arc<dyn ChatModel>),
            256,
            Duration::from_secs(5),
        ));

        let mut registry = AgentRegistry::new();
        let mut agents = BTreeMap::new();
        for kind in AgentKind::ALL {
            let agent = Arc::new(MockResearchAgent::new(kind));
            registry.register(agent.clone());
            agents.insert(kind, agent);
        }

        // Fast-feedback retry policy: same attempt budget, no backoff.
        let retry = RetryConfig { max_attempts: 2, backoff_secs: 0 };

        let engine = Arc::new(WorkflowEngine::new(
            store.clone(),
            blackboard.clone(),
            cache.clone(),
            queue.clone(),
            registry,
            judge,
            Arc::new(DocumentAssembler::new()),
            retry.clone(),
        ));

        let workers = WorkersConfig {
            agents: 4,
            orchestrator: 2,
            report: 2,
            poll_interval_ms: 10,
        };
        let worker_pool = Arc::new(WorkerPool::new(
            queue.clone(),
            engine,
            workers,
            TimeoutsConfig::default(),
            retry.backoff_secs,
        ));
        let handles = if spawn_workers { worker_pool.clone().spawn() } else { Vec::new() };

        let submission = SubmissionService::new(store.clone(), queue.clone(), retry);

        Self {
            _dir: dir,
            pool,
            store,
            blackboard,
            cache,
            queue,
            submission,
            chat,
            agents,
            worker_pool,
            handles,
        }
    }

    pub fn agent(&self, kind: AgentKind) -> &Arc<MockResearchAgent> {
        &self.agents[&kind]
    }

    pub async fn submit(&self, query: &str) -> AnalysisTask {
        self.submission
            .submit(query, AnalysisMode::Phased)
            .await
            .expect("submission should succeed")
    }

    pub async fn submit_standard(&self, query: &str) -> AnalysisTask {
        self.submission
            .submit(query, AnalysisMode::Standard)
            .await
            .expect("submission should succeed")
    }

    /// Poll until the task reaches a terminal state, asserting that
    /// progress never decreases along the way.
    pub async fn wait_terminal(&self, task_id: &str) -> AnalysisTask {
        use triumvir::domain::ports::TaskStore as _;

        let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
        let mut last_progress = 0u8;
        loop {
            let task = self
                .store
                .get(task_id)
                .await
                .expect("task read")
                .expect("task exists");
            if task.status != triumvir::domain::models::task::TaskStatus::Failed {
                assert!(
                    task.progress >= last_progress,
                    "progress went backwards: {} -> {}",
                    last_progress,
                    task.progress
                );
                last_progress = task.progress;
            }
            if task.is_terminal() {
                return task;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "task {task_id} did not reach a terminal state in time (status {})",
                task.status.as_str()
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    pub fn shutdown(&self) {
        self.worker_pool.shutdown();
    }
}
