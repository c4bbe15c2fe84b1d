//! Triumvir server entry point.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use triumvir::adapters::agents::AgentRegistry;
use triumvir::adapters::llm::{ChatEndpoint, OpenAiChatModel};
use triumvir::adapters::render::DocumentAssembler;
use triumvir::adapters::sqlite::{
    create_pool, Migrator, PoolConfig, SqliteBlackboard, SqliteQueryCache, SqliteTaskStore,
    SqliteWorkQueue,
};
use triumvir::api::{ApiServer, ApiState};
use triumvir::application::{
    OrchestratorJudge, SubmissionService, WorkerPool, WorkflowEngine,
};
use triumvir::domain::ports::ChatModel;
use triumvir::infrastructure::{init_tracing, spawn_sweeper, ConfigLoader};

#[derive(Parser)]
#[command(name = "triumvir", about = "Phased multi-agent analysis orchestrator", version)]
struct Cli {
    /// Load configuration from a specific file instead of .triumvir/
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the API server and worker pools (default)
    Serve {
        /// Override the configured bind host
        #[arg(long)]
        host: Option<String>,
        /// Override the configured bind port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print the effective merged configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };

    match cli.command.unwrap_or(Commands::Serve { host: None, port: None }) {
        Commands::Config => {
            println!("{}", serde_yaml::to_string(&config)?);
            Ok(())
        }
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(config).await
        }
    }
}

async fn serve(config: triumvir::domain::models::config::Config) -> Result<()> {
    let _log_guard = init_tracing(&config.logging);

    let database_url = format!("sqlite:{}", config.database.path);
    let pool = create_pool(
        &database_url,
        Some(PoolConfig {
            max_connections: config.database.max_connections,
            ..PoolConfig::default()
        }),
    )
    .await
    .context("Failed to connect to database")?;

    Migrator::new(pool.clone())
        .run()
        .await
        .context("Failed to run database migrations")?;

    let store = Arc::new(SqliteTaskStore::new(pool.clone()));
    let blackboard = Arc::new(SqliteBlackboard::new(pool.clone()));
    let cache = Arc::new(SqliteQueryCache::new(pool.clone(), config.cache.clone()));
    let queue = Arc::new(SqliteWorkQueue::new(pool.clone()));

    let chat: Option<Arc<dyn ChatModel>> = match ChatEndpoint::from_config(&config.llm.primary) {
        Some(primary) => {
            let fallback = ChatEndpoint::from_config(&config.llm.fallback);
            let model = OpenAiChatModel::new(
                primary,
                fallback,
                config.timeouts.judge_request_secs,
            )?;
            Some(Arc::new(model) as Arc<dyn ChatModel>)
        }
        None => {
            tracing::warn!("no judge model configured, reviews will auto-approve");
            None
        }
    };

    let judge = Arc::new(OrchestratorJudge::new(
        blackboard.clone(),
        chat,
        config.llm.max_tokens,
        Duration::from_secs(config.timeouts.judge_request_secs),
    ));

    // Real research engines are external collaborators; without them the
    // deterministic mock agents keep the pipeline exercisable end to end.
    let agents = AgentRegistry::with_mocks();
    tracing::warn!("no external research engines wired, using mock agents");

    let engine = Arc::new(WorkflowEngine::new(
        store.clone(),
        blackboard.clone(),
        cache.clone(),
        queue.clone(),
        agents,
        judge,
        Arc::new(DocumentAssembler::new()),
        config.retry.clone(),
    ));

    let worker_pool = Arc::new(WorkerPool::new(
        queue.clone(),
        engine,
        config.workers.clone(),
        config.timeouts.clone(),
        config.retry.backoff_secs,
    ));
    let worker_handles = worker_pool.clone().spawn();

    let sweeper = spawn_sweeper(
        store.clone(),
        blackboard.clone(),
        cache.clone(),
        queue.clone(),
        Duration::from_secs(config.cleanup.interval_secs),
    );

    let submission = SubmissionService::new(store.clone(), queue.clone(), config.retry.clone());
    let state = Arc::new(ApiState {
        submission,
        store,
        blackboard,
        pool: pool.clone(),
    });

    let server = ApiServer::new(state, config.server.clone());
    server
        .serve_with_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .map_err(|e| anyhow::anyhow!("server error: {e}"))?;

    sweeper.abort();
    worker_pool.shutdown();
    for handle in worker_handles {
        let _ = handle.await;
    }
    pool.close().await;

    Ok(())
}
