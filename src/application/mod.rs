//! Application services: submission, the workflow engine, the judge,
//! and the worker pools.

pub mod judge;
pub mod submission;
pub mod worker_pool;
pub mod workflow;

pub use judge::OrchestratorJudge;
pub use submission::SubmissionService;
pub use worker_pool::WorkerPool;
pub use workflow::WorkflowEngine;
