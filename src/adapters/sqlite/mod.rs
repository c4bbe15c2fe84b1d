//! SQLite adapters for the durable stores.

pub mod blackboard;
pub mod connection;
pub mod migrations;
pub mod query_cache;
pub mod task_store;
pub mod util;
pub mod work_queue;

pub use blackboard::SqliteBlackboard;
pub use connection::{create_pool, create_test_pool, verify_connection, ConnectionError, PoolConfig};
pub use migrations::{embedded_migrations, Migration, MigrationError, Migrator};
pub use query_cache::SqliteQueryCache;
pub use task_store::SqliteTaskStore;
pub use work_queue::SqliteWorkQueue;
