#![forbid(unsafe_code)]

pub mod config;
pub mod notify;
pub mod pool;
pub mod query;
pub mod store;

pub use config::StoreConfig;
pub use notify::{IndexSink, REINDEX_SYNC_LIMIT, ReindexPlan};
pub use pool::{ConnectionPool, PoolConfig, PoolError, PoolMetrics, PooledConnection};
pub use query::{ContainmentQuery, StorageRepresentation, translate_sort, translate_to_sql};
pub use store::*;
