use std::sync::Arc;
use std::time::Duration;

use crate::config::HubConfig;
use crate::db::executor::{QueryExecutor, SqliteExecutor};
use crate::db::pool::open_ro_pool;
use crate::db::query::{self, QueryError, QueryRequest, ResultEnvelope};
use crate::db::schema::{DatasetKind, SchemaRegistry};
use crate::error::HubError;
use crate::mcp::sessions::SseSessions;

/// Shared application state, passed to HTTP handlers via `axum::extract::State`
/// and to the MCP dispatcher.
pub struct AppState {
    pub schema: SchemaRegistry,
    pub executor: Arc<dyn QueryExecutor>,
    pub sse_sessions: SseSessions,
}

impl AppState {
    pub fn new(schema: SchemaRegistry, executor: Arc<dyn QueryExecutor>) -> Arc<Self> {
        Arc::new(Self {
            schema,
            executor,
            sse_sessions: SseSessions::default(),
        })
    }

    /// Resolve mappings and open the read-only store pool.
    pub fn from_config(config: &HubConfig) -> Result<Arc<Self>, HubError> {
        let schema = SchemaRegistry::resolve(&config.schema);
        let pool = open_ro_pool(&config.db_path, config.pool_size)?;
        let executor = SqliteExecutor::new(pool, Duration::from_millis(config.busy_timeout_ms));
        Ok(Self::new(schema, Arc::new(executor)))
    }

    /// Run one dataset query on the blocking pool.
    pub async fn query(
        self: &Arc<Self>,
        kind: DatasetKind,
        request: QueryRequest,
    ) -> Result<Result<ResultEnvelope, QueryError>, HubError> {
        let state = Arc::clone(self);
        let result = tokio::task::spawn_blocking(move || {
            query::execute(&request, state.schema.mapping(kind), state.executor.as_ref())
        })
        .await?;
        Ok(result)
    }
}
