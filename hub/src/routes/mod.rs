pub mod market;
pub mod mcp;

use axum::Router;
use std::sync::Arc;

use crate::state::AppState;

/// Assemble the API router.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(market::routes())
        .merge(mcp::routes())
}
