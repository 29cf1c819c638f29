use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;

use crate::db::query::{QueryRequest, ResultEnvelope};
use crate::db::schema::DatasetKind;
use crate::error::HubError;
use crate::state::AppState;

// ── Route definitions ────────────────────────────────────────────────────

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/candles", get(api_candles))
        .route("/volume-footprint", get(api_volume_footprint))
        .route("/cvd", get(api_cvd))
        .route("/ema", get(api_ema))
}

// ── Handlers ─────────────────────────────────────────────────────────────

async fn run_dataset(
    state: Arc<AppState>,
    kind: DatasetKind,
    query: Result<Query<QueryRequest>, QueryRejection>,
) -> Result<Json<ResultEnvelope>, HubError> {
    let Query(request) = query.map_err(|e| HubError::BadRequest(e.body_text()))?;
    let envelope = state.query(kind, request).await??;
    Ok(Json(envelope))
}

async fn api_candles(
    State(state): State<Arc<AppState>>,
    q: Result<Query<QueryRequest>, QueryRejection>,
) -> Result<Json<ResultEnvelope>, HubError> {
    run_dataset(state, DatasetKind::Candle, q).await
}

async fn api_volume_footprint(
    State(state): State<Arc<AppState>>,
    q: Result<Query<QueryRequest>, QueryRejection>,
) -> Result<Json<ResultEnvelope>, HubError> {
    run_dataset(state, DatasetKind::Footprint, q).await
}

async fn api_cvd(
    State(state): State<Arc<AppState>>,
    q: Result<Query<QueryRequest>, QueryRejection>,
) -> Result<Json<ResultEnvelope>, HubError> {
    run_dataset(state, DatasetKind::Cvd, q).await
}

async fn api_ema(
    State(state): State<Arc<AppState>>,
    q: Result<Query<QueryRequest>, QueryRejection>,
) -> Result<Json<ResultEnvelope>, HubError> {
    run_dataset(state, DatasetKind::Ema, q).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{candle_row, stub_state};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn get_json(state: Arc<AppState>, uri: &str) -> (StatusCode, Value) {
        let app = routes().with_state(state);
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn candles_return_envelope() {
        let state = stub_state(
            vec![candle_row("2024-01-01 00:00:00", 1.0), candle_row("2024-01-01 00:05:00", 2.0)],
            false,
        );
        let (status, body) = get_json(
            state,
            "/candles?symbol=BTC&time_frame=5&start_timestamp=2024-01-01%2000:00:00",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], json!(2));
        assert_eq!(body["start_timestamp"], json!("2024-01-01 00:00:00"));
        assert_eq!(body["end_timestamp"], Value::Null);
        assert_eq!(body["candles"][1]["close"], json!(2.0));
    }

    #[tokio::test]
    async fn each_dataset_uses_its_data_key() {
        for (uri, key) in [
            ("/volume-footprint?symbol=BTC&time_frame=5", "footprints"),
            ("/cvd?symbol=BTC&time_frame=5", "cvd"),
            ("/ema?symbol=BTC&time_frame=5", "ema"),
        ] {
            let (status, body) = get_json(stub_state(vec![], false), uri).await;
            assert_eq!(status, StatusCode::OK, "{uri}");
            assert_eq!(body[key], json!([]), "{uri}");
            assert_eq!(body["count"], json!(0));
        }
    }

    #[tokio::test]
    async fn validation_failures_are_400() {
        for uri in [
            "/candles?time_frame=5",
            "/candles?symbol=BTC&time_frame=5&limit=0",
            "/candles?symbol=BTC&time_frame=5&limit=1001",
            "/candles?symbol=BTC&time_frame=5&limit=abc",
            "/candles?symbol=BTC&time_frame=5&end_timestamp=yesterday",
        ] {
            let (status, body) = get_json(stub_state(vec![], false), uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert!(body["error"].as_str().unwrap().starts_with("validation_error:"), "{uri}");
        }
    }

    #[tokio::test]
    async fn store_failures_are_500() {
        let (status, body) = get_json(stub_state(vec![], true), "/cvd?symbol=BTC&time_frame=5").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], json!("store_error: disk I/O error"));
    }
}
