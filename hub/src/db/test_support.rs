use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use super::executor::{BoundQuery, QueryExecutor, StoreError, StoreRow, StoreValue};
use super::schema::SchemaRegistry;
use crate::config::SchemaConfig;
use crate::state::AppState;

pub fn tmp_db_path(tag: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("market_hub_{tag}_{nanos}_{}.db", std::process::id()))
}

/// Scratch database file, removed when dropped.
pub struct TempDb(PathBuf);

impl TempDb {
    pub fn new(tag: &str) -> Self {
        Self(tmp_db_path(tag))
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

/// Answers every query with the same rows, or with a store failure.
pub struct StubExecutor {
    pub rows: Vec<StoreRow>,
    pub fail: bool,
}

impl QueryExecutor for StubExecutor {
    fn fetch_all(&self, _query: &BoundQuery) -> Result<Vec<StoreRow>, StoreError> {
        if self.fail {
            return Err(StoreError("disk I/O error".into()));
        }
        Ok(self.rows.clone())
    }
}

pub fn candle_row(ts: &str, close: f64) -> StoreRow {
    vec![
        ("symbol".into(), StoreValue::Text("BTC".into())),
        ("time_frame".into(), StoreValue::Text("5m".into())),
        ("timestamp".into(), StoreValue::Text(ts.into())),
        ("close".into(), StoreValue::Real(close)),
    ]
}

pub fn stub_state(rows: Vec<StoreRow>, fail: bool) -> Arc<AppState> {
    let schema = SchemaRegistry::resolve(&SchemaConfig {
        normalize_time_frames: true,
        ..Default::default()
    });
    AppState::new(schema, Arc::new(StubExecutor { rows, fail }))
}
