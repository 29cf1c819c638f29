use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::dates;
use crate::db::query::{QueryError, QueryRequest};
use crate::db::schema::DatasetKind;
use crate::state::AppState;

/// Result of a tool call that reached the tool itself.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Ok(Value),
    /// Reported to the client as a tool result with `isError: true`.
    Failed(String),
}

impl ToolOutcome {
    pub fn into_result(self) -> Value {
        match self {
            Self::Ok(value) => json!({
                "content": [{ "type": "text", "text": value.to_string() }],
                "structuredContent": value,
                "isError": false,
            }),
            Self::Failed(message) => json!({
                "content": [{ "type": "text", "text": message }],
                "isError": true,
            }),
        }
    }
}

fn dataset_for_tool(name: &str) -> Option<DatasetKind> {
    match name {
        "get_candles" => Some(DatasetKind::Candle),
        "get_volume_footprint" => Some(DatasetKind::Footprint),
        "get_cvd" => Some(DatasetKind::Cvd),
        "get_ema" => Some(DatasetKind::Ema),
        _ => None,
    }
}

fn dataset_input_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "symbol": {
                "type": "string",
                "description": "Ticker or instrument identifier exactly as stored in the DB."
            },
            "time_frame": {
                "type": "string",
                "description": "Time frame stored in the time_frame column (e.g. 1, 5, 60, 1D). Bare minute counts such as '30' are normalized to '30m'."
            },
            "limit": {
                "type": "integer",
                "minimum": 1,
                "maximum": 1000,
                "default": 200,
                "description": "Maximum number of rows to return (1-1000)."
            },
            "exchange": {
                "type": "string",
                "description": "Optional exchange filter when multiple venues store the same symbol."
            },
            "start_timestamp": {
                "type": "string",
                "description": "Inclusive lower bound in 'YYYY-MM-DD HH:MM:SS' format."
            },
            "end_timestamp": {
                "type": "string",
                "description": "Inclusive upper bound in 'YYYY-MM-DD HH:MM:SS' format."
            }
        },
        "required": ["symbol", "time_frame"]
    })
}

/// Tool catalogue returned by `tools/list`.
pub fn list() -> Value {
    let dataset = |name: &str, description: &str| {
        json!({
            "name": name,
            "description": description,
            "inputSchema": dataset_input_schema(),
        })
    };
    json!({
        "tools": [
            dataset("get_candles", "Fetch OHLCV candles for the given symbol/resolution, oldest first."),
            dataset(
                "get_volume_footprint",
                "Fetch volume footprint rows (POC/VAH/VAL, volume delta, levels, totals and diffs), oldest first."
            ),
            dataset("get_cvd", "Fetch cumulative volume delta (CVD) candles for the given symbol/resolution, oldest first."),
            dataset("get_ema", "Fetch EMA 20/50/100/200 values for the given symbol/resolution, oldest first."),
            {
                "name": "get_current_date",
                "description": "Return today's date as YYYY-MM-DD.",
                "inputSchema": { "type": "object", "properties": {} }
            },
            {
                "name": "compare_dates",
                "description": "Compare a requested date with the current date; returns past, today or future.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "requested_date": { "type": "string", "description": "Date to classify (YYYY-MM-DD)." },
                        "current_date": { "type": "string", "description": "Reference date (YYYY-MM-DD)." }
                    },
                    "required": ["requested_date", "current_date"]
                }
            }
        ]
    })
}

#[derive(Debug, Deserialize)]
struct CompareDatesArgs {
    requested_date: String,
    current_date: String,
}

/// Invoke tool `name`. `None` means the tool does not exist.
pub async fn call(state: &Arc<AppState>, name: &str, arguments: Value) -> Option<ToolOutcome> {
    let arguments = if arguments.is_null() { json!({}) } else { arguments };

    if let Some(kind) = dataset_for_tool(name) {
        let request: QueryRequest = match serde_json::from_value(arguments) {
            Ok(r) => r,
            Err(e) => return Some(ToolOutcome::Failed(QueryError::Validation(e.to_string()).to_string())),
        };
        let outcome = match state.query(kind, request).await {
            Ok(Ok(envelope)) => match serde_json::to_value(&envelope) {
                Ok(v) => ToolOutcome::Ok(v),
                Err(e) => ToolOutcome::Failed(format!("internal_error: {e}")),
            },
            Ok(Err(e)) => ToolOutcome::Failed(e.to_string()),
            Err(e) => ToolOutcome::Failed(e.to_string()),
        };
        return Some(outcome);
    }

    let outcome = match name {
        "get_current_date" => ToolOutcome::Ok(Value::String(dates::current_date())),
        "compare_dates" => match serde_json::from_value::<CompareDatesArgs>(arguments) {
            Ok(args) => ToolOutcome::Ok(Value::String(
                dates::compare_dates(&args.requested_date, &args.current_date).to_string(),
            )),
            Err(e) => ToolOutcome::Failed(QueryError::Validation(e.to_string()).to_string()),
        },
        _ => return None,
    };
    Some(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{candle_row, stub_state};

    #[test]
    fn catalogue_lists_all_tools() {
        let names: Vec<String> = list()["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["get_candles", "get_volume_footprint", "get_cvd", "get_ema", "get_current_date", "compare_dates"]
        );
        assert_eq!(list()["tools"][0]["inputSchema"]["required"], json!(["symbol", "time_frame"]));
    }

    #[tokio::test]
    async fn dataset_tool_returns_envelope() {
        let state = stub_state(vec![candle_row("2024-01-01 00:00:00", 1.0)], false);
        let out = call(&state, "get_ema", json!({"symbol": "BTC", "time_frame": "5", "limit": 5}))
            .await
            .unwrap();
        let ToolOutcome::Ok(v) = out.clone() else { panic!("expected success, got {out:?}") };
        assert_eq!(v["count"], json!(1));
        assert_eq!(v["ema"][0]["close"], json!(1.0));
    }

    #[tokio::test]
    async fn validation_and_store_failures_are_distinguished() {
        let ok_state = stub_state(vec![], false);
        let out = call(&ok_state, "get_candles", json!({"symbol": "BTC", "time_frame": "5", "limit": 5000}))
            .await
            .unwrap();
        assert!(matches!(&out, ToolOutcome::Failed(m) if m.starts_with("validation_error:")), "{out:?}");

        let out = call(&ok_state, "get_candles", json!({"symbol": "BTC", "time_frame": "5", "limit": "ten"}))
            .await
            .unwrap();
        assert!(matches!(&out, ToolOutcome::Failed(m) if m.starts_with("validation_error:")), "{out:?}");

        let bad_state = stub_state(vec![], true);
        let out = call(&bad_state, "get_cvd", json!({"symbol": "BTC", "time_frame": "5"}))
            .await
            .unwrap();
        assert_eq!(out, ToolOutcome::Failed("store_error: disk I/O error".into()));
    }

    #[tokio::test]
    async fn date_tools() {
        let state = stub_state(vec![], false);
        let out = call(
            &state,
            "compare_dates",
            json!({"requested_date": "2020-01-01", "current_date": "2024-01-01"}),
        )
        .await
        .unwrap();
        assert_eq!(out, ToolOutcome::Ok(json!("past")));

        let out = call(&state, "get_current_date", Value::Null).await.unwrap();
        assert!(matches!(out, ToolOutcome::Ok(Value::String(_))));

        let out = call(&state, "compare_dates", json!({"requested_date": "2020-01-01"})).await.unwrap();
        assert!(matches!(out, ToolOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn unknown_tool_is_none() {
        let state = stub_state(vec![], false);
        assert!(call(&state, "drop_tables", json!({})).await.is_none());
    }

    #[test]
    fn outcome_wrapping() {
        let ok = ToolOutcome::Ok(json!({"count": 0})).into_result();
        assert_eq!(ok["isError"], json!(false));
        assert_eq!(ok["content"][0]["text"], json!(r#"{"count":0}"#));
        assert_eq!(ok["structuredContent"]["count"], json!(0));

        let failed = ToolOutcome::Failed("store_error: x".into()).into_result();
        assert_eq!(failed["isError"], json!(true));
        assert!(failed.get("structuredContent").is_none());
    }
}
