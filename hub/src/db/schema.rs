use std::fmt;

// ── Dataset kinds ────────────────────────────────────────────────────────

/// One of the four logical table families served by the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetKind {
    Candle,
    Footprint,
    Cvd,
    Ema,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 4] = [Self::Candle, Self::Footprint, Self::Cvd, Self::Ema];

    /// Environment-variable prefix for the kind's schema overrides.
    pub fn env_prefix(self) -> &'static str {
        match self {
            Self::Candle => "CANDLE",
            Self::Footprint => "FOOTPRINT",
            Self::Cvd => "CVD",
            Self::Ema => "EMA",
        }
    }

    /// Key under which the records are placed in the response envelope.
    pub fn data_key(self) -> &'static str {
        match self {
            Self::Candle => "candles",
            Self::Footprint => "footprints",
            Self::Cvd => "cvd",
            Self::Ema => "ema",
        }
    }

    fn default_table(self) -> &'static str {
        match self {
            Self::Candle => "tradingview_candle_data",
            Self::Footprint => "tradingview_volume_footprint",
            Self::Cvd => "tradingview_candle_cvd",
            Self::Ema => "tradingview_ema",
        }
    }

    fn default_exchange_column(self) -> Option<&'static str> {
        match self {
            Self::Footprint => None,
            Self::Candle | Self::Cvd | Self::Ema => Some("exchange"),
        }
    }

    fn default_id_column(self) -> Option<&'static str> {
        match self {
            Self::Candle => None,
            Self::Footprint => Some("fp_id"),
            Self::Cvd => Some("cvd_id"),
            Self::Ema => Some("e_id"),
        }
    }

    /// Payload columns as `(source, output)` pairs, in SELECT order.
    fn default_value_columns(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Candle => &[
                ("open", "open"),
                ("high", "high"),
                ("low", "low"),
                ("close", "close"),
                ("volume", "volume"),
            ],
            Self::Footprint => &[
                ("poc", "poc"),
                ("vah", "vah"),
                ("val", "val"),
                ("volume_delta", "volume_delta"),
                ("levels", "levels"),
                ("total_fp_volume", "total_fp_volume"),
                ("volume_diff", "volume_diff"),
                ("created_at", "created_at"),
                ("updated_at", "updated_at"),
            ],
            Self::Cvd => &[
                ("open", "open"),
                ("high", "high"),
                ("low", "low"),
                ("close", "close"),
                ("ohlc_color", "ohlc_color"),
                ("wick_color", "wick_color"),
                ("border_color", "border_color"),
            ],
            Self::Ema => &[
                ("20_ema", "ema_20"),
                ("50_ema", "ema_50"),
                ("100_ema", "ema_100"),
                ("200_ema", "ema_200"),
                ("date_time", "date_time"),
            ],
        }
    }

    fn default_json_columns(self) -> &'static [&'static str] {
        match self {
            Self::Footprint => &["levels"],
            Self::Candle | Self::Cvd | Self::Ema => &[],
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Candle => "candle",
            Self::Footprint => "footprint",
            Self::Cvd => "cvd",
            Self::Ema => "ema",
        };
        f.write_str(name)
    }
}

// ── Mapping ──────────────────────────────────────────────────────────────

/// A selected payload column and the field name it is reported under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub source: String,
    pub output: String,
}

impl ColumnSpec {
    pub fn new(source: &str, output: &str) -> Self {
        Self {
            source: source.to_string(),
            output: output.to_string(),
        }
    }
}

/// Resolved table and column names for one dataset.
///
/// Immutable once resolved; shared read-only by every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetMapping {
    pub kind: DatasetKind,
    pub table: String,
    pub symbol_column: String,
    pub time_frame_column: String,
    pub timestamp_column: String,
    /// `None` disables exchange filtering.
    pub exchange_column: Option<String>,
    pub id_column: Option<String>,
    pub value_columns: Vec<ColumnSpec>,
    /// Output names whose text content is decoded as JSON.
    pub json_columns: Vec<String>,
    pub time_frame_aliases: bool,
}

impl DatasetMapping {
    /// Bare mapping with the identifying columns only: no id column, no
    /// payload columns, exchange filtering off, no time-frame aliasing.
    pub fn new(
        kind: DatasetKind,
        table: &str,
        symbol_column: &str,
        time_frame_column: &str,
        timestamp_column: &str,
    ) -> Self {
        Self {
            kind,
            table: table.to_string(),
            symbol_column: symbol_column.to_string(),
            time_frame_column: time_frame_column.to_string(),
            timestamp_column: timestamp_column.to_string(),
            exchange_column: None,
            id_column: None,
            value_columns: Vec::new(),
            json_columns: Vec::new(),
            time_frame_aliases: false,
        }
    }

    pub fn with_exchange_column(mut self, column: &str) -> Self {
        self.exchange_column = Some(column.to_string());
        self
    }

    pub fn with_value_columns(mut self, columns: Vec<ColumnSpec>) -> Self {
        self.value_columns = columns;
        self
    }

    pub fn with_json_columns<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.json_columns = columns.iter().map(|c| c.as_ref().to_string()).collect();
        self
    }

    pub fn is_json_column(&self, output: &str) -> bool {
        self.json_columns.iter().any(|c| c == output)
    }
}

// ── Overrides & resolution ───────────────────────────────────────────────

/// How configuration overrides the exchange column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ExchangeOverride {
    /// Not overridden: the kind's default applies.
    #[default]
    Inherit,
    /// Overridden with a blank value: filtering off.
    Disabled,
    Column(String),
}

/// Per-dataset overrides; `None` fields fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetOverrides {
    pub table: Option<String>,
    pub symbol_column: Option<String>,
    pub time_frame_column: Option<String>,
    pub timestamp_column: Option<String>,
    pub exchange_column: ExchangeOverride,
    pub json_columns: Option<Vec<String>>,
}

/// Resolve the mapping for `kind`. Never fails; identifiers in `overrides`
/// are validated when configuration is loaded.
pub fn resolve(kind: DatasetKind, overrides: &DatasetOverrides, time_frame_aliases: bool) -> DatasetMapping {
    let pick = |value: &Option<String>, default: &str| {
        value.clone().unwrap_or_else(|| default.to_string())
    };

    let exchange_column = match &overrides.exchange_column {
        ExchangeOverride::Inherit => kind.default_exchange_column(),
        ExchangeOverride::Disabled => None,
        ExchangeOverride::Column(name) => Some(name.as_str()),
    };

    let value_columns = kind
        .default_value_columns()
        .iter()
        .map(|(source, output)| ColumnSpec::new(source, output))
        .collect();

    let mut mapping = DatasetMapping::new(
        kind,
        &pick(&overrides.table, kind.default_table()),
        &pick(&overrides.symbol_column, "symbol"),
        &pick(&overrides.time_frame_column, "time_frame"),
        &pick(&overrides.timestamp_column, "timestamp"),
    )
    .with_value_columns(value_columns);

    mapping = match &overrides.json_columns {
        Some(columns) => mapping.with_json_columns(columns.as_slice()),
        None => mapping.with_json_columns(kind.default_json_columns()),
    };
    if let Some(column) = exchange_column {
        mapping = mapping.with_exchange_column(column);
    }
    mapping.id_column = kind.default_id_column().map(str::to_string);
    mapping.time_frame_aliases = time_frame_aliases;
    mapping
}

/// All four mappings, resolved once at startup.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    candle: DatasetMapping,
    footprint: DatasetMapping,
    cvd: DatasetMapping,
    ema: DatasetMapping,
}

impl SchemaRegistry {
    pub fn resolve(config: &crate::config::SchemaConfig) -> Self {
        let aliases = config.normalize_time_frames;
        let registry = Self {
            candle: resolve(DatasetKind::Candle, &config.candle, aliases),
            footprint: resolve(DatasetKind::Footprint, &config.footprint, aliases),
            cvd: resolve(DatasetKind::Cvd, &config.cvd, aliases),
            ema: resolve(DatasetKind::Ema, &config.ema, aliases),
        };
        for kind in DatasetKind::ALL {
            let m = registry.mapping(kind);
            tracing::info!(
                dataset = %kind,
                table = %m.table,
                exchange = m.exchange_column.as_deref().unwrap_or("<disabled>"),
                "schema mapping resolved"
            );
        }
        registry
    }

    pub fn mapping(&self, kind: DatasetKind) -> &DatasetMapping {
        match kind {
            DatasetKind::Candle => &self.candle,
            DatasetKind::Footprint => &self.footprint,
            DatasetKind::Cvd => &self.cvd,
            DatasetKind::Ema => &self.ema,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_kind() {
        let candle = resolve(DatasetKind::Candle, &DatasetOverrides::default(), true);
        assert_eq!(candle.table, "tradingview_candle_data");
        assert_eq!(candle.symbol_column, "symbol");
        assert_eq!(candle.time_frame_column, "time_frame");
        assert_eq!(candle.timestamp_column, "timestamp");
        assert_eq!(candle.exchange_column.as_deref(), Some("exchange"));
        assert!(candle.id_column.is_none());
        assert!(candle.json_columns.is_empty());

        let fp = resolve(DatasetKind::Footprint, &DatasetOverrides::default(), true);
        assert_eq!(fp.table, "tradingview_volume_footprint");
        assert!(fp.exchange_column.is_none());
        assert_eq!(fp.id_column.as_deref(), Some("fp_id"));
        assert!(fp.is_json_column("levels"));
    }

    #[test]
    fn ema_value_columns_are_renamed() {
        let ema = resolve(DatasetKind::Ema, &DatasetOverrides::default(), true);
        let outputs: Vec<&str> = ema.value_columns.iter().map(|c| c.output.as_str()).collect();
        assert_eq!(outputs, vec!["ema_20", "ema_50", "ema_100", "ema_200", "date_time"]);
        assert_eq!(ema.value_columns[0].source, "20_ema");
    }

    #[test]
    fn exchange_override_distinguishes_blank_from_absent() {
        let disabled = DatasetOverrides {
            exchange_column: ExchangeOverride::Disabled,
            ..Default::default()
        };
        assert!(resolve(DatasetKind::Cvd, &disabled, true).exchange_column.is_none());

        let inherit = DatasetOverrides::default();
        assert_eq!(
            resolve(DatasetKind::Cvd, &inherit, true).exchange_column.as_deref(),
            Some("exchange")
        );

        let venue = DatasetOverrides {
            exchange_column: ExchangeOverride::Column("venue".into()),
            ..Default::default()
        };
        assert_eq!(
            resolve(DatasetKind::Footprint, &venue, true).exchange_column.as_deref(),
            Some("venue")
        );
    }

    #[test]
    fn table_and_column_overrides_apply() {
        let o = DatasetOverrides {
            table: Some("bars".into()),
            symbol_column: Some("sym".into()),
            time_frame_column: Some("tf".into()),
            timestamp_column: Some("ts".into()),
            json_columns: Some(vec![]),
            ..Default::default()
        };
        let m = resolve(DatasetKind::Footprint, &o, false);
        assert_eq!(m.table, "bars");
        assert_eq!(m.symbol_column, "sym");
        assert_eq!(m.time_frame_column, "tf");
        assert_eq!(m.timestamp_column, "ts");
        assert!(!m.is_json_column("levels"));
        assert!(!m.time_frame_aliases);
    }
}
