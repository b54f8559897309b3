use std::path::PathBuf;

use chrono::{FixedOffset, Offset, Utc};

/// Host-level settings, read from `SLOTWISE_*` environment variables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding `records.wal`. `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
    /// WAL appends before the compactor rewrites the log.
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    /// Offset used to cut timestamps into calendar days for daily counts.
    pub report_offset: FixedOffset,
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            compact_threshold: 1000,
            metrics_port: None,
            report_offset: utc(),
            log_filter: "slotwise=info".into(),
        }
    }
}

fn utc() -> FixedOffset {
    Utc.fix()
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let report_offset = lookup("SLOTWISE_REPORT_UTC_OFFSET_MINUTES")
            .and_then(|s| s.parse::<i32>().ok())
            .and_then(|minutes| minutes.checked_mul(60))
            .and_then(FixedOffset::east_opt)
            .unwrap_or(defaults.report_offset);

        Self {
            data_dir: lookup("SLOTWISE_DATA_DIR").filter(|s| !s.is_empty()).map(PathBuf::from),
            compact_threshold: lookup("SLOTWISE_COMPACT_THRESHOLD")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.compact_threshold),
            metrics_port: lookup("SLOTWISE_METRICS_PORT").and_then(|s| s.parse().ok()),
            report_offset,
            log_filter: lookup("SLOTWISE_LOG").unwrap_or(defaults.log_filter),
        }
    }

    pub fn wal_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join("records.wal"))
    }
}
