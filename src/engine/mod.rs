mod dedup;
mod error;
mod mutations;
pub mod overlap;
mod queries;
mod report;
mod validation;

pub use dedup::exact_duplicates;
pub use error::EngineError;
pub use report::daily_counts;
pub use validation::{NewRecord, RecordDraft};

use std::io;
use std::sync::Arc;

use chrono::FixedOffset;
use tracing::info;

use crate::compactor;
use crate::config::EngineConfig;
use crate::history::HistoryHub;
use crate::repository::{PersonDirectory, Repository};
use crate::store::InMemoryStore;

/// Host-facing facade over a repository and a person directory.
pub struct Engine {
    repo: Arc<dyn Repository>,
    people: Arc<dyn PersonDirectory>,
    report_offset: FixedOffset,
}

impl Engine {
    pub fn new(repo: Arc<dyn Repository>, people: Arc<dyn PersonDirectory>) -> Self {
        Self {
            repo,
            people,
            report_offset: EngineConfig::default().report_offset,
        }
    }

    /// Offset used to cut timestamps into calendar days for daily counts.
    pub fn with_report_offset(mut self, offset: FixedOffset) -> Self {
        self.report_offset = offset;
        self
    }

    /// Build an engine on the reference store described by `config`. With a
    /// data dir the store is WAL-backed and a compactor task is spawned, so
    /// this must run inside a tokio runtime.
    pub fn open(
        config: &EngineConfig,
        people: Arc<dyn PersonDirectory>,
    ) -> io::Result<(Self, Arc<InMemoryStore>)> {
        let history = Arc::new(HistoryHub::new());
        let store = match config.wal_path() {
            Some(path) => {
                if let Some(dir) = &config.data_dir {
                    std::fs::create_dir_all(dir)?;
                }
                let store = Arc::new(InMemoryStore::open(&path, history)?);
                let compactor_store = store.clone();
                let threshold = config.compact_threshold;
                tokio::spawn(async move {
                    compactor::run_compactor(compactor_store, threshold).await;
                });
                info!(wal = %path.display(), records = store.record_count(), "opened record store");
                store
            }
            None => {
                info!("opened in-memory record store");
                Arc::new(InMemoryStore::new(history))
            }
        };
        let engine = Self::new(store.clone(), people).with_report_offset(config.report_offset);
        Ok((engine, store))
    }
}
