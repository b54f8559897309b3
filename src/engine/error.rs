use thiserror::Error;
use ulid::Ulid;

use crate::model::Ms;
use crate::repository::RepositoryError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("start {start} must be strictly before end {end}")]
    Chronology { start: Ms, end: Ms },

    /// The record was committed, but some older duplicates are still live.
    /// Re-run resolution with `Engine::resolve_duplicates(record_id)`.
    #[error("record {record_id} inserted but {} duplicate(s) could not be cancelled: {}", failed.len(), format_failures(failed))]
    DuplicateResolution {
        record_id: Ulid,
        failed: Vec<(Ulid, String)>,
    },

    #[error("not found: {0}")]
    NotFound(Ulid),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

fn format_failures(failed: &[(Ulid, String)]) -> String {
    failed
        .iter()
        .map(|(id, reason)| format!("{id} ({reason})"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl EngineError {
    /// True when the insert itself went through and only resolution failed.
    pub fn is_committed(&self) -> bool {
        matches!(self, EngineError::DuplicateResolution { .. })
    }
}
