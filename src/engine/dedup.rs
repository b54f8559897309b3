use tracing::{info, warn};
use ulid::Ulid;

use crate::model::*;
use crate::repository::OwnerScope;

use super::EngineError;

/// Older live records among `candidates` with exactly `new`'s span.
///
/// `candidates` is expected to come from a coverage query on `new.span`; the
/// exact-bounds check is applied regardless of how loose that query was.
pub fn exact_duplicates<'a>(
    candidates: &'a [AvailabilityRecord],
    new: &'a AvailabilityRecord,
) -> impl Iterator<Item = &'a AvailabilityRecord> {
    candidates.iter().filter(move |a| {
        a.id != new.id
            && a.owner == new.owner
            && a.seq < new.seq
            && a.status.is_live()
            && a.span.same_bounds(&new.span)
    })
}

/// Cancel every exact duplicate of `new`. Attempts all of them; failures are
/// collected into one `DuplicateResolution` error.
pub(super) async fn cancel_duplicates<'s>(
    scope: &mut (dyn OwnerScope + 's),
    new: &AvailabilityRecord,
    candidates: &[AvailabilityRecord],
) -> Result<Vec<Ulid>, EngineError> {
    let mut cancelled = Vec::new();
    let mut failed = Vec::new();

    for dup in exact_duplicates(candidates, new) {
        match scope.set_status(dup.id, Status::Cancelled).await {
            Ok(_) => {
                metrics::counter!(crate::observability::DUPLICATES_CANCELLED_TOTAL).increment(1);
                info!(record = %dup.id, superseded_by = %new.id, owner = %new.owner, "cancelled duplicate");
                cancelled.push(dup.id);
            }
            Err(e) => {
                metrics::counter!(crate::observability::DUPLICATE_RESOLUTION_FAILURES_TOTAL).increment(1);
                warn!(record = %dup.id, superseded_by = %new.id, "failed to cancel duplicate: {e}");
                failed.push((dup.id, e.to_string()));
            }
        }
    }

    if !failed.is_empty() {
        return Err(EngineError::DuplicateResolution {
            record_id: new.id,
            failed,
        });
    }
    Ok(cancelled)
}
