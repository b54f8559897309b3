use tracing::{debug, info};
use ulid::Ulid;

use crate::model::*;
use crate::repository::RepositoryError;

use super::dedup::cancel_duplicates;
use super::validation::validate_fields;
use super::{Engine, EngineError, NewRecord, RecordDraft};

impl Engine {
    /// Record a span for `owner` and cancel the owner's older exact-span
    /// duplicates.
    ///
    /// Validation and chronology errors are raised before anything is
    /// written. A `DuplicateResolution` error means the new record is
    /// committed; call [`Engine::resolve_duplicates`] to retry.
    pub async fn insert(
        &self,
        owner: PersonRef,
        status: Status,
        span: Span,
        description: Option<String>,
    ) -> Result<Ulid, EngineError> {
        let new = validate_fields(Some(owner), Some(status), Some(span.start), Some(span.end), description)
            .inspect_err(reject_metric)?;
        self.insert_new(new).await
    }

    /// Same as [`Engine::insert`] for an unvalidated boundary request.
    pub async fn insert_draft(&self, draft: RecordDraft) -> Result<Ulid, EngineError> {
        let new = draft.validate().inspect_err(reject_metric)?;
        self.insert_new(new).await
    }

    async fn insert_new(&self, new: NewRecord) -> Result<Ulid, EngineError> {
        let mut scope = self.repo.owner_scope(new.owner).await?;

        // Read the candidates before writing: a failed lookup leaves nothing behind.
        let candidates = scope.covering(&new.span).await?;

        let record = scope
            .insert(AvailabilityRecord {
                id: Ulid::new(),
                owner: new.owner,
                status: new.status,
                span: new.span,
                description: new.description,
                seq: 0,
            })
            .await?;
        metrics::counter!(
            crate::observability::RECORDS_INSERTED_TOTAL,
            "status" => crate::observability::status_label(record.status)
        )
        .increment(1);
        info!(
            record = %record.id,
            owner = %record.owner,
            status = %record.status,
            start = record.span.start,
            end = record.span.end,
            "inserted record"
        );

        cancel_duplicates(scope.as_mut(), &record, &candidates).await?;
        Ok(record.id)
    }

    /// Re-run duplicate resolution for an inserted record. Returns the ids
    /// cancelled. A record that is itself cancelled has nothing to resolve.
    pub async fn resolve_duplicates(&self, id: Ulid) -> Result<Vec<Ulid>, EngineError> {
        let known = self.repo.get(id).await?.ok_or(EngineError::NotFound(id))?;
        let mut scope = self.repo.owner_scope(known.owner).await?;

        let candidates = scope.covering(&known.span).await?;
        // Re-read under the scope; the record may have changed since `get`.
        let Some(record) = candidates.iter().find(|r| r.id == id).cloned() else {
            return Err(EngineError::NotFound(id));
        };
        if !record.status.is_live() {
            debug!(record = %id, "record cancelled, nothing to resolve");
            return Ok(Vec::new());
        }
        cancel_duplicates(scope.as_mut(), &record, &candidates).await
    }

    /// Plain status transition on an existing record. Returns the previous
    /// status.
    pub async fn set_status(&self, id: Ulid, status: Status) -> Result<Status, EngineError> {
        let record = self.repo.get(id).await?.ok_or(EngineError::NotFound(id))?;
        let mut scope = self.repo.owner_scope(record.owner).await?;
        let from = scope.set_status(id, status).await.map_err(|e| match e {
            RepositoryError::NotFound(id) => EngineError::NotFound(id),
            other => other.into(),
        })?;
        info!(record = %id, %from, to = %status, "status changed");
        Ok(from)
    }
}

fn reject_metric(e: &EngineError) {
    let reason = match e {
        EngineError::Chronology { .. } => "chronology",
        _ => "validation",
    };
    metrics::counter!(crate::observability::INSERTS_REJECTED_TOTAL, "reason" => reason).increment(1);
    debug!("insert rejected: {e}");
}
