use std::collections::HashSet;
use std::time::Instant;

use futures::future::try_join_all;
use tracing::debug;
use ulid::Ulid;

use crate::model::*;
use crate::repository::{RecordFilter, SpanRelation};

use super::overlap::validate_window;
use super::{Engine, EngineError};

impl Engine {
    async fn query_related(&self, relation: SpanRelation, window: Span) -> Result<Vec<AvailabilityRecord>, EngineError> {
        validate_window(&window)?;
        self.run_query(relation.label(), &RecordFilter::related(relation, window)).await
    }

    async fn run_query(&self, label: &'static str, filter: &RecordFilter) -> Result<Vec<AvailabilityRecord>, EngineError> {
        let start = Instant::now();
        let records = self.repo.query(filter).await?;
        metrics::histogram!(crate::observability::QUERY_DURATION_SECONDS, "query" => label)
            .record(start.elapsed().as_secs_f64());
        debug!(query = label, hits = records.len(), "query");
        Ok(records)
    }

    /// Records whose span intersects `window`.
    pub async fn query_overlapping(&self, window: Span) -> Result<Vec<AvailabilityRecord>, EngineError> {
        self.query_related(SpanRelation::Overlapping, window).await
    }

    /// Records whose span contains `window`.
    pub async fn query_containing(&self, window: Span) -> Result<Vec<AvailabilityRecord>, EngineError> {
        self.query_related(SpanRelation::Containing, window).await
    }

    /// Records whose span lies within `window`.
    pub async fn query_contained_in(&self, window: Span) -> Result<Vec<AvailabilityRecord>, EngineError> {
        self.query_related(SpanRelation::ContainedIn, window).await
    }

    /// Records available for the whole of `window`.
    pub async fn query_covering(&self, window: Span) -> Result<Vec<AvailabilityRecord>, EngineError> {
        self.query_related(SpanRelation::Covering, window).await
    }

    /// Records with exactly one endpoint strictly inside `window`.
    pub async fn query_partially_overlapping(&self, window: Span) -> Result<Vec<AvailabilityRecord>, EngineError> {
        self.query_related(SpanRelation::PartiallyOverlapping, window).await
    }

    pub async fn query_available(&self) -> Result<Vec<AvailabilityRecord>, EngineError> {
        self.run_query("available", &RecordFilter::with_statuses(&[Status::Available]))
            .await
    }

    pub async fn query_unavailable(&self) -> Result<Vec<AvailabilityRecord>, EngineError> {
        self.run_query("unavailable", &RecordFilter::with_statuses(&[Status::Unavailable]))
            .await
    }

    /// Records starting at or before `now`.
    pub async fn query_in_the_past(&self, now: Ms) -> Result<Vec<AvailabilityRecord>, EngineError> {
        let filter = RecordFilter {
            starts_at_or_before: Some(now),
            ..RecordFilter::default()
        };
        self.run_query("in_the_past", &filter).await
    }

    /// Available or Unavailable records whose owner is Active.
    pub async fn query_active(&self) -> Result<Vec<AvailabilityRecord>, EngineError> {
        let live = self
            .run_query(
                "active",
                &RecordFilter::with_statuses(&[Status::Available, Status::Unavailable]),
            )
            .await?;

        let owners: HashSet<PersonRef> = live.iter().map(|r| r.owner).collect();
        let lookups = owners.into_iter().map(|owner| async move {
            let status = self.people.status(owner).await?;
            Ok::<_, EngineError>((owner, status))
        });
        let active: HashSet<PersonRef> = try_join_all(lookups)
            .await?
            .into_iter()
            .filter(|(_, status)| *status == PersonStatus::Active)
            .map(|(owner, _)| owner)
            .collect();

        Ok(live.into_iter().filter(|r| active.contains(&r.owner)).collect())
    }

    pub async fn get_record(&self, id: Ulid) -> Result<Option<AvailabilityRecord>, EngineError> {
        Ok(self.repo.get(id).await?)
    }

    /// Every record of one owner, any status, ordered by start.
    pub async fn records_for_owner(&self, owner: PersonRef) -> Result<Vec<AvailabilityRecord>, EngineError> {
        self.run_query("owner", &RecordFilter::default().owned_by(owner)).await
    }
}
