//! Collaborator seams: where records live and who is active.

use async_trait::async_trait;
use thiserror::Error;
use ulid::Ulid;

use crate::engine::overlap;
use crate::model::{AvailabilityRecord, Ms, PersonRef, PersonStatus, Span, Status};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("record not found: {0}")]
    NotFound(Ulid),

    #[error("WAL error: {0}")]
    Wal(String),

    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// How a stored span must relate to a query window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanRelation {
    /// Intersects the window.
    Overlapping,
    /// Contains the window.
    Containing,
    /// Lies within the window.
    ContainedIn,
    /// Covers at least the whole window, inclusive at both ends.
    Covering,
    /// Exactly one endpoint strictly inside the window.
    PartiallyOverlapping,
}

impl SpanRelation {
    pub fn matches(&self, span: &Span, window: &Span) -> bool {
        match self {
            SpanRelation::Overlapping => overlap::overlaps(span, window),
            SpanRelation::Containing => overlap::contains(span, window),
            SpanRelation::ContainedIn => overlap::contained_in(span, window),
            SpanRelation::Covering => overlap::fully_covers(span, window),
            SpanRelation::PartiallyOverlapping => overlap::partially_overlaps(span, window),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SpanRelation::Overlapping => "overlapping",
            SpanRelation::Containing => "containing",
            SpanRelation::ContainedIn => "contained_in",
            SpanRelation::Covering => "covering",
            SpanRelation::PartiallyOverlapping => "partially_overlapping",
        }
    }
}

/// Conjunction of optional conditions. An empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub relation: Option<(SpanRelation, Span)>,
    pub statuses: Option<Vec<Status>>,
    pub owner: Option<PersonRef>,
    /// Only records starting at or before this instant.
    pub starts_at_or_before: Option<Ms>,
}

impl RecordFilter {
    pub fn related(relation: SpanRelation, window: Span) -> Self {
        Self {
            relation: Some((relation, window)),
            ..Self::default()
        }
    }

    pub fn with_statuses(statuses: &[Status]) -> Self {
        Self {
            statuses: Some(statuses.to_vec()),
            ..Self::default()
        }
    }

    pub fn owned_by(mut self, owner: PersonRef) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn matches(&self, record: &AvailabilityRecord) -> bool {
        if let Some((relation, window)) = &self.relation
            && !relation.matches(&record.span, window) {
                return false;
            }
        if let Some(statuses) = &self.statuses
            && !statuses.contains(&record.status) {
                return false;
            }
        if let Some(owner) = self.owner
            && record.owner != owner {
                return false;
            }
        if let Some(cutoff) = self.starts_at_or_before
            && record.span.start > cutoff {
                return false;
            }
        true
    }
}

/// Record store. Implementations must make every write durable before
/// returning and serialize all writes for one owner through `owner_scope`.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Open an exclusive scope over one owner's records. Other scopes for the
    /// same owner wait until this one is dropped.
    async fn owner_scope(&self, owner: PersonRef) -> Result<Box<dyn OwnerScope + '_>, RepositoryError>;

    /// Records matching `filter`, ordered by span start.
    async fn query(&self, filter: &RecordFilter) -> Result<Vec<AvailabilityRecord>, RepositoryError>;

    async fn get(&self, id: Ulid) -> Result<Option<AvailabilityRecord>, RepositoryError>;
}

/// Read-then-write access to a single owner's records, held atomically.
#[async_trait]
pub trait OwnerScope: Send {
    fn owner(&self) -> PersonRef;

    /// The owner's records whose span fully covers `window`.
    async fn covering(&mut self, window: &Span) -> Result<Vec<AvailabilityRecord>, RepositoryError>;

    /// Persist a new record. The repository assigns `seq`; the stored record
    /// is returned.
    async fn insert(&mut self, record: AvailabilityRecord) -> Result<AvailabilityRecord, RepositoryError>;

    /// Transition a record's status, returning the previous one.
    async fn set_status(&mut self, id: Ulid, status: Status) -> Result<Status, RepositoryError>;
}

/// Status lookup for record owners.
#[async_trait]
pub trait PersonDirectory: Send + Sync {
    async fn status(&self, person: PersonRef) -> Result<PersonStatus, RepositoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(owner: PersonRef, status: Status, start: Ms, end: Ms) -> AvailabilityRecord {
        AvailabilityRecord {
            id: Ulid::new(),
            owner,
            status,
            span: Span::new(start, end),
            description: None,
            seq: 0,
        }
    }

    #[test]
    fn empty_filter_matches_all() {
        let r = record(Ulid::new(), Status::Cancelled, 0, 10);
        assert!(RecordFilter::default().matches(&r));
    }

    #[test]
    fn filter_conditions_are_conjunctive() {
        let owner = Ulid::new();
        let r = record(owner, Status::Available, 100, 200);

        let f = RecordFilter::related(SpanRelation::Overlapping, Span::new(150, 300)).owned_by(owner);
        assert!(f.matches(&r));

        let f = f.owned_by(Ulid::new());
        assert!(!f.matches(&r));

        let mut f = RecordFilter::with_statuses(&[Status::Unavailable]);
        assert!(!f.matches(&r));
        f.statuses = Some(vec![Status::Available, Status::Unavailable]);
        assert!(f.matches(&r));

        f.starts_at_or_before = Some(99);
        assert!(!f.matches(&r));
        f.starts_at_or_before = Some(100);
        assert!(f.matches(&r));
    }

    #[test]
    fn relation_dispatch() {
        let window = Span::new(100, 200);
        let wide = Span::new(50, 250);
        let inner = Span::new(120, 180);
        let tail = Span::new(150, 250);

        assert!(SpanRelation::Containing.matches(&wide, &window));
        assert!(!SpanRelation::Containing.matches(&inner, &window));
        assert!(SpanRelation::ContainedIn.matches(&inner, &window));
        assert!(SpanRelation::Covering.matches(&wide, &window));
        assert!(SpanRelation::PartiallyOverlapping.matches(&tail, &window));
        assert!(!SpanRelation::PartiallyOverlapping.matches(&wide, &window));
        assert!(SpanRelation::Overlapping.matches(&tail, &window));
    }
}
