use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::{overlap, EngineError};

/// Unix milliseconds.
pub type Ms = i64;

/// Reference to the person owning a record.
pub type PersonRef = Ulid;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Checked constructor: `start` must be strictly before `end`.
    pub fn try_new(start: Ms, end: Ms) -> Result<Self, EngineError> {
        if start >= end {
            return Err(EngineError::Chronology { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        overlap::overlaps(self, other)
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        overlap::contains(self, other)
    }

    pub fn same_bounds(&self, other: &Span) -> bool {
        self.start == other.start && self.end == other.end
    }
}

/// What a person reported for a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Available,
    Unavailable,
    Cancelled,
}

impl Status {
    pub const ALL: [Status; 3] = [Status::Available, Status::Unavailable, Status::Cancelled];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Available => "Available",
            Status::Unavailable => "Unavailable",
            Status::Cancelled => "Cancelled",
        }
    }

    /// Available or Unavailable: a report that has not been withdrawn.
    pub fn is_live(&self) -> bool {
        !matches!(self, Status::Cancelled)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| EngineError::Validation(format!("unknown status: {s:?}")))
    }
}

/// Person status as reported by the person directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PersonStatus {
    Active,
    Inactive,
}

/// One reported span for one person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityRecord {
    pub id: Ulid,
    pub owner: PersonRef,
    pub status: Status,
    pub span: Span,
    pub description: Option<String>,
    /// Insertion ordinal assigned by the repository. Lower is older.
    pub seq: u64,
}

impl AvailabilityRecord {
    /// Event-level check with inclusive endpoints: true when `event` sticks
    /// out of this record on one side while still touching it.
    pub fn partially_available_for(&self, event: &Span) -> bool {
        if event.end <= self.span.end && event.start >= self.span.start {
            return false;
        }
        (event.end >= self.span.end && self.span.end >= event.start)
            || (event.end >= self.span.start && self.span.start >= event.start)
    }

    pub fn describe(&self) -> String {
        format!(
            "Recorded {}\n start {}\n end {}\n description {}",
            self.status,
            format_ms(self.span.start),
            format_ms(self.span.end),
            self.description.as_deref().unwrap_or(""),
        )
    }
}

fn format_ms(ms: Ms) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ms.to_string())
}

/// All records of one owner, sorted by `span.start`.
#[derive(Debug, Clone)]
pub struct OwnerState {
    pub owner: PersonRef,
    pub records: Vec<AvailabilityRecord>,
}

impl OwnerState {
    pub fn new(owner: PersonRef) -> Self {
        Self {
            owner,
            records: Vec::new(),
        }
    }

    /// Insert record maintaining sort order by span.start.
    pub fn insert_record(&mut self, record: AvailabilityRecord) {
        let pos = self
            .records
            .partition_point(|r| r.span.start <= record.span.start);
        self.records.insert(pos, record);
    }

    pub fn get(&self, id: &Ulid) -> Option<&AvailabilityRecord> {
        self.records.iter().find(|r| r.id == *id)
    }

    /// Set the status of a record, returning the previous one.
    pub fn set_status(&mut self, id: &Ulid, status: Status) -> Option<Status> {
        let record = self.records.iter_mut().find(|r| r.id == *id)?;
        Some(std::mem::replace(&mut record.status, status))
    }

    /// Records whose span fully covers `window`.
    /// Uses binary search to skip records starting after `window.start`.
    pub fn covering(&self, window: &Span) -> impl Iterator<Item = &AvailabilityRecord> {
        let right_bound = self
            .records
            .partition_point(|r| r.span.start <= window.start);
        self.records[..right_bound]
            .iter()
            .filter(move |r| overlap::fully_covers(&r.span, window))
    }

    /// Records whose span overlaps `window`.
    pub fn overlapping(&self, window: &Span) -> impl Iterator<Item = &AvailabilityRecord> {
        // Everything at index >= right_bound starts at or after window.end → can't overlap.
        let right_bound = self
            .records
            .partition_point(|r| r.span.start < window.end);
        self.records[..right_bound]
            .iter()
            .filter(move |r| r.span.end > window.start)
    }
}

/// Store mutations. This is the WAL record format and
/// the change-history payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RecordInserted {
        record: AvailabilityRecord,
    },
    StatusChanged {
        id: Ulid,
        owner: PersonRef,
        from: Status,
        to: Status,
    },
}

impl Event {
    pub fn owner(&self) -> PersonRef {
        match self {
            Event::RecordInserted { record } => record.owner,
            Event::StatusChanged { owner, .. } => *owner,
        }
    }
}

/// Number of Available records covering one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(start: Ms, end: Ms) -> AvailabilityRecord {
        AvailabilityRecord {
            id: Ulid::new(),
            owner: Ulid::new(),
            status: Status::Available,
            span: Span::new(start, end),
            description: None,
            seq: 0,
        }
    }

    #[test]
    fn span_basics() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration_ms(), 100);
        assert!(s.contains_instant(100));
        assert!(s.contains_instant(199));
        assert!(!s.contains_instant(200)); // half-open
    }

    #[test]
    fn span_try_new_rejects_inverted_and_empty() {
        assert!(matches!(
            Span::try_new(200, 100),
            Err(EngineError::Chronology { start: 200, end: 100 })
        ));
        assert!(matches!(Span::try_new(100, 100), Err(EngineError::Chronology { .. })));
        assert_eq!(Span::try_new(100, 101).unwrap(), Span::new(100, 101));
    }

    #[test]
    fn status_parse() {
        assert_eq!("Available".parse::<Status>().unwrap(), Status::Available);
        assert_eq!("Unavailable".parse::<Status>().unwrap(), Status::Unavailable);
        assert_eq!("Cancelled".parse::<Status>().unwrap(), Status::Cancelled);
        assert!(matches!("available".parse::<Status>(), Err(EngineError::Validation(_))));
        assert!(matches!("Maybe".parse::<Status>(), Err(EngineError::Validation(_))));
    }

    #[test]
    fn record_ordering() {
        let mut os = OwnerState::new(Ulid::new());
        os.insert_record(record(300, 400));
        os.insert_record(record(100, 200));
        os.insert_record(record(200, 300));
        assert_eq!(os.records[0].span.start, 100);
        assert_eq!(os.records[1].span.start, 200);
        assert_eq!(os.records[2].span.start, 300);
    }

    #[test]
    fn equal_starts_keep_insertion_order() {
        let mut os = OwnerState::new(Ulid::new());
        let first = record(100, 200);
        let second = record(100, 300);
        os.insert_record(first.clone());
        os.insert_record(second.clone());
        assert_eq!(os.records[0].id, first.id);
        assert_eq!(os.records[1].id, second.id);
    }

    #[test]
    fn set_status_returns_previous() {
        let mut os = OwnerState::new(Ulid::new());
        let r = record(100, 200);
        let id = r.id;
        os.insert_record(r);
        assert_eq!(os.set_status(&id, Status::Cancelled), Some(Status::Available));
        assert_eq!(os.get(&id).unwrap().status, Status::Cancelled);
        assert_eq!(os.set_status(&Ulid::new(), Status::Cancelled), None);
    }

    #[test]
    fn covering_skips_later_starts() {
        let mut os = OwnerState::new(Ulid::new());
        os.insert_record(record(0, 1000));
        os.insert_record(record(100, 200));
        os.insert_record(record(150, 900)); // starts after window.start
        os.insert_record(record(50, 120)); // ends before window.end
        let window = Span::new(100, 200);
        let hits: Vec<_> = os.covering(&window).map(|r| r.span).collect();
        assert_eq!(hits, vec![Span::new(0, 1000), Span::new(100, 200)]);
    }

    #[test]
    fn overlapping_adjacent_not_included() {
        let mut os = OwnerState::new(Ulid::new());
        os.insert_record(record(100, 200));
        let hits: Vec<_> = os.overlapping(&Span::new(200, 300)).collect();
        assert!(hits.is_empty());
        let hits: Vec<_> = os.overlapping(&Span::new(199, 300)).collect();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn partially_available_for_event() {
        let r = record(100, 200);
        // Event inside the record
        assert!(!r.partially_available_for(&Span::new(120, 180)));
        assert!(!r.partially_available_for(&Span::new(100, 200)));
        // Event hangs off the end
        assert!(r.partially_available_for(&Span::new(150, 250)));
        // Event hangs off the start
        assert!(r.partially_available_for(&Span::new(50, 150)));
        // Event covers the record entirely
        assert!(r.partially_available_for(&Span::new(50, 250)));
        // Touching endpoints count (inclusive)
        assert!(r.partially_available_for(&Span::new(200, 300)));
        // Disjoint
        assert!(!r.partially_available_for(&Span::new(300, 400)));
    }

    #[test]
    fn describe_mentions_status_and_description() {
        let mut r = record(0, 3_600_000);
        r.description = Some("on call".into());
        let text = r.describe();
        assert!(text.starts_with("Recorded Available"));
        assert!(text.contains("1970-01-01T00:00:00+00:00"));
        assert!(text.contains("1970-01-01T01:00:00+00:00"));
        assert!(text.ends_with("description on call"));
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::RecordInserted { record: record(0, 10) };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
