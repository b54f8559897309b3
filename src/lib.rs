//! Per-person availability records over half-open time spans: overlap
//! queries, exact-span duplicate cancellation on insert, and daily counts of
//! available people.

pub mod compactor;
pub mod config;
pub mod engine;
pub mod history;
pub mod limits;
pub mod model;
pub mod observability;
pub mod repository;
pub mod store;
pub mod wal;

pub use config::EngineConfig;
pub use engine::{Engine, EngineError, NewRecord, RecordDraft};
pub use model::{AvailabilityRecord, DailyCount, Ms, PersonRef, PersonStatus, Span, Status};
pub use repository::{OwnerScope, PersonDirectory, RecordFilter, Repository, RepositoryError, SpanRelation};
pub use store::{InMemoryPeople, InMemoryStore};
