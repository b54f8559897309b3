use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::debug;
use ulid::Ulid;

use crate::history::HistoryHub;
use crate::model::*;
use crate::repository::{OwnerScope, PersonDirectory, RecordFilter, Repository, RepositoryError, SpanRelation};
use crate::wal::Wal;

pub type SharedOwnerState = Arc<RwLock<OwnerState>>;

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break, // channel empty, flush batch
                    }
                }

                metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
                let flush_start = std::time::Instant::now();
                let result = flush_batch(&mut wal, &batch);
                metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                    .record(flush_start.elapsed().as_secs_f64());
                respond_batch(batch, &result);

                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush so partially buffered bytes don't leak into the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn respond_batch(batch: Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            let result = wal.append_buffered(&event).and_then(|()| wal.flush_sync());
            let _ = response.send(result);
        }
    }
}

// ── Store ────────────────────────────────────────────────

/// Reference repository: every owner's records in memory behind a per-owner
/// lock, optionally backed by a WAL.
pub struct InMemoryStore {
    owners: DashMap<PersonRef, SharedOwnerState>,
    /// Reverse lookup: record id → owner
    record_to_owner: DashMap<Ulid, PersonRef>,
    next_seq: AtomicU64,
    wal_tx: Option<mpsc::Sender<WalCommand>>,
    history: Arc<HistoryHub>,
    /// Held shared by every owner scope, exclusively by compaction.
    write_gate: Arc<RwLock<()>>,
}

impl InMemoryStore {
    /// Memory-only store. Writes are durable for the lifetime of the process.
    pub fn new(history: Arc<HistoryHub>) -> Self {
        Self {
            owners: DashMap::new(),
            record_to_owner: DashMap::new(),
            next_seq: AtomicU64::new(1),
            wal_tx: None,
            history,
            write_gate: Arc::new(RwLock::new(())),
        }
    }

    /// WAL-backed store. Replays `wal_path` and spawns the group-commit
    /// writer, so this must run inside a tokio runtime.
    pub fn open(wal_path: &Path, history: Arc<HistoryHub>) -> io::Result<Self> {
        let events = Wal::replay(wal_path)?;
        let wal = Wal::open(wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let mut store = Self::new(history);
        store.wal_tx = Some(wal_tx);

        // We're the sole owner of these Arcs, so try_write always succeeds.
        // Never use blocking_write here: this may run inside an async context.
        for event in &events {
            let rs = store.state_for(event.owner());
            let mut guard = rs
                .try_write()
                .map_err(|_| io::Error::other("replay: owner state contended"))?;
            store.apply(&mut guard, event);
        }
        debug!(events = events.len(), path = %wal_path.display(), "replayed WAL");

        Ok(store)
    }

    pub fn history(&self) -> &Arc<HistoryHub> {
        &self.history
    }

    pub fn record_count(&self) -> usize {
        self.record_to_owner.len()
    }

    pub fn owner_ids(&self) -> Vec<PersonRef> {
        self.owners.iter().map(|e| *e.key()).collect()
    }

    fn state_for(&self, owner: PersonRef) -> SharedOwnerState {
        self.owners
            .entry(owner)
            .or_insert_with(|| Arc::new(RwLock::new(OwnerState::new(owner))))
            .value()
            .clone()
    }

    fn apply(&self, rs: &mut OwnerState, event: &Event) {
        match event {
            Event::RecordInserted { record } => {
                self.next_seq.fetch_max(record.seq + 1, Ordering::SeqCst);
                self.record_to_owner.insert(record.id, record.owner);
                rs.insert_record(record.clone());
            }
            Event::StatusChanged { id, to, .. } => {
                rs.set_status(id, *to);
            }
        }
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), RepositoryError> {
        let Some(wal_tx) = &self.wal_tx else {
            return Ok(());
        };
        let (tx, rx) = oneshot::channel();
        wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| RepositoryError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| RepositoryError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| RepositoryError::Wal(e.to_string()))
    }

    /// WAL-append + apply + publish in one call.
    async fn persist_and_apply(&self, rs: &mut OwnerState, event: Event) -> Result<(), RepositoryError> {
        self.wal_append(&event).await?;
        self.apply(rs, &event);
        self.history.publish(&event);
        Ok(())
    }

    /// Rewrite the WAL with one `RecordInserted` per record, carrying its
    /// current status. Waits for in-flight owner scopes and blocks new ones.
    pub async fn compact_wal(&self) -> Result<(), RepositoryError> {
        let Some(wal_tx) = &self.wal_tx else {
            return Ok(());
        };
        let _gate = self.write_gate.write().await;

        let states: Vec<SharedOwnerState> = self.owners.iter().map(|e| e.value().clone()).collect();
        let mut events = Vec::with_capacity(self.record_to_owner.len());
        for rs in states {
            let guard = rs.read().await;
            events.extend(
                guard
                    .records
                    .iter()
                    .map(|record| Event::RecordInserted { record: record.clone() }),
            );
        }
        // Replay must hand out the same ordinals.
        events.sort_by_key(|e| match e {
            Event::RecordInserted { record } => record.seq,
            Event::StatusChanged { .. } => 0,
        });
        debug!(events = events.len(), "compacting WAL");

        let (tx, rx) = oneshot::channel();
        wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| RepositoryError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| RepositoryError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| RepositoryError::Wal(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let Some(wal_tx) = &self.wal_tx else {
            return 0;
        };
        let (tx, rx) = oneshot::channel();
        if wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl Repository for InMemoryStore {
    async fn owner_scope(&self, owner: PersonRef) -> Result<Box<dyn OwnerScope + '_>, RepositoryError> {
        let gate = self.write_gate.clone().read_owned().await;
        let guard = self.state_for(owner).write_owned().await;
        Ok(Box::new(StoreScope {
            store: self,
            owner,
            guard,
            _gate: gate,
        }))
    }

    async fn query(&self, filter: &RecordFilter) -> Result<Vec<AvailabilityRecord>, RepositoryError> {
        let states: Vec<SharedOwnerState> = match filter.owner {
            Some(owner) => self.owners.get(&owner).map(|e| e.value().clone()).into_iter().collect(),
            None => self.owners.iter().map(|e| e.value().clone()).collect(),
        };

        let mut hits = Vec::new();
        for rs in states {
            let guard = rs.read().await;
            match &filter.relation {
                Some((SpanRelation::Overlapping | SpanRelation::ContainedIn, window)) => {
                    hits.extend(guard.overlapping(window).filter(|r| filter.matches(r)).cloned());
                }
                Some((SpanRelation::Covering | SpanRelation::Containing, window)) => {
                    hits.extend(guard.covering(window).filter(|r| filter.matches(r)).cloned());
                }
                _ => hits.extend(guard.records.iter().filter(|r| filter.matches(r)).cloned()),
            }
        }
        hits.sort_by_key(|r| (r.span.start, r.seq));
        Ok(hits)
    }

    async fn get(&self, id: Ulid) -> Result<Option<AvailabilityRecord>, RepositoryError> {
        let Some(owner) = self.record_to_owner.get(&id).map(|e| *e.value()) else {
            return Ok(None);
        };
        let Some(rs) = self.owners.get(&owner).map(|e| e.value().clone()) else {
            return Ok(None);
        };
        let guard: OwnedRwLockReadGuard<OwnerState> = rs.read_owned().await;
        Ok(guard.get(&id).cloned())
    }
}

struct StoreScope<'a> {
    store: &'a InMemoryStore,
    owner: PersonRef,
    guard: OwnedRwLockWriteGuard<OwnerState>,
    _gate: OwnedRwLockReadGuard<()>,
}

#[async_trait]
impl OwnerScope for StoreScope<'_> {
    fn owner(&self) -> PersonRef {
        self.owner
    }

    async fn covering(&mut self, window: &Span) -> Result<Vec<AvailabilityRecord>, RepositoryError> {
        Ok(self.guard.covering(window).cloned().collect())
    }

    async fn insert(&mut self, mut record: AvailabilityRecord) -> Result<AvailabilityRecord, RepositoryError> {
        if record.owner != self.owner {
            return Err(RepositoryError::Unavailable(format!(
                "record owner {} outside scope {}",
                record.owner, self.owner
            )));
        }
        record.seq = self.store.next_seq.fetch_add(1, Ordering::SeqCst);
        let event = Event::RecordInserted { record: record.clone() };
        self.store.persist_and_apply(&mut self.guard, event).await?;
        Ok(record)
    }

    async fn set_status(&mut self, id: Ulid, status: Status) -> Result<Status, RepositoryError> {
        let from = self.guard.get(&id).ok_or(RepositoryError::NotFound(id))?.status;
        if from == status {
            return Ok(from);
        }
        let event = Event::StatusChanged {
            id,
            owner: self.owner,
            from,
            to: status,
        };
        self.store.persist_and_apply(&mut self.guard, event).await?;
        Ok(from)
    }
}

// ── People ───────────────────────────────────────────────

/// Person directory held in memory. Unknown people count as inactive.
#[derive(Default)]
pub struct InMemoryPeople {
    people: DashMap<PersonRef, PersonStatus>,
}

impl InMemoryPeople {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, person: PersonRef, status: PersonStatus) {
        self.people.insert(person, status);
    }
}

#[async_trait]
impl PersonDirectory for InMemoryPeople {
    async fn status(&self, person: PersonRef) -> Result<PersonStatus, RepositoryError> {
        Ok(self
            .people
            .get(&person)
            .map(|e| *e.value())
            .unwrap_or(PersonStatus::Inactive))
    }
}
