//! Per-chain embedded database: the `events` and `chain_state` tables from
//! §6, one RocksDB file per chain opened at
//! `<node_home>/databases/<sanitized_chain_id>.db`.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, DB};
use shared_types::{ChainState, Event, EventStatus};

use crate::error::StoreError;

const CF_EVENTS: &str = "events";
const CF_CHAIN_STATE: &str = "chain_state";
const CHAIN_STATE_KEY: &[u8] = b"watermark";

/// A single chain's durable database: events keyed by `event_id`, plus the
/// one-row `chain_state` watermark table.
///
/// Writes that must appear atomic to concurrent readers (insert-if-not-exists,
/// compare-and-swap status updates) serialize through `write_lock` -- RocksDB
/// itself gives per-key atomicity but not read-modify-write semantics, so the
/// mutex is what makes those operations race-free within this process.
pub struct ChainStore {
    db: DB,
    write_lock: Mutex<()>,
}

impl ChainStore {
    /// Opens (or creates) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = vec![
            ColumnFamilyDescriptor::new(CF_EVENTS, Options::default()),
            ColumnFamilyDescriptor::new(CF_CHAIN_STATE, Options::default()),
        ];
        let db = DB::open_cf_descriptors(&opts, path, cfs)?;
        Ok(Self { db, write_lock: Mutex::new(()) })
    }

    fn events_cf(&self) -> &rocksdb::ColumnFamily {
        self.db.cf_handle(CF_EVENTS).expect("events column family always present")
    }

    fn chain_state_cf(&self) -> &rocksdb::ColumnFamily {
        self.db.cf_handle(CF_CHAIN_STATE).expect("chain_state column family always present")
    }

    fn decode_event(key: &[u8], bytes: &[u8]) -> Result<Event, StoreError> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::Corrupt {
            key: String::from_utf8_lossy(key).into_owned(),
            source: e.to_string(),
        })
    }

    /// Fetches a single event by id.
    pub fn get(&self, event_id: &str) -> Result<Option<Event>, StoreError> {
        match self.db.get_cf(self.events_cf(), event_id.as_bytes())? {
            Some(bytes) => Ok(Some(Self::decode_event(event_id.as_bytes(), &bytes)?)),
            None => Ok(None),
        }
    }

    /// Inserts `event` iff no record exists for its id. Returns `true` if the
    /// record was newly inserted, `false` if it already existed (both are
    /// success outcomes -- see the idempotent-ingest invariant in §8).
    pub fn insert_if_not_exists(&self, event: &Event) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock();
        if self.db.get_cf(self.events_cf(), event.event_id.as_bytes())?.is_some() {
            return Ok(false);
        }
        let bytes = serde_json::to_vec(event).expect("Event always serializes");
        self.db.put_cf(self.events_cf(), event.event_id.as_bytes(), bytes)?;
        Ok(true)
    }

    /// Applies `mutate` to the current record for `event_id` under the write
    /// lock and persists the result iff `mutate` returns `true`. This is the
    /// store's sole read-modify-write primitive; every status transition,
    /// rewind, and payload merge in the system goes through it so the
    /// "apply only if still valid" check and the write happen atomically
    /// with respect to other callers of this method.
    pub fn update<F>(&self, event_id: &str, mutate: F) -> Result<bool, StoreError>
    where
        F: FnOnce(&mut Event) -> bool,
    {
        let _guard = self.write_lock.lock();
        let Some(mut event) = self.get(event_id)? else { return Ok(false) };
        if !mutate(&mut event) {
            return Ok(false);
        }
        let bytes = serde_json::to_vec(&event).expect("Event always serializes");
        self.db.put_cf(self.events_cf(), event_id.as_bytes(), bytes)?;
        Ok(true)
    }

    /// Compare-and-swap a status transition: succeeds only if the event is
    /// currently `expected` and the transition is allowed by
    /// [`EventStatus::can_transition_to`].
    pub fn compare_and_swap_status(
        &self,
        event_id: &str,
        expected: EventStatus,
        next: EventStatus,
    ) -> Result<bool, StoreError> {
        self.update(event_id, |event| {
            if event.status != expected || !event.status.can_transition_to(next) {
                return false;
            }
            event.status = next;
            if next.is_terminal() {
                event.terminal_at = Some(now_unix());
            }
            true
        })
    }

    /// Deletes an event record. Used only by the cleaner on terminal events
    /// past their retention window.
    pub fn delete(&self, event_id: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        self.db.delete_cf(self.events_cf(), event_id.as_bytes())?;
        Ok(())
    }

    fn scan_events(&self) -> Result<Vec<Event>, StoreError> {
        let mut out = Vec::new();
        for item in self.db.iterator_cf(self.events_cf(), IteratorMode::Start) {
            let (key, value) = item?;
            out.push(Self::decode_event(&key, &value)?);
        }
        Ok(out)
    }

    /// The `N` oldest (by `block_height`) events in `status`, used by the
    /// confirmer (`Pending`, N=1000) and the broadcaster (`Signed`, N=100).
    pub fn oldest_by_status(&self, status: EventStatus, limit: usize) -> Result<Vec<Event>, StoreError> {
        let mut events: Vec<Event> =
            self.scan_events()?.into_iter().filter(|e| e.status == status).collect();
        events.sort_by_key(|e| e.block_height);
        events.truncate(limit);
        Ok(events)
    }

    /// Every event in one of the three terminal statuses whose `terminal_at`
    /// is at or before `cutoff_unix`, for the cleaner's retention sweep.
    pub fn terminal_older_than(&self, cutoff_unix: u64) -> Result<Vec<Event>, StoreError> {
        Ok(self
            .scan_events()?
            .into_iter()
            .filter(|e| e.status.is_terminal() && e.terminal_at.is_some_and(|t| t <= cutoff_unix))
            .collect())
    }

    /// Snapshot counts by status, for the `/metrics/chains` operational
    /// surface (§7.5).
    pub fn status_counts(&self) -> Result<StatusCounts, StoreError> {
        let mut counts = StatusCounts::default();
        for event in self.scan_events()? {
            match event.status {
                EventStatus::Pending => counts.pending += 1,
                EventStatus::Confirmed => counts.confirmed += 1,
                EventStatus::InProgress => counts.in_progress += 1,
                EventStatus::Signed => counts.signed += 1,
                EventStatus::Broadcasted => counts.broadcasted += 1,
                EventStatus::Completed | EventStatus::Reverted => {}
            }
        }
        Ok(counts)
    }

    /// Reads the current watermark, defaulting to `ChainState::default()`
    /// (i.e. `last_block = 0`) if no row has been written yet.
    pub fn chain_state(&self) -> Result<ChainState, StoreError> {
        match self.db.get_cf(self.chain_state_cf(), CHAIN_STATE_KEY)? {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
                key: "chain_state".into(),
                source: e.to_string(),
            }),
            None => Ok(ChainState::default()),
        }
    }

    /// Writes the watermark iff `new_block` is greater than the currently
    /// persisted value, preserving the monotone-watermark invariant (§8)
    /// even under concurrent or out-of-order callers.
    pub fn advance_watermark(&self, new_block: u64) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let current = self.chain_state()?;
        if new_block <= current.last_block {
            return Ok(());
        }
        let state = ChainState { last_block: new_block };
        let bytes = serde_json::to_vec(&state).expect("ChainState always serializes");
        self.db.put_cf(self.chain_state_cf(), CHAIN_STATE_KEY, bytes)?;
        Ok(())
    }
}

/// Per-status event counts, as exposed by `/metrics/chains`.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct StatusCounts {
    /// Number of events currently `Pending`.
    pub pending: u64,
    /// Number of events currently `Confirmed`.
    pub confirmed: u64,
    /// Number of events currently `InProgress`.
    pub in_progress: u64,
    /// Number of events currently `Signed`.
    pub signed: u64,
    /// Number of events currently `Broadcasted`.
    pub broadcasted: u64,
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Thread-safe handle, cheap to clone and share across the poller/confirmer/
/// cleaner tasks that all own the same chain's store.
pub type SharedChainStore = Arc<ChainStore>;
