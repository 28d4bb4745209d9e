//! Persistence lifecycle: auto-load, auto-save, teardown.
//!
//! # Responsibility
//! - Load one snapshot per session and seed defaults when storage is
//!   absent, empty or corrupt.
//! - Keep storage in sync with the store through change subscriptions.
//! - Report backend failures without ever breaking the in-memory store.
//!
//! # Invariants
//! - State machine is `Idle -> Loading -> Ready`; auto-save is active only
//!   in `Ready`.
//! - At most one load per session; duplicate calls are no-ops.
//! - Saves are sequenced: a write observed in flight delays, never drops,
//!   the next one (last-writer-wins).

use crate::store::{ListenerId, Snapshot, Store};
use log::{error, info, warn};
use std::cell::RefCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::rc::Rc;
use std::time::Instant;

pub mod storage;

pub use storage::{
    MemorySnapshotStorage, SnapshotStorage, SqliteSnapshotStorage, StorageError, StorageResult,
};

pub type PersistResult<T> = Result<T, PersistError>;

/// Persistence failure, reported through [`Persister::last_error`] and the
/// lifecycle call that observed it. Never raised from store operations.
#[derive(Debug)]
pub enum PersistError {
    Storage(StorageError),
    Encode(serde_json::Error),
    Decode(serde_json::Error),
}

impl Display for PersistError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(err) => write!(f, "snapshot storage failed: {err}"),
            Self::Encode(err) => write!(f, "snapshot encoding failed: {err}"),
            Self::Decode(err) => write!(f, "snapshot decoding failed: {err}"),
        }
    }
}

impl Error for PersistError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            Self::Encode(err) => Some(err),
            Self::Decode(err) => Some(err),
        }
    }
}

impl From<StorageError> for PersistError {
    fn from(value: StorageError) -> Self {
        Self::Storage(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersisterState {
    Idle,
    Loading,
    Ready,
}

impl PersisterState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Ready => "ready",
        }
    }
}

/// Binds one store to one storage backend for the session's lifetime.
pub struct Persister {
    store: Store,
    shared: Rc<RefCell<PersisterShared>>,
    listeners: Vec<ListenerId>,
}

struct PersisterShared {
    storage: Box<dyn SnapshotStorage>,
    state: PersisterState,
    save_in_flight: bool,
    save_pending: bool,
    last_error: Option<String>,
}

impl Persister {
    pub fn new(store: &Store, storage: Box<dyn SnapshotStorage>) -> Self {
        Self {
            store: store.clone(),
            shared: Rc::new(RefCell::new(PersisterShared {
                storage,
                state: PersisterState::Idle,
                save_in_flight: false,
                save_pending: false,
                last_error: None,
            })),
            listeners: Vec::new(),
        }
    }

    pub fn state(&self) -> PersisterState {
        self.shared.borrow().state
    }

    /// Latest persistence failure, if any. The store itself is unaffected
    /// by whatever is reported here.
    pub fn last_error(&self) -> Option<String> {
        self.shared.borrow().last_error.clone()
    }

    /// Loads the persisted snapshot into the store, falling back to
    /// `defaults` when storage is absent, empty or corrupt.
    ///
    /// At most one load happens per session: calls while `Loading` or
    /// `Ready` are no-ops, guarding consumers that mount more than once.
    /// A fallback outcome is reported to the caller; the store is still
    /// seeded and the persister still reaches `Ready`.
    pub fn start_auto_load(&self, defaults: &Snapshot) -> PersistResult<()> {
        {
            let mut shared = self.shared.borrow_mut();
            if shared.state != PersisterState::Idle {
                info!(
                    "event=store_load module=persist status=skipped state={}",
                    shared.state.as_str()
                );
                return Ok(());
            }
            shared.state = PersisterState::Loading;
        }

        let started_at = Instant::now();
        let read = self.shared.borrow_mut().storage.read();

        let mut outcome: PersistResult<()> = Ok(());
        let snapshot = match read {
            Ok(Some(bytes)) if bytes.is_empty() => defaults.clone(),
            Ok(Some(bytes)) => match serde_json::from_slice::<Snapshot>(&bytes) {
                Ok(snapshot) if snapshot.is_empty() => defaults.clone(),
                Ok(snapshot) => snapshot,
                Err(err) => {
                    outcome = Err(PersistError::Decode(err));
                    defaults.clone()
                }
            },
            Ok(None) => defaults.clone(),
            Err(err) => {
                outcome = Err(PersistError::Storage(err));
                defaults.clone()
            }
        };

        self.store.set_content(snapshot);

        {
            let mut shared = self.shared.borrow_mut();
            shared.state = PersisterState::Ready;
            if let Err(err) = &outcome {
                shared.last_error = Some(err.to_string());
            }
        }

        match &outcome {
            Ok(()) => info!(
                "event=store_load module=persist status=ok duration_ms={}",
                started_at.elapsed().as_millis()
            ),
            Err(err) => warn!(
                "event=store_load module=persist status=fallback duration_ms={} error={err}",
                started_at.elapsed().as_millis()
            ),
        }
        outcome
    }

    /// Arms auto-save: every table or value mutation serializes the full
    /// snapshot to storage. Idempotent.
    pub fn start_auto_save(&mut self) {
        if !self.listeners.is_empty() {
            return;
        }
        for table in self.store.table_names() {
            let shared = Rc::clone(&self.shared);
            let id = self.store.add_table_listener(&table, move |store, _event| {
                let _ = save_with(&shared, store);
            });
            self.listeners.push(id);
        }
        for name in self.store.value_names() {
            let shared = Rc::clone(&self.shared);
            let id = self.store.add_value_listener(&name, move |store, _event| {
                let _ = save_with(&shared, store);
            });
            self.listeners.push(id);
        }
        info!(
            "event=auto_save module=persist status=armed listeners={}",
            self.listeners.len()
        );
    }

    /// Serializes the current snapshot to storage immediately. No-op
    /// before the session has loaded.
    pub fn save(&self) -> PersistResult<()> {
        save_with(&self.shared, &self.store)
    }

    /// Teardown: detaches the auto-save subscriptions and flushes one
    /// final save.
    pub fn stop(&mut self) -> PersistResult<()> {
        for id in self.listeners.drain(..) {
            self.store.remove_listener(id);
        }
        let result = save_with(&self.shared, &self.store);
        info!("event=persister_stop module=persist status=ok");
        result
    }
}

/// Sequenced save: one write at a time, a request landing mid-write marks
/// a pending flag and the latest snapshot is written again afterwards.
fn save_with(shared: &Rc<RefCell<PersisterShared>>, store: &Store) -> PersistResult<()> {
    {
        let mut guard = shared.borrow_mut();
        if guard.state != PersisterState::Ready {
            return Ok(());
        }
        if guard.save_in_flight {
            guard.save_pending = true;
            return Ok(());
        }
        guard.save_in_flight = true;
    }

    let mut outcome: PersistResult<()> = Ok(());
    loop {
        let result = encode_and_write(shared, store);
        let mut guard = shared.borrow_mut();
        match result {
            Ok(()) => {
                guard.last_error = None;
                outcome = Ok(());
            }
            Err(err) => {
                error!("event=store_save module=persist status=error error={err}");
                guard.last_error = Some(err.to_string());
                outcome = Err(err);
            }
        }
        if guard.save_pending {
            guard.save_pending = false;
            continue;
        }
        guard.save_in_flight = false;
        break;
    }
    outcome
}

fn encode_and_write(shared: &Rc<RefCell<PersisterShared>>, store: &Store) -> PersistResult<()> {
    let bytes = serde_json::to_vec(&store.snapshot()).map_err(PersistError::Encode)?;
    shared
        .borrow_mut()
        .storage
        .write(&bytes)
        .map_err(PersistError::Storage)
}
