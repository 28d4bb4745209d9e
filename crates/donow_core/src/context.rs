//! Session wiring: explicit store construction and teardown.
//!
//! # Responsibility
//! - Hold the one store/persister pair of an application session.
//! - Surface `NotInitialized` to consumers that query before the session
//!   is open or after it was torn down.
//!
//! # Invariants
//! - Teardown detaches every listener and flushes one final save.
//! - Opening an already-open context is a no-op; the running session
//!   wins.

use crate::persist::Persister;
use crate::store::{Store, StoreError, StoreResult};
use log::{info, warn};

/// Explicitly constructed session context; no ambient singleton exists.
/// Tests can hold several isolated contexts side by side.
#[derive(Default)]
pub struct StoreContext {
    session: Option<Session>,
}

struct Session {
    store: Store,
    persister: Persister,
}

impl StoreContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// Installs the session's store and persister.
    pub fn open(&mut self, store: Store, persister: Persister) {
        if self.session.is_some() {
            warn!("event=context_open module=context status=skipped reason=already_open");
            return;
        }
        self.session = Some(Session { store, persister });
        info!("event=context_open module=context status=ok");
    }

    /// Handle to the session store.
    ///
    /// # Errors
    /// - `StoreError::NotInitialized` before `open` or after `teardown`.
    pub fn store(&self) -> StoreResult<Store> {
        self.session
            .as_ref()
            .map(|session| session.store.clone())
            .ok_or(StoreError::NotInitialized)
    }

    /// State of the session persister, if the session is open.
    pub fn persister(&self) -> Option<&Persister> {
        self.session.as_ref().map(|session| &session.persister)
    }

    /// Ends the session: final save flush, then every listener detached.
    pub fn teardown(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        if let Err(err) = session.persister.stop() {
            warn!("event=context_teardown module=context status=flush_error error={err}");
        }
        session.store.clear_listeners();
        info!("event=context_teardown module=context status=ok");
    }
}
