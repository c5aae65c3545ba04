//! Reconciliation between the return-URL channel and the polling channel.
//!
//! Both channels may learn the outcome of the same payment. Whoever claims the
//! reference first applies the effects; the loser stays silent. A modal opened
//! by the return-URL channel also holds off the poller's automatic reload until
//! it is dismissed.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use strum::AsRefStr;

use crate::session::SessionRepository;

/// Which confirmation channel is asking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Channel {
    ReturnUrl,
    Polling,
}

/// Result of trying to settle a payment reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// This channel owns the outcome and must apply its effects
    Won,
    /// Someone else already settled it; do nothing
    AlreadyResolved,
}

#[derive(Debug, Default)]
struct ReconcilerState {
    settled: HashSet<String>,
    reload_deferred: bool,
}

pub struct Reconciler {
    repo: Arc<dyn SessionRepository>,
    state: Mutex<ReconcilerState>,
}

impl Reconciler {
    pub fn new(repo: Arc<dyn SessionRepository>) -> Self {
        Self {
            repo,
            state: Mutex::new(ReconcilerState::default()),
        }
    }

    pub fn repository(&self) -> &Arc<dyn SessionRepository> {
        &self.repo
    }

    /// Atomically settle `reference` on behalf of `channel`.
    ///
    /// The polling channel only wins if the stored session is still its own:
    /// an absent session means another tab or channel already resolved it.
    /// The return-URL channel may settle a payment this browser never stored.
    pub fn try_claim(&self, channel: Channel, reference: &str) -> Claim {
        let Ok(mut state) = self.state.lock() else {
            tracing::error!("Reconciler state poisoned, refusing claim");
            return Claim::AlreadyResolved;
        };

        if state.settled.contains(reference) {
            tracing::debug!(%reference, channel = channel.as_ref(), "Payment already settled in this session");
            return Claim::AlreadyResolved;
        }

        let took_session = self.repo.take(reference);
        if channel == Channel::Polling && !took_session {
            tracing::info!(%reference, "Stored session gone, payment resolved elsewhere");
            state.settled.insert(reference.to_string());
            return Claim::AlreadyResolved;
        }

        state.settled.insert(reference.to_string());
        tracing::info!(%reference, channel = channel.as_ref(), "Payment outcome claimed");
        Claim::Won
    }

    /// Whether `reference` has already been settled by this instance.
    pub fn is_settled(&self, reference: &str) -> bool {
        self.state
            .lock()
            .map(|s| s.settled.contains(reference))
            .unwrap_or(true)
    }

    /// Mark a result modal as authoritative. Must run before the modal shows.
    pub fn open_modal(&self, reference: &str) {
        self.repo.set_reconciliation_flag(Some(reference));
    }

    pub fn modal_open(&self) -> bool {
        self.repo.is_reconciliation_flag_set()
    }

    /// Decide whether an automatic reload may run now.
    ///
    /// While a modal holds the token the reload is recorded instead, to be run
    /// by [`Reconciler::dismiss_modal`].
    pub fn gate_reload(&self) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };

        if self.repo.is_reconciliation_flag_set() {
            state.reload_deferred = true;
            return false;
        }
        true
    }

    /// Release the modal token. Returns whether a deferred reload is now due.
    pub fn dismiss_modal(&self) -> bool {
        let Ok(mut state) = self.state.lock() else {
            self.repo.clear_reconciliation_flag();
            return false;
        };

        self.repo.clear_reconciliation_flag();
        std::mem::take(&mut state.reload_deferred)
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler").finish_non_exhaustive()
    }
}
