//! Background polling of the status oracle.
//!
//! One scheduler drives at most one loop at a time. The loop queries the
//! oracle immediately, then once per interval, until a terminal outcome, an
//! explicit "stop" from the oracle, the safety timeout, or [`PollScheduler::stop`].

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};

use crate::config::EngineTimings;
use crate::coordinator::{Channel, Claim, Reconciler};
use crate::effects::EffectDispatcher;
use crate::models::{OutcomeStatus, PaymentSession, PollOutcome, PollStatus};
use crate::oracle::StatusOracle;
use crate::session::SessionRepository;

/// Observable state of the scheduler, published on every change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollSnapshot {
    pub status: PollStatus,
    /// Queries issued by the current (or last) loop
    pub attempts: u32,
    pub reference: Option<String>,
    pub last_outcome: Option<PollOutcome>,
}

/// Why a loop ended.
#[derive(Debug)]
enum Verdict {
    Succeeded(PollOutcome),
    Failed(PollOutcome),
    /// Oracle said to stop without a terminal status
    Halted,
    TimedOut,
    /// Session cleared by the other channel or another tab
    ResolvedElsewhere,
    /// `stop()` or a newer `start()` took over
    Superseded,
}

enum Tick {
    Outcome(PollOutcome),
    Resolved,
}

#[derive(Default)]
struct LoopState {
    running: bool,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

struct Inner {
    oracle: Arc<dyn StatusOracle>,
    repo: Arc<dyn SessionRepository>,
    reconciler: Arc<Reconciler>,
    dispatcher: Arc<EffectDispatcher>,
    timings: EngineTimings,
    state: Mutex<LoopState>,
    snapshot: watch::Sender<PollSnapshot>,
}

pub struct PollScheduler {
    inner: Arc<Inner>,
}

impl PollScheduler {
    pub fn new(
        oracle: Arc<dyn StatusOracle>,
        reconciler: Arc<Reconciler>,
        dispatcher: Arc<EffectDispatcher>,
        timings: EngineTimings,
    ) -> Self {
        let (snapshot, _) = watch::channel(PollSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                oracle,
                repo: reconciler.repository().clone(),
                reconciler,
                dispatcher,
                timings,
                state: Mutex::new(LoopState::default()),
                snapshot,
            }),
        }
    }

    /// Begin polling for `session`.
    ///
    /// A no-op returning `false` while a loop is already running. Otherwise
    /// the session is persisted (so a reload can resume it) and the first
    /// query goes out immediately. Must be called inside a Tokio runtime.
    pub fn start(&self, session: PaymentSession) -> bool {
        self.launch(session, true)
    }

    /// Resume polling for a persisted, unexpired session.
    ///
    /// The stored record is not written back: if another tab settles the
    /// payment in the meantime, the first tick finds it gone and stops.
    /// Returns whether a loop was started by this call.
    pub fn resume(&self) -> bool {
        match self.inner.repo.read() {
            Some(session) => {
                tracing::info!(reference = %session.reference, "Resuming payment session");
                self.launch(session, false)
            }
            None => false,
        }
    }

    fn launch(&self, session: PaymentSession, persist: bool) -> bool {
        let mut state = self.inner.lock_state();
        if state.running {
            tracing::debug!(reference = %session.reference, "Polling already active, ignoring start");
            return false;
        }

        state.generation += 1;
        state.running = true;
        let generation = state.generation;

        if persist {
            self.inner.repo.save(&session);
        }
        self.inner.snapshot.send_replace(PollSnapshot {
            status: PollStatus::Polling,
            attempts: 0,
            reference: Some(session.reference.clone()),
            last_outcome: None,
        });

        tracing::info!(
            reference = %session.reference,
            store_id = %session.store_id,
            interval_secs = self.inner.timings.poll_interval.as_secs(),
            max_secs = self.inner.timings.poll_max_duration.as_secs(),
            "Starting payment status polling"
        );

        let inner = self.inner.clone();
        let watchdog = self.inner.clone();
        let reference = session.reference.clone();
        state.task = Some(tokio::spawn(
            AssertUnwindSafe(async move { inner.run(session, generation).await })
                .catch_unwind()
                .map(move |result| {
                    if let Err(panic) = result {
                        let panic_msg = panic
                            .downcast_ref::<&str>()
                            .map(|s| s.to_string())
                            .or_else(|| panic.downcast_ref::<String>().cloned())
                            .unwrap_or_else(|| "unknown panic".to_string());
                        tracing::error!(%reference, "Payment polling task panicked: {}", panic_msg);
                        watchdog.abandon(generation);
                    }
                }),
        ));

        true
    }

    /// Cancel the loop and its safety timeout. Safe from any state, any number
    /// of times, including when never started.
    pub fn stop(&self) {
        let task = {
            let mut state = self.inner.lock_state();
            state.generation += 1;
            state.running = false;
            state.task.take()
        };

        if let Some(task) = task {
            task.abort();
            tracing::debug!("Payment polling stopped");
        }

        self.inner.leave_polling();
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock_state().running
    }

    pub fn status(&self) -> PollStatus {
        self.inner.snapshot.borrow().status
    }

    pub fn attempts(&self) -> u32 {
        self.inner.snapshot.borrow().attempts
    }

    pub fn snapshot(&self) -> PollSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot changes, e.g. to refresh dependent views.
    pub fn subscribe(&self) -> watch::Receiver<PollSnapshot> {
        self.inner.snapshot.subscribe()
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for PollScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollScheduler")
            .field("timings", &self.inner.timings)
            .field("snapshot", &*self.inner.snapshot.borrow())
            .finish()
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, LoopState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn run(self: Arc<Self>, session: PaymentSession, generation: u64) {
        let deadline = tokio::time::sleep(self.timings.poll_max_duration);
        tokio::pin!(deadline);

        let mut ticker = tokio::time::interval(self.timings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let verdict = loop {
            tokio::select! {
                biased;
                _ = &mut deadline => break Verdict::TimedOut,
                tick = self.next_tick(&mut ticker, &session) => {
                    let outcome = match tick {
                        Tick::Outcome(outcome) => outcome,
                        Tick::Resolved => break Verdict::ResolvedElsewhere,
                    };
                    if let Some(verdict) = self.record(generation, &session, outcome) {
                        break verdict;
                    }
                }
            }
        };

        self.finish(generation, &session, verdict).await;
    }

    async fn next_tick(&self, ticker: &mut Interval, session: &PaymentSession) -> Tick {
        ticker.tick().await;

        let reference = &session.reference;
        if self.reconciler.is_settled(reference) || !self.repo.holds(reference) {
            return Tick::Resolved;
        }

        Tick::Outcome(
            self.oracle
                .query(&session.store_id, reference, &session.plan_id)
                .await,
        )
    }

    /// Fold one outcome into the snapshot and decide whether the loop ends.
    fn record(&self, generation: u64, session: &PaymentSession, outcome: PollOutcome) -> Option<Verdict> {
        if self.lock_state().generation != generation {
            return Some(Verdict::Superseded);
        }

        let mut attempt = 0;
        self.snapshot.send_modify(|snap| {
            snap.attempts += 1;
            snap.last_outcome = Some(outcome.clone());
            attempt = snap.attempts;
        });

        tracing::debug!(
            reference = %session.reference,
            attempt,
            status = outcome.status.as_str(),
            should_continue = outcome.should_continue_polling,
            "Payment status polled"
        );

        match outcome.status {
            OutcomeStatus::Success(_) => Some(Verdict::Succeeded(outcome)),
            OutcomeStatus::Failed(_) => Some(Verdict::Failed(outcome)),
            OutcomeStatus::Pending | OutcomeStatus::Error if !outcome.should_continue_polling => {
                Some(Verdict::Halted)
            }
            OutcomeStatus::Pending | OutcomeStatus::Error => None,
        }
    }

    async fn finish(&self, generation: u64, session: &PaymentSession, verdict: Verdict) {
        {
            let mut state = self.lock_state();
            if state.generation != generation {
                return;
            }
            state.running = false;
            // Detach: effects below must survive a later stop().
            state.task = None;
        }

        let reference = &session.reference;
        match verdict {
            Verdict::Succeeded(outcome) => {
                self.set_status(PollStatus::Success);
                if self.reconciler.try_claim(Channel::Polling, reference) == Claim::Won {
                    self.dispatcher.succeed_polling(session, outcome.message).await;
                }
            }
            Verdict::Failed(outcome) => {
                self.set_status(PollStatus::Failed);
                if self.reconciler.try_claim(Channel::Polling, reference) == Claim::Won {
                    self.dispatcher.fail(reference, outcome.message).await;
                }
            }
            Verdict::Halted => {
                tracing::info!(%reference, "Oracle asked to stop polling without a verdict");
                self.set_status(PollStatus::Idle);
            }
            Verdict::TimedOut => {
                tracing::info!(
                    %reference,
                    max_secs = self.timings.poll_max_duration.as_secs(),
                    "Payment polling timed out, giving up for now"
                );
                self.set_status(PollStatus::Idle);
            }
            Verdict::ResolvedElsewhere => {
                tracing::info!(%reference, "Payment settled by another channel, stopping poll");
                self.set_status(PollStatus::Idle);
            }
            Verdict::Superseded => {}
        }
    }

    /// Release a loop that died without reaching `finish`, so it can be
    /// started again.
    fn abandon(&self, generation: u64) {
        {
            let mut state = self.lock_state();
            if state.generation != generation {
                return;
            }
            state.running = false;
            state.task = None;
        }
        self.leave_polling();
    }

    fn leave_polling(&self) {
        self.snapshot.send_if_modified(|snap| {
            if snap.status == PollStatus::Polling {
                snap.status = PollStatus::Idle;
                true
            } else {
                false
            }
        });
    }

    fn set_status(&self, status: PollStatus) {
        self.snapshot.send_modify(|snap| snap.status = status);
    }
}
