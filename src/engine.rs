//! Wiring of the confirmation channels around one durable store.

use std::sync::Arc;

use tokio::sync::watch;

use crate::config::Config;
use crate::coordinator::Reconciler;
use crate::effects::{EffectDispatcher, HostEffects};
use crate::error::Result;
use crate::models::PaymentSession;
use crate::oracle::{HttpStatusOracle, StatusOracle};
use crate::scheduler::{PollScheduler, PollSnapshot};
use crate::session::{SessionRepository, StoredSessionRepository};
use crate::storage::StorageAdapter;
use crate::verifier::{ReturnUrlVerifier, VerificationReport};

/// What happened when the application mounted.
#[derive(Debug, Clone, PartialEq)]
pub struct MountReport {
    /// Present when the URL carried gateway parameters
    pub verification: Option<VerificationReport>,
    /// Why the return URL could not be checked, if it could not
    pub verify_error: Option<String>,
    /// Whether a stored session restarted the poller
    pub resumed: bool,
}

/// Payment confirmation engine for one page instance.
///
/// # Example
/// ```rust,ignore
/// let engine = PaymentConfirmation::new(&Config::from_env(), storage, host)?;
///
/// // Every mount: check the return URL, then resume any stored session.
/// let report = engine.mount(&current_url).await;
///
/// // After redirecting to the gateway for a new attempt:
/// engine.begin(PaymentSession::new(reference, plan_id, store_id));
/// ```
pub struct PaymentConfirmation {
    repo: Arc<dyn SessionRepository>,
    dispatcher: Arc<EffectDispatcher>,
    verifier: ReturnUrlVerifier,
    scheduler: PollScheduler,
}

impl PaymentConfirmation {
    /// Build the engine against the storefront API named in `config`.
    pub fn new(
        config: &Config,
        storage: Arc<dyn StorageAdapter>,
        host: Arc<dyn HostEffects>,
    ) -> Result<Self> {
        let oracle = HttpStatusOracle::new(&config.api_url, config.bearer_token.clone())?;
        Ok(Self::with_oracle(config, storage, Arc::new(oracle), host))
    }

    pub fn with_oracle(
        config: &Config,
        storage: Arc<dyn StorageAdapter>,
        oracle: Arc<dyn StatusOracle>,
        host: Arc<dyn HostEffects>,
    ) -> Self {
        let repo: Arc<dyn SessionRepository> = Arc::new(StoredSessionRepository::new(
            storage,
            config.timings.session_max_age,
            config.timings.modal_token_ttl,
        ));
        let reconciler = Arc::new(Reconciler::new(repo.clone()));
        let dispatcher = Arc::new(EffectDispatcher::from_config(
            host,
            reconciler.clone(),
            config,
        ));
        let verifier = ReturnUrlVerifier::new(oracle.clone(), reconciler.clone(), dispatcher.clone());
        let scheduler = PollScheduler::new(oracle, reconciler, dispatcher.clone(), config.timings);

        Self {
            repo,
            dispatcher,
            verifier,
            scheduler,
        }
    }

    /// Start tracking a new payment attempt, abandoning any older one.
    pub fn begin(&self, session: PaymentSession) -> bool {
        self.scheduler.stop();
        self.scheduler.start(session)
    }

    /// Run on every application mount: verify a return URL if present, then
    /// resume polling for whatever session is still stored.
    ///
    /// The two steps are independent: a URL that cannot be checked is
    /// reported in the [`MountReport`] and polling still resumes.
    pub async fn mount(&self, current_url: &str) -> MountReport {
        let (verification, verify_error) = match self.verifier.verify_return(current_url).await {
            Ok(verification) => (verification, None),
            Err(e) => {
                tracing::warn!(url = %current_url, "Skipping return URL check: {}", e);
                (None, Some(e.to_string()))
            }
        };
        let resumed = self.scheduler.resume();
        MountReport {
            verification,
            verify_error,
            resumed,
        }
    }

    /// The user closed the post-payment setup modal.
    pub fn dismiss_setup(&self) {
        self.dispatcher.release_modal();
    }

    /// Teardown hook. Idempotent.
    pub fn shutdown(&self) {
        self.scheduler.stop();
    }

    pub fn snapshot(&self) -> PollSnapshot {
        self.scheduler.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollSnapshot> {
        self.scheduler.subscribe()
    }

    pub fn scheduler(&self) -> &PollScheduler {
        &self.scheduler
    }

    pub fn repository(&self) -> &Arc<dyn SessionRepository> {
        &self.repo
    }
}

impl std::fmt::Debug for PaymentConfirmation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentConfirmation")
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}
