//! Terminal effects of a payment outcome.
//!
//! The dispatcher does not deduplicate on its own: callers reach it only after
//! winning a [`Claim`](crate::coordinator::Claim), so each branch runs at most
//! once per payment attempt.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{Config, EngineTimings};
use crate::coordinator::Reconciler;
use crate::models::{Locale, LocalizedMessage, PaymentSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

/// A toast shown to the user, already resolved to one language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
    pub reference: String,
}

/// Follow-up offered after a confirmed return-URL payment: set up recurring
/// billing with the authorization the gateway handed back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetupPrompt {
    pub reference: String,
    pub store_id: Option<String>,
    pub plan_id: Option<String>,
    pub authorization_id: Option<String>,
    pub amount: Option<f64>,
    pub currency: Option<String>,
}

/// What the embedding application does on the engine's behalf.
#[async_trait]
pub trait HostEffects: Send + Sync {
    /// Show a localized toast.
    fn notify(&self, notice: Notice);

    /// Re-fetch subscription and store state from the backend.
    async fn refresh_state(&self, store_id: Option<&str>);

    /// Full reload of the application state.
    fn reload(&self);

    fn navigate(&self, path: &str);

    /// Replace the visible URL without navigating.
    fn replace_url(&self, url: &str);

    /// Open the post-payment setup modal.
    fn present_setup(&self, prompt: SetupPrompt);
}

pub struct EffectDispatcher {
    host: Arc<dyn HostEffects>,
    reconciler: Arc<Reconciler>,
    locale: Locale,
    success_delay: Duration,
    failure_delay: Duration,
    retry_path: String,
}

impl EffectDispatcher {
    pub fn new(
        host: Arc<dyn HostEffects>,
        reconciler: Arc<Reconciler>,
        locale: Locale,
        timings: &EngineTimings,
        retry_path: impl Into<String>,
    ) -> Self {
        Self {
            host,
            reconciler,
            locale,
            success_delay: timings.success_delay,
            failure_delay: timings.failure_delay,
            retry_path: retry_path.into(),
        }
    }

    pub fn from_config(
        host: Arc<dyn HostEffects>,
        reconciler: Arc<Reconciler>,
        config: &Config,
    ) -> Self {
        Self::new(
            host,
            reconciler,
            config.locale,
            &config.timings,
            config.retry_path.clone(),
        )
    }

    pub fn host(&self) -> &Arc<dyn HostEffects> {
        &self.host
    }

    fn notice(
        &self,
        kind: NoticeKind,
        reference: &str,
        message: LocalizedMessage,
        fallback: LocalizedMessage,
    ) -> Notice {
        let message = message.or(fallback);
        Notice {
            kind,
            text: message.resolve(self.locale).unwrap_or_default().to_string(),
            reference: reference.to_string(),
        }
    }

    /// Success found by the poller: notify, refresh, then reload unless a
    /// result modal currently owns the screen.
    pub async fn succeed_polling(&self, session: &PaymentSession, message: LocalizedMessage) {
        self.host.notify(self.notice(
            NoticeKind::Success,
            &session.reference,
            message,
            LocalizedMessage::payment_succeeded(),
        ));
        self.host.refresh_state(Some(&session.store_id)).await;

        tokio::time::sleep(self.success_delay).await;

        if self.reconciler.gate_reload() {
            tracing::info!(reference = %session.reference, "Reloading after confirmed payment");
            self.host.reload();
        } else {
            tracing::info!(
                reference = %session.reference,
                "Result modal open, deferring reload until it is dismissed"
            );
        }
    }

    /// Success found on the return URL: notify, refresh, then offer setup.
    pub async fn succeed_return(&self, prompt: SetupPrompt, message: LocalizedMessage) {
        self.host.notify(self.notice(
            NoticeKind::Success,
            &prompt.reference,
            message,
            LocalizedMessage::payment_succeeded(),
        ));
        self.host.refresh_state(prompt.store_id.as_deref()).await;

        tokio::time::sleep(self.success_delay).await;

        self.host.present_setup(prompt);
    }

    /// Show the setup modal for a payment another channel already announced.
    pub fn offer_setup(&self, prompt: SetupPrompt) {
        tracing::info!(reference = %prompt.reference, "Offering setup for payment settled elsewhere");
        self.host.present_setup(prompt);
    }

    /// Declined or cancelled payment: notify, then send the user to retry.
    pub async fn fail(&self, reference: &str, message: LocalizedMessage) {
        self.host.notify(self.notice(
            NoticeKind::Error,
            reference,
            message,
            LocalizedMessage::payment_failed(),
        ));

        tokio::time::sleep(self.failure_delay).await;

        tracing::info!(%reference, path = %self.retry_path, "Redirecting after failed payment");
        self.host.navigate(&self.retry_path);
    }

    /// The setup modal was dismissed: drop the token and run any reload the
    /// poller held back.
    pub fn release_modal(&self) {
        if self.reconciler.dismiss_modal() {
            tracing::info!("Running reload deferred by result modal");
            self.host.reload();
        }
    }
}

impl std::fmt::Debug for EffectDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectDispatcher")
            .field("locale", &self.locale)
            .field("success_delay", &self.success_delay)
            .field("failure_delay", &self.failure_delay)
            .field("retry_path", &self.retry_path)
            .finish()
    }
}
