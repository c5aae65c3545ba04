//! One-shot verification when the browser lands back from the gateway.

use std::sync::Arc;

use url::Url;

use crate::coordinator::{Channel, Claim, Reconciler};
use crate::effects::{EffectDispatcher, SetupPrompt};
use crate::error::Result;
use crate::models::{LocalizedMessage, VerifyPayload, VerifyStatus};
use crate::oracle::StatusOracle;

/// Query parameters a gateway may use to hand back the payment reference,
/// in order of precedence.
pub const REFERENCE_PARAMS: &[&str] = &[
    "reference",
    "ref",
    "tap_id",
    "charge_id",
    "payment_id",
    "paymentId",
];

/// Extra gateway echo parameters removed along with the reference.
const ECHO_PARAMS: &[&str] = &["status", "token"];

/// What the return-URL check found, for the caller to render.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationReport {
    pub reference: String,
    pub status: VerifyStatus,
    /// Raw gateway status, when the backend answered
    pub gateway_status: Option<String>,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub authorization_id: Option<String>,
    /// Current URL with the gateway parameters removed
    pub cleaned_url: String,
    /// Set for terminal outcomes: whether this channel applied the effects
    pub claim: Option<Claim>,
}

fn is_gateway_param(key: &str) -> bool {
    REFERENCE_PARAMS.contains(&key) || ECHO_PARAMS.contains(&key)
}

/// Find the gateway reference in `url`, if any recognized parameter carries one.
pub fn find_reference(url: &Url) -> Option<String> {
    REFERENCE_PARAMS.iter().find_map(|name| {
        url.query_pairs()
            .find(|(key, value)| &**key == *name && !value.trim().is_empty())
            .map(|(_, value)| value.trim().to_string())
    })
}

/// Copy of `url` without gateway parameters, so a reload cannot re-verify.
pub fn strip_gateway_params(url: &Url) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_gateway_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut cleaned = url.clone();
    if kept.is_empty() {
        cleaned.set_query(None);
    } else {
        cleaned.query_pairs_mut().clear().extend_pairs(kept);
    }
    cleaned
}

/// Map a raw gateway status code onto the four verification buckets.
pub fn classify(raw: &str) -> VerifyStatus {
    match raw.trim().to_uppercase().as_str() {
        "CAPTURED" | "SUCCESS" | "SUCCEEDED" | "PAID" | "AUTHORIZED" | "COMPLETED" => {
            VerifyStatus::Success
        }
        "PENDING" | "INITIATED" | "IN_PROGRESS" | "PROCESSING" => VerifyStatus::Pending,
        "FAILED" | "CANCELLED" | "CANCELED" | "DECLINED" | "ABANDONED" | "VOID" | "TIMEDOUT"
        | "RESTRICTED" => VerifyStatus::Failed,
        _ => VerifyStatus::Unknown,
    }
}

pub struct ReturnUrlVerifier {
    oracle: Arc<dyn StatusOracle>,
    reconciler: Arc<Reconciler>,
    dispatcher: Arc<EffectDispatcher>,
}

impl ReturnUrlVerifier {
    pub fn new(
        oracle: Arc<dyn StatusOracle>,
        reconciler: Arc<Reconciler>,
        dispatcher: Arc<EffectDispatcher>,
    ) -> Self {
        Self {
            oracle,
            reconciler,
            dispatcher,
        }
    }

    /// Inspect `current_url` for a gateway reference and verify it once.
    ///
    /// Returns `Ok(None)` for the ordinary page load without gateway
    /// parameters. Errors only when `current_url` itself cannot be parsed; a
    /// failed verification call classifies as [`VerifyStatus::Unknown`].
    pub async fn verify_return(&self, current_url: &str) -> Result<Option<VerificationReport>> {
        let url = Url::parse(current_url)?;

        let Some(reference) = find_reference(&url) else {
            return Ok(None);
        };

        let repo = self.reconciler.repository();
        repo.remember_reference(&reference);

        let payload = match self.oracle.verify(&reference).await {
            Ok(payload) => Some(payload),
            Err(e) => {
                tracing::warn!(%reference, "Return URL verification failed: {}", e);
                None
            }
        };
        let status = payload
            .as_ref()
            .map(|p| classify(&p.status))
            .unwrap_or(VerifyStatus::Unknown);

        if let Some(echoed) = payload.as_ref().and_then(VerifyPayload::reference)
            && echoed != reference
        {
            tracing::warn!(%reference, %echoed, "Verification echoed a different reference");
        }

        let cleaned_url = strip_gateway_params(&url).to_string();
        self.dispatcher.host().replace_url(&cleaned_url);

        tracing::info!(%reference, status = status.as_str(), "Return URL verified");

        let mut report = VerificationReport {
            reference: reference.clone(),
            status,
            gateway_status: payload.as_ref().map(|p| p.status.clone()),
            amount: payload.as_ref().and_then(|p| p.amount),
            currency: payload.as_ref().and_then(|p| p.currency.clone()),
            authorization_id: payload
                .as_ref()
                .and_then(|p| p.authorization.as_ref())
                .and_then(|a| a.id())
                .map(String::from),
            cleaned_url,
            claim: None,
        };

        match status {
            VerifyStatus::Success => {
                // The token goes down before anything can be shown, so a
                // poller finishing concurrently defers its reload.
                self.reconciler.open_modal(&reference);

                let stored = repo.read().filter(|s| s.reference == reference);
                let claim = self.reconciler.try_claim(Channel::ReturnUrl, &reference);
                report.claim = Some(claim);

                let prompt = SetupPrompt {
                    reference: reference.clone(),
                    store_id: stored.as_ref().map(|s| s.store_id.clone()),
                    plan_id: stored.as_ref().map(|s| s.plan_id.clone()),
                    authorization_id: report.authorization_id.clone(),
                    amount: report.amount,
                    currency: report.currency.clone(),
                };
                match claim {
                    Claim::Won => {
                        self.dispatcher
                            .succeed_return(prompt, LocalizedMessage::default())
                            .await;
                    }
                    // Already announced by the poller. The modal keeps the
                    // token so its pending reload waits for dismissal.
                    Claim::AlreadyResolved => self.dispatcher.offer_setup(prompt),
                }
            }
            VerifyStatus::Failed => {
                let claim = self.reconciler.try_claim(Channel::ReturnUrl, &reference);
                report.claim = Some(claim);
                if claim == Claim::Won {
                    self.dispatcher
                        .fail(&reference, LocalizedMessage::default())
                        .await;
                }
            }
            VerifyStatus::Pending | VerifyStatus::Unknown => {}
        }

        Ok(Some(report))
    }
}

impl std::fmt::Debug for ReturnUrlVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReturnUrlVerifier").finish_non_exhaustive()
    }
}
