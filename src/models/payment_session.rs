use serde::{Deserialize, Serialize};

/// One in-flight attempt to pay, as persisted between page loads.
///
/// At most one session is stored at a time. Saving a new one replaces the old.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSession {
    /// Gateway-supplied reference, unique per attempt
    pub reference: String,
    pub plan_id: String,
    pub store_id: String,
    /// Unix timestamp (seconds) when the attempt started
    pub started_at: i64,
}

impl PaymentSession {
    pub fn new(
        reference: impl Into<String>,
        plan_id: impl Into<String>,
        store_id: impl Into<String>,
    ) -> Self {
        Self::started_at(reference, plan_id, store_id, chrono::Utc::now().timestamp())
    }

    pub fn started_at(
        reference: impl Into<String>,
        plan_id: impl Into<String>,
        store_id: impl Into<String>,
        started_at: i64,
    ) -> Self {
        Self {
            reference: reference.into(),
            plan_id: plan_id.into(),
            store_id: store_id.into(),
            started_at,
        }
    }

    pub fn age_secs(&self, now: i64) -> i64 {
        now - self.started_at
    }

    /// Whether the attempt is too old to still be meaningfully pending.
    pub fn is_expired(&self, now: i64, max_age_secs: i64) -> bool {
        self.age_secs(now) > max_age_secs
    }
}
