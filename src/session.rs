//! Durable session store: the single in-flight payment session plus the
//! reconciliation token, on top of any [`StorageAdapter`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::models::{PaymentSession, ReconciliationToken};
use crate::storage::{keys, StorageAdapter};

/// Persistence contract for the one resumable payment session.
///
/// Every write replaces or clears the whole record, so two channels racing on
/// the same store never observe a half-updated session.
pub trait SessionRepository: Send + Sync {
    /// Persist `session`, replacing any previous one.
    fn save(&self, session: &PaymentSession);

    /// The stored session, unless it is missing, malformed or past the
    /// maximum age (in which case it is cleared).
    fn read(&self) -> Option<PaymentSession>;

    /// Remove the stored session.
    fn clear(&self);

    /// Clear the stored session only if it belongs to `reference`.
    /// Returns whether a matching session was removed.
    fn take(&self, reference: &str) -> bool;

    /// Whether the stored session (of any age) belongs to `reference`.
    fn holds(&self, reference: &str) -> bool;

    /// Mark a result modal as authoritative for `reference`.
    fn set_reconciliation_flag(&self, reference: Option<&str>);

    fn clear_reconciliation_flag(&self);

    /// Whether a live (unexpired) modal token is stored.
    fn is_reconciliation_flag_set(&self) -> bool;

    /// Keep the raw reference from a return URL for support/debugging.
    fn remember_reference(&self, reference: &str);

    fn last_reference(&self) -> Option<String>;
}

/// [`SessionRepository`] over a string key/value [`StorageAdapter`].
#[derive(Clone)]
pub struct StoredSessionRepository {
    storage: Arc<dyn StorageAdapter>,
    max_age_secs: i64,
    token_ttl_secs: i64,
}

/// Durations past `i64::MAX` seconds behave as "never".
fn whole_secs(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}

impl StoredSessionRepository {
    pub fn new(storage: Arc<dyn StorageAdapter>, max_age: Duration, token_ttl: Duration) -> Self {
        Self {
            storage,
            max_age_secs: whole_secs(max_age),
            token_ttl_secs: whole_secs(token_ttl),
        }
    }

    /// Read the raw record without applying the age policy.
    fn load(&self) -> Option<PaymentSession> {
        let reference = self.storage.get(keys::REFERENCE);
        let plan_id = self.storage.get(keys::PLAN_ID);
        let store_id = self.storage.get(keys::STORE_ID);
        let started_at = self.storage.get(keys::STARTED_AT);

        match (reference, plan_id, store_id, started_at) {
            (None, None, None, None) => None,
            (Some(reference), Some(plan_id), Some(store_id), Some(started_at)) => {
                let Ok(started_at) = started_at.parse::<i64>() else {
                    tracing::warn!(%reference, "Stored payment session has invalid start time, clearing");
                    self.clear();
                    return None;
                };
                Some(PaymentSession {
                    reference,
                    plan_id,
                    store_id,
                    started_at,
                })
            }
            _ => {
                tracing::warn!("Stored payment session is incomplete, clearing");
                self.clear();
                None
            }
        }
    }

    fn load_token(&self) -> Option<ReconciliationToken> {
        let raw = self.storage.get(keys::RECONCILIATION)?;
        match serde_json::from_str(&raw) {
            Ok(token) => Some(token),
            Err(e) => {
                tracing::warn!("Discarding unreadable reconciliation token: {}", e);
                self.storage.remove(keys::RECONCILIATION);
                None
            }
        }
    }
}

impl SessionRepository for StoredSessionRepository {
    fn save(&self, session: &PaymentSession) {
        self.clear();
        self.storage.set(keys::REFERENCE, &session.reference);
        self.storage.set(keys::PLAN_ID, &session.plan_id);
        self.storage.set(keys::STORE_ID, &session.store_id);
        self.storage
            .set(keys::STARTED_AT, &session.started_at.to_string());
    }

    fn read(&self) -> Option<PaymentSession> {
        let session = self.load()?;
        let now = Utc::now().timestamp();

        if session.is_expired(now, self.max_age_secs) {
            tracing::info!(
                reference = %session.reference,
                age_secs = session.age_secs(now),
                "Abandoning stale payment session"
            );
            self.clear();
            return None;
        }

        Some(session)
    }

    fn clear(&self) {
        for key in keys::SESSION {
            self.storage.remove(key);
        }
    }

    fn take(&self, reference: &str) -> bool {
        match self.load() {
            Some(session) if session.reference == reference => {
                self.clear();
                true
            }
            _ => false,
        }
    }

    fn holds(&self, reference: &str) -> bool {
        self.load().is_some_and(|s| s.reference == reference)
    }

    fn set_reconciliation_flag(&self, reference: Option<&str>) {
        let token = ReconciliationToken::modal(
            reference.map(String::from),
            Utc::now().timestamp(),
            self.token_ttl_secs,
        );
        match serde_json::to_string(&token) {
            Ok(raw) => self.storage.set(keys::RECONCILIATION, &raw),
            Err(e) => tracing::error!("Failed to encode reconciliation token: {}", e),
        }
    }

    fn clear_reconciliation_flag(&self) {
        self.storage.remove(keys::RECONCILIATION);
    }

    fn is_reconciliation_flag_set(&self) -> bool {
        let Some(token) = self.load_token() else {
            return false;
        };

        if token.is_held(Utc::now().timestamp()) {
            return true;
        }

        tracing::debug!(reference = ?token.reference, "Reconciliation token lapsed, releasing");
        self.clear_reconciliation_flag();
        false
    }

    fn remember_reference(&self, reference: &str) {
        self.storage.set(keys::LAST_REFERENCE, reference);
    }

    fn last_reference(&self) -> Option<String> {
        self.storage.get(keys::LAST_REFERENCE)
    }
}

impl std::fmt::Debug for StoredSessionRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredSessionRepository")
            .field("storage", &"<storage>")
            .field("max_age_secs", &self.max_age_secs)
            .field("token_ttl_secs", &self.token_ttl_secs)
            .finish()
    }
}
