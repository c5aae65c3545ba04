use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

/// Who currently owns the outcome of a confirmed payment on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TokenOwner {
    /// A result modal is open and must not be torn down by a reload
    Modal,
    None,
}

/// Persisted mutual-exclusion token between the return-URL modal and the
/// poller's automatic reload.
///
/// Carries an expiry so a modal that vanished without being dismissed cannot
/// suppress reloads forever.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationToken {
    pub owner: TokenOwner,
    pub reference: Option<String>,
    /// Unix timestamp (seconds)
    pub expires_at: i64,
}

impl ReconciliationToken {
    pub fn modal(reference: Option<String>, now: i64, ttl_secs: i64) -> Self {
        Self {
            owner: TokenOwner::Modal,
            reference,
            expires_at: now.saturating_add(ttl_secs),
        }
    }

    /// A modal owns the screen and the token has not lapsed.
    pub fn is_held(&self, now: i64) -> bool {
        self.owner == TokenOwner::Modal && now < self.expires_at
    }
}
