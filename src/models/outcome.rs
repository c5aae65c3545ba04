use serde::{Deserialize, Serialize};

use super::LocalizedMessage;

/// The scheduler's own view of where a payment stands.
///
/// `Idle` is both the initial state and where the scheduler lands after giving
/// up (safety timeout, or the oracle saying to stop without a verdict).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollStatus {
    #[default]
    Idle,
    Polling,
    Success,
    Failed,
}

impl PollStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollStatus::Idle => "idle",
            PollStatus::Polling => "polling",
            PollStatus::Success => "success",
            PollStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PollStatus::Success | PollStatus::Failed)
    }
}

/// Subscription details echoed by the oracle alongside a success.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessDetails {
    #[serde(default, alias = "subscription_id")]
    pub subscription_id: Option<String>,
    #[serde(default, alias = "plan_id")]
    pub plan_id: Option<String>,
    #[serde(default, alias = "expires_at")]
    pub expires_at: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
}

/// Why the gateway refused the payment, when the oracle says.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetails {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

/// Result of one status query, keyed by status.
#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeStatus {
    Pending,
    Success(SuccessDetails),
    Failed(FailureDetails),
    /// Transport failure or unreadable answer. Handled exactly like `Pending`.
    Error,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Pending => "pending",
            OutcomeStatus::Success(_) => "success",
            OutcomeStatus::Failed(_) => "failed",
            OutcomeStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollOutcome {
    pub status: OutcomeStatus,
    /// The oracle's own instruction; overrides whatever `status` implies.
    pub should_continue_polling: bool,
    pub message: LocalizedMessage,
}

impl PollOutcome {
    pub fn pending() -> Self {
        Self {
            status: OutcomeStatus::Pending,
            should_continue_polling: true,
            message: LocalizedMessage::default(),
        }
    }

    pub fn success(details: SuccessDetails) -> Self {
        Self {
            status: OutcomeStatus::Success(details),
            should_continue_polling: false,
            message: LocalizedMessage::default(),
        }
    }

    pub fn failed(details: FailureDetails) -> Self {
        Self {
            status: OutcomeStatus::Failed(details),
            should_continue_polling: false,
            message: LocalizedMessage::default(),
        }
    }

    /// The outcome every transport failure is folded into.
    pub fn error() -> Self {
        Self {
            status: OutcomeStatus::Error,
            should_continue_polling: true,
            message: LocalizedMessage::default(),
        }
    }

    pub fn with_continue(mut self, should_continue_polling: bool) -> Self {
        self.should_continue_polling = should_continue_polling;
        self
    }

    pub fn with_message(mut self, message: LocalizedMessage) -> Self {
        self.message = message;
        self
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            OutcomeStatus::Success(_) | OutcomeStatus::Failed(_)
        )
    }
}

fn default_continue() -> bool {
    true
}

/// Body of the per-store polling endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[serde(default)]
    pub success: bool,
    pub status: String,
    #[serde(default = "default_continue")]
    pub should_continue_polling: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub message_ar: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl From<StatusResponse> for PollOutcome {
    fn from(r: StatusResponse) -> Self {
        let data = r.data.unwrap_or(serde_json::Value::Null);

        let status = match r.status.to_lowercase().as_str() {
            "pending" => OutcomeStatus::Pending,
            "success" => {
                OutcomeStatus::Success(serde_json::from_value(data).unwrap_or_default())
            }
            "failed" => OutcomeStatus::Failed(serde_json::from_value(data).unwrap_or_default()),
            "error" => OutcomeStatus::Error,
            other => {
                tracing::warn!(status = %other, success = r.success, "Unrecognized payment status from oracle");
                OutcomeStatus::Error
            }
        };

        Self {
            status,
            should_continue_polling: r.should_continue_polling,
            message: LocalizedMessage {
                en: r.message,
                ar: r.message_ar,
            },
        }
    }
}
