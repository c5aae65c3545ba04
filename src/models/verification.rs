use serde::{Deserialize, Serialize};

/// Classified result of the one-shot return-URL verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyStatus {
    Success,
    Pending,
    Failed,
    Unknown,
}

impl VerifyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerifyStatus::Success => "success",
            VerifyStatus::Pending => "pending",
            VerifyStatus::Failed => "failed",
            VerifyStatus::Unknown => "unknown",
        }
    }
}

/// Authorization handle the gateway returns for saved-card billing.
///
/// Some gateways send a bare id, others an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Authorization {
    Id(String),
    Object {
        #[serde(default)]
        id: Option<String>,
    },
}

impl Authorization {
    pub fn id(&self) -> Option<&str> {
        match self {
            Authorization::Id(id) => Some(id),
            Authorization::Object { id } => id.as_deref(),
        }
    }
}

/// `data` member of the verification endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyPayload {
    /// Raw gateway status code, e.g. `CAPTURED`
    pub status: String,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub authorization: Option<Authorization>,
}

impl VerifyPayload {
    /// The reference the backend echoed, under whichever name it used.
    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref().or(self.id.as_deref())
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct VerifyEnvelope {
    pub data: VerifyPayload,
}
