//! Remote status oracle: the backend endpoints that know whether a gateway
//! payment went through.

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::{PollOutcome, StatusResponse, VerifyEnvelope, VerifyPayload};

/// Asks the backend about a payment reference.
#[async_trait]
pub trait StatusOracle: Send + Sync {
    /// One status query for the polling loop.
    ///
    /// Never fails: any transport or decoding problem comes back as an
    /// `error` outcome with `should_continue_polling` set.
    async fn query(&self, store_id: &str, reference: &str, plan_id: &str) -> PollOutcome;

    /// One-shot verification used when the browser returns from the gateway.
    async fn verify(&self, reference: &str) -> Result<VerifyPayload>;
}

/// [`StatusOracle`] over the storefront REST API.
#[derive(Clone)]
pub struct HttpStatusOracle {
    base_url: String,
    bearer_token: Option<String>,
    http: HttpClient,
}

impl HttpStatusOracle {
    pub fn new(base_url: &str, bearer_token: Option<String>) -> Result<Self> {
        let http = HttpClient::builder()
            .user_agent(concat!("storefront-payments/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(15))
            .build()?;

        Ok(Self::with_client(http, base_url, bearer_token))
    }

    pub fn with_client(http: HttpClient, base_url: &str, bearer_token: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer_token: bearer_token.filter(|t| !t.is_empty()),
            http,
        }
    }

    fn status_url(&self, store_id: &str, reference: &str, plan_id: &str) -> String {
        format!(
            "{}/stores/{}/payments/{}/status?planId={}",
            self.base_url,
            urlencoding::encode(store_id),
            urlencoding::encode(reference),
            urlencoding::encode(plan_id)
        )
    }

    fn verify_url(&self, reference: &str) -> String {
        format!(
            "{}/payments/verify/{}",
            self.base_url,
            urlencoding::encode(reference)
        )
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T> {
        let mut request = self.http.get(url);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            #[derive(Deserialize)]
            struct ErrorResponse {
                message: Option<String>,
                error: Option<String>,
            }

            let message = response
                .json::<ErrorResponse>()
                .await
                .ok()
                .and_then(|body| body.message.or(body.error))
                .unwrap_or_else(|| format!("Request failed: {}", status.as_u16()));

            return Err(AppError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl StatusOracle for HttpStatusOracle {
    async fn query(&self, store_id: &str, reference: &str, plan_id: &str) -> PollOutcome {
        let url = self.status_url(store_id, reference, plan_id);

        match self.get_json::<StatusResponse>(&url).await {
            Ok(response) => response.into(),
            Err(e) => {
                if e.is_transient() {
                    tracing::debug!(%reference, "Payment status query failed, will retry: {}", e);
                } else {
                    tracing::warn!(%reference, "Payment status query rejected, will retry: {}", e);
                }
                PollOutcome::error()
            }
        }
    }

    async fn verify(&self, reference: &str) -> Result<VerifyPayload> {
        let envelope: VerifyEnvelope = self.get_json(&self.verify_url(reference)).await?;
        Ok(envelope.data)
    }
}

impl std::fmt::Debug for HttpStatusOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpStatusOracle")
            .field("base_url", &self.base_url)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
