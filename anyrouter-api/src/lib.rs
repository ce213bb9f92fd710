pub mod endpoints;
mod error;

pub use crate::endpoints::{SigninOutcome, SigninResult};
pub use crate::error::ApiError;
use endpoints::checkin::{CheckinRequest, CheckinResponse};
use reqwest::Client as HttpClient;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

pub const BASE_URL: &str = "https://anyrouter.top";
const APP_USER_AGENT: &str = concat!("anyrouter-auto/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_DETAIL_CHARS: usize = 200;

pub struct Client {
    http_client: HttpClient,
    base_url: String,
    access_token: SecretString,
}

impl Client {
    pub fn new(access_token: &str) -> Result<Self, ApiError> {
        Self::with_base_url(BASE_URL, access_token)
    }

    pub fn with_base_url(base_url: impl Into<String>, access_token: &str) -> Result<Self, ApiError> {
        let http_client = HttpClient::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(APP_USER_AGENT)
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: SecretString::from(access_token),
        })
    }

    /// Issue the check-in call and decode the body of a successful response.
    pub async fn checkin(&self) -> Result<CheckinResponse, ApiError> {
        let url = format!("{}{}", self.base_url, CheckinRequest::ENDPOINT);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(self.access_token.expose_secret())
            .json(&CheckinRequest::now())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ApiError::Status(status, excerpt(&body)));
        }

        serde_json::from_str(&body).map_err(ApiError::Decode)
    }

    /// Perform the daily sign-in.
    ///
    /// Exactly one request is sent. Transport errors, non-2xx statuses and
    /// undecodable bodies are folded into a failed [`SigninResult`] so callers
    /// always get something to record.
    pub async fn signin(&self) -> SigninResult {
        match self.checkin().await {
            Ok(response) => {
                let result = SigninResult::from(response);
                tracing::debug!(outcome = %result.outcome, "Check-in response received");
                result
            }
            Err(e) => {
                tracing::warn!(error = %e, "Sign-in request failed");
                SigninResult::failure(e.to_string())
            }
        }
    }
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_DETAIL_CHARS {
        return trimmed.to_string();
    }
    let mut short: String = trimmed.chars().take(MAX_DETAIL_CHARS).collect();
    short.push_str("...");
    short
}
