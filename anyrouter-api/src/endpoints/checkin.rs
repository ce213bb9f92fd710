use super::SigninResult;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// Requests

#[derive(Debug, Clone, Serialize)]
pub struct CheckinRequest {
    pub timestamp: i64,
}

impl CheckinRequest {
    pub const ENDPOINT: &'static str = "/api/checkin";

    pub fn now() -> Self {
        Self {
            timestamp: Utc::now().timestamp(),
        }
    }
}

// Responses

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckinResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    /// Either a string or a number depending on the reward type.
    #[serde(default)]
    pub reward: Option<Value>,
}

impl CheckinResponse {
    pub fn reward_text(&self) -> Option<String> {
        match self.reward.as_ref()? {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.trim().to_string()),
            other => Some(other.to_string()),
        }
    }
}

impl From<CheckinResponse> for SigninResult {
    fn from(response: CheckinResponse) -> Self {
        let message = response
            .message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string);

        let mut detail = match (&message, response.success) {
            (Some(message), _) => message.clone(),
            (None, true) => "signed in".to_string(),
            (None, false) => "sign-in rejected by service".to_string(),
        };

        if let Some(reward) = response.reward_text() {
            detail.push_str(&format!(" (reward: {})", reward));
        }

        if response.success {
            SigninResult::success(detail)
        } else {
            SigninResult::failure(detail)
        }
    }
}
