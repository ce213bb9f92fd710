use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Tokens are treated as expired this long before the provider's deadline.
pub const EXPIRY_BUFFER: Duration = Duration::minutes(5);

/// Token pair returned from the OAuth token endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
}

/// Persisted credentials. One record per user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub client_id: String,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(
        default,
        with = "chrono::serde::ts_seconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl CredentialRecord {
    pub fn new(client_id: impl Into<String>, tokens: TokenPair) -> Self {
        Self {
            client_id: client_id.into(),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at: tokens.expires_at,
            scope: tokens.scope,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at <= now + EXPIRY_BUFFER,
            None => false,
        }
    }

    /// Apply a refresh response. Providers that do not rotate refresh tokens
    /// omit it, in which case the stored one stays valid.
    pub fn apply_refresh(&mut self, tokens: TokenPair) {
        self.access_token = tokens.access_token;
        if tokens.refresh_token.is_some() {
            self.refresh_token = tokens.refresh_token;
        }
        self.expires_at = tokens.expires_at;
        if tokens.scope.is_some() {
            self.scope = tokens.scope;
        }
    }

    /// First characters of the access token, safe to print.
    pub fn token_preview(&self) -> String {
        let preview: String = self.access_token.chars().take(6).collect();
        format!("{}...", preview)
    }
}
