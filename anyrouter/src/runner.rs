use anyhow::{Context, Result};
use anyrouter_api::SigninResult;
use anyrouter_auth::{ensure_valid_credentials, AuthError, CredentialStore, Settings};

use crate::history::{HistoryEntry, HistoryLog};

/// One sign-in attempt: make sure the access token is fresh, call the
/// check-in endpoint, record the outcome.
pub struct Runner {
    settings: Settings,
    store: CredentialStore,
    history: HistoryLog,
}

impl Runner {
    pub fn new(settings: Settings, store: CredentialStore, history: HistoryLog) -> Self {
        Self {
            settings,
            store,
            history,
        }
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    /// Refresh when needed, then sign in once. Refreshed tokens are persisted
    /// before the check-in request is sent.
    pub async fn run_once(&self) -> Result<SigninResult> {
        let record = ensure_valid_credentials(&self.settings, &self.store).await?;

        let client =
            anyrouter_api::Client::with_base_url(&self.settings.base_url, &record.access_token)
                .context("Failed to build sign-in client")?;

        Ok(client.signin().await)
    }

    /// Sign in once and append the result to the history. Errors before the
    /// check-in request propagate and leave the history untouched.
    pub async fn signin(&self) -> Result<HistoryEntry> {
        let result = self.run_once().await?;
        let entry = HistoryEntry::from(result);
        self.history.append(&entry)?;
        Ok(entry)
    }

    /// Attempt used by the scheduler. Every error becomes a failed history
    /// entry so the loop keeps going.
    pub async fn scheduled_attempt(&self) -> HistoryEntry {
        let result = match self.run_once().await {
            Ok(result) => result,
            Err(e) => {
                if is_transient(&e) {
                    tracing::warn!(
                        error = %format!("{:#}", e),
                        "Scheduled sign-in failed, retrying at the next scheduled run"
                    );
                } else {
                    tracing::error!(
                        error = %format!("{:#}", e),
                        "Scheduled sign-in failed, the stored authorization needs attention"
                    );
                }
                SigninResult::failure(format!("{:#}", e))
            }
        };

        let entry = HistoryEntry::from(result);
        if let Err(e) = self.history.append(&entry) {
            tracing::error!(error = %format!("{:#}", e), "Failed to record sign-in history");
        }

        if entry.outcome.is_success() {
            tracing::info!(detail = %entry.detail, "Scheduled sign-in succeeded");
        } else {
            tracing::warn!(detail = %entry.detail, "Scheduled sign-in recorded as failure");
        }
        entry
    }
}

/// Whether a failed attempt may succeed on its own at the next run.
fn is_transient(err: &anyhow::Error) -> bool {
    err.downcast_ref::<AuthError>()
        .is_some_and(AuthError::is_transient)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_network_errors_are_not_transient() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let reauthorize = anyhow::Error::new(AuthError::ReauthorizationRequired);
        let other = anyhow::Error::new(AuthError::Io(io));

        assert!(!is_transient(&reauthorize));
        assert!(!is_transient(&other));
        assert!(!is_transient(&anyhow::anyhow!("plain failure")));
    }

    #[tokio::test]
    async fn refresh_network_failure_is_transient() {
        let env = [("ANYROUTER_BASE_URL", "http://127.0.0.1:9")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let settings = Settings::from_sources(None, Some(env)).unwrap();
        let client = anyrouter_auth::OAuthClient::new("Ov23client", &settings).unwrap();

        let err = anyhow::Error::new(client.refresh("ghr").await.unwrap_err());
        assert!(is_transient(&err));
    }
}
