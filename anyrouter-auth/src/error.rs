use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Credential storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Not authorized. Run `anyrouter authorize` first")]
    NotAuthorized,

    #[error("Access token expired and no refresh token is stored. Run `anyrouter authorize` again")]
    ReauthorizationRequired,

    #[error("OAuth error: {0}")]
    OAuth(String),

    #[error("Token rejected by provider: {0}. Run `anyrouter authorize` again")]
    TokenRejected(String),

    #[error("Authorization denied: {0}")]
    Denied(String),

    #[error("Callback state does not match the issued state, refusing to exchange the code")]
    StateMismatch,

    #[error("Authorization callback not received within {0} seconds")]
    CallbackTimeout(u64),

    #[error("Callback listener error: {0}")]
    Listener(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AuthError {
    /// Failures that may go away on their own and are worth trying again
    /// at the next scheduled run.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::Network(_))
    }
}

impl From<config::ConfigError> for AuthError {
    fn from(err: config::ConfigError) -> Self {
        AuthError::Configuration(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("credential file is corrupt: {0}. Run `anyrouter clear` and authorize again")]
    Corrupt(String),

    #[error("credential file is encrypted, a passphrase is required")]
    PassphraseRequired,

    #[error("could not decrypt credential file, check the passphrase")]
    Decrypt,

    #[error("unsupported credential envelope version {0}")]
    UnsupportedVersion(u32),

    #[error("encryption failed: {0}")]
    Cipher(String),
}

impl StorageError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
