// Token and credential models
pub mod common;

// OAuth flow, credential storage and settings
mod client;
mod error;

pub use client::{
    authorize, ensure_valid_credentials, present_authorization_url, AppPaths, CallbackListener,
    CredentialStore, OAuthClient, Settings,
};
pub use common::{CredentialRecord, TokenPair, EXPIRY_BUFFER};
pub use error::{AuthError, StorageError};
