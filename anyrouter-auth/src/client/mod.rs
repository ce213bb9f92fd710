mod callback;
mod cipher;
mod config;
mod credential_store;
mod oauth_client;

pub use callback::CallbackListener;
pub use config::{AppPaths, Settings};
pub use credential_store::CredentialStore;
pub use oauth_client::OAuthClient;

use std::time::Duration;

use crate::common::CredentialRecord;
use crate::error::AuthError;

/// Run the authorization-code flow: listen for the redirect, hand the
/// authorization URL to `present`, exchange the returned code and persist the
/// resulting credentials. Nothing is written unless the exchange succeeds.
pub async fn authorize<F>(
    client_id: &str,
    settings: &Settings,
    store: &CredentialStore,
    timeout: Duration,
    present: F,
) -> Result<CredentialRecord, AuthError>
where
    F: FnOnce(&str),
{
    let state = OAuthClient::generate_state_token();
    let listener =
        CallbackListener::bind(&settings.callback_host, settings.callback_port, state.clone())
            .await?;

    let oauth =
        OAuthClient::new(client_id, settings)?.with_redirect_uri(&listener.redirect_uri()?)?;
    let auth_url = oauth.build_authorization_url(&state);

    present(&auth_url);

    let code = listener.wait_for_code(timeout).await?;
    let tokens = oauth.exchange_code(&code).await?;

    let record = CredentialRecord::new(oauth.client_id(), tokens);
    store.save(&record)?;

    tracing::info!(
        client_id = %record.client_id,
        expires_at = ?record.expires_at,
        "Authorization complete"
    );
    Ok(record)
}

/// Print the authorization URL and optionally open it in the default browser.
pub fn present_authorization_url(auth_url: &str, open_browser: bool) {
    if open_browser {
        if let Err(e) = open::that(auth_url) {
            tracing::warn!(error = %e, "Failed to open browser");
            eprintln!("Failed to open browser automatically: {}", e);
            eprintln!("\nPlease open this URL in your browser:");
            eprintln!("{}\n", auth_url);
        } else {
            println!("Browser opened. Please authorize the application...");
            println!("\nYou can also open this URL directly in your browser:");
            println!("{}\n", auth_url);
        }
    } else {
        println!("Open this URL in your browser to authorize:");
        println!("{}\n", auth_url);
    }
    println!("Waiting for authorization...");
}

/// Load the stored credentials and make sure the access token is usable,
/// refreshing and persisting it first when it has expired.
pub async fn ensure_valid_credentials(
    settings: &Settings,
    store: &CredentialStore,
) -> Result<CredentialRecord, AuthError> {
    let mut record = store.load()?.ok_or(AuthError::NotAuthorized)?;

    if !record.is_expired() {
        return Ok(record);
    }

    let refresh_token = record
        .refresh_token
        .clone()
        .ok_or(AuthError::ReauthorizationRequired)?;

    tracing::info!(expires_at = ?record.expires_at, "Access token expired, refreshing");
    let oauth = OAuthClient::new(record.client_id.clone(), settings)?;
    let tokens = oauth.refresh(&refresh_token).await?;

    record.apply_refresh(tokens);
    store.save(&record)?;

    tracing::info!(expires_at = ?record.expires_at, "Access token refreshed");
    Ok(record)
}
