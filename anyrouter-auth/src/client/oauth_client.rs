use base64::prelude::*;
use chrono::Utc;
use oauth2::basic::{
    BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
    BasicTokenType,
};
use oauth2::{
    helpers, AccessToken, AuthUrl, AuthorizationCode, Client, ClientId, CsrfToken, EndpointNotSet,
    EndpointSet, HttpRequest, HttpResponse, RedirectUrl, RefreshToken, RequestTokenError, Scope,
    StandardRevocableToken, TokenResponse, TokenUrl,
};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::client::config::Settings;
use crate::common::TokenPair;
use crate::error::AuthError;

const AUTHORIZE_PATH: &str = "/api/oauth/authorize";
const TOKEN_PATH: &str = "/api/oauth/token";

// Async HTTP client for the oauth2 crate. Redirects are not followed so a
// misconfigured token endpoint cannot bounce credentials elsewhere.
async fn http_client(request: HttpRequest) -> Result<HttpResponse, reqwest::Error> {
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()?;
    let mut builder = client
        .request(request.method().clone(), request.uri().to_string())
        .body(request.body().clone());

    for (name, value) in request.headers() {
        builder = builder.header(name.as_str(), value.as_bytes());
    }

    let response = builder.send().await?;
    let status = response.status();
    let body = response.bytes().await?.to_vec();

    let mut http_response = HttpResponse::new(body);
    *http_response.status_mut() = status;

    Ok(http_response)
}

type TokenRequestError = RequestTokenError<reqwest::Error, BasicErrorResponse>;

type ProviderClient = Client<
    BasicErrorResponse,
    ProviderTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

fn default_token_type() -> BasicTokenType {
    BasicTokenType::Bearer
}

/// Token endpoint reply. The provider may leave out `token_type`, in which
/// case the token is a bearer token.
#[derive(Clone, Debug, Deserialize, Serialize)]
struct ProviderTokenResponse {
    access_token: AccessToken,
    #[serde(
        default = "default_token_type",
        deserialize_with = "helpers::deserialize_untagged_enum_case_insensitive"
    )]
    token_type: BasicTokenType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<RefreshToken>,
    #[serde(
        rename = "scope",
        default,
        deserialize_with = "helpers::deserialize_space_delimited_vec",
        skip_serializing_if = "Option::is_none"
    )]
    scopes: Option<Vec<Scope>>,
}

impl TokenResponse for ProviderTokenResponse {
    type TokenType = BasicTokenType;

    fn access_token(&self) -> &AccessToken {
        &self.access_token
    }

    fn token_type(&self) -> &BasicTokenType {
        &self.token_type
    }

    fn expires_in(&self) -> Option<std::time::Duration> {
        self.expires_in.map(std::time::Duration::from_secs)
    }

    fn refresh_token(&self) -> Option<&RefreshToken> {
        self.refresh_token.as_ref()
    }

    fn scopes(&self) -> Option<&Vec<Scope>> {
        self.scopes.as_ref()
    }
}

/// Authorization-code client for the AnyRouter OAuth provider. The client is
/// public: no secret is held and the client id travels in the request body.
pub struct OAuthClient {
    client_id: String,
    scope: String,
    auth_url: AuthUrl,
    token_url: TokenUrl,
    redirect_url: RedirectUrl,
}

impl OAuthClient {
    pub fn new(client_id: impl Into<String>, settings: &Settings) -> Result<Self, AuthError> {
        let base = settings.base_url.trim_end_matches('/');

        let auth_url = AuthUrl::new(format!("{}{}", base, AUTHORIZE_PATH))
            .map_err(|e| AuthError::Configuration(format!("Invalid auth URL: {}", e)))?;

        let token_url = TokenUrl::new(format!("{}{}", base, TOKEN_PATH))
            .map_err(|e| AuthError::Configuration(format!("Invalid token URL: {}", e)))?;

        let redirect_url = RedirectUrl::new(settings.redirect_uri())
            .map_err(|e| AuthError::Configuration(format!("Invalid redirect URI: {}", e)))?;

        Ok(Self {
            client_id: client_id.into(),
            scope: settings.scope.clone(),
            auth_url,
            token_url,
            redirect_url,
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Override the redirect URI, used once the callback listener knows its
    /// bound port.
    pub fn with_redirect_uri(mut self, redirect_uri: &str) -> Result<Self, AuthError> {
        self.redirect_url = RedirectUrl::new(redirect_uri.to_string())
            .map_err(|e| AuthError::Configuration(format!("Invalid redirect URI: {}", e)))?;
        Ok(self)
    }

    fn client(&self) -> ProviderClient {
        Client::new(ClientId::new(self.client_id.clone()))
            .set_auth_uri(self.auth_url.clone())
            .set_token_uri(self.token_url.clone())
            .set_redirect_uri(self.redirect_url.clone())
    }

    /// Build authorization URL with state parameter for CSRF protection
    pub fn build_authorization_url(&self, state: &str) -> String {
        let csrf_token = CsrfToken::new(state.to_string());
        let (auth_url, _) = self
            .client()
            .authorize_url(|| csrf_token)
            .add_scope(Scope::new(self.scope.clone()))
            .url();
        auth_url.to_string()
    }

    /// Exchange authorization code for access and refresh tokens
    pub async fn exchange_code(&self, code: &str) -> Result<TokenPair, AuthError> {
        let token_result = self
            .client()
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&http_client)
            .await
            .map_err(|e| map_token_error(e, false))?;

        let tokens = token_pair(&token_result);
        tracing::debug!(
            expires_at = ?tokens.expires_at,
            has_refresh_token = tokens.refresh_token.is_some(),
            "Exchanged authorization code for tokens"
        );
        Ok(tokens)
    }

    /// Refresh an expired access token. A rejection means the grant is gone
    /// and the user has to authorize again.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let token_result = self
            .client()
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&http_client)
            .await
            .map_err(|e| map_token_error(e, true))?;

        let tokens = token_pair(&token_result);
        tracing::debug!(expires_at = ?tokens.expires_at, "Refreshed access token");
        Ok(tokens)
    }

    /// Generate a random CSRF state token
    pub fn generate_state_token() -> String {
        let mut rng = rand::rng();
        let random_bytes: Vec<u8> = (0..32).map(|_| rng.random()).collect();
        BASE64_URL_SAFE_NO_PAD.encode(&random_bytes)
    }
}

fn token_pair(token_result: &ProviderTokenResponse) -> TokenPair {
    let scope = token_result.scopes().map(|scopes| {
        scopes
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    });

    TokenPair {
        access_token: token_result.access_token().secret().to_string(),
        refresh_token: token_result
            .refresh_token()
            .map(|token| token.secret().to_string()),
        expires_at: token_result.expires_in().map(|expires_in| Utc::now() + expires_in),
        scope,
    }
}

fn map_token_error(err: TokenRequestError, refreshing: bool) -> AuthError {
    match err {
        RequestTokenError::Request(e) => AuthError::Network(e),
        RequestTokenError::ServerResponse(response) => {
            let mut message = response.error().to_string();
            if let Some(description) = response.error_description() {
                message = format!("{}: {}", message, description);
            }
            if refreshing {
                AuthError::TokenRejected(message)
            } else {
                AuthError::OAuth(message)
            }
        }
        RequestTokenError::Parse(e, _) => {
            AuthError::OAuth(format!("malformed token response: {}", e))
        }
        RequestTokenError::Other(message) => {
            AuthError::OAuth(format!("malformed token response: {}", message))
        }
    }
}
