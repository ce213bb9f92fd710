//! One-shot loopback listener for the OAuth redirect.
//!
//! The first request to `/callback` is terminal. It either yields the
//! authorization code or an error, and in both cases the server is shut down
//! right after the response page is written. Requests to other paths get a
//! 404 and do not end the wait.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tower_http::trace::TraceLayer;

use crate::error::AuthError;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

const SUCCESS_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>Authorization Complete</title>
    <style>
        body {
            margin: 0;
            font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, "Helvetica Neue", Arial, sans-serif;
            background: #F3F4F6;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
        }
        .container {
            background: white;
            border-radius: 12px;
            padding: 40px;
            box-shadow: 0 8px 32px rgba(0, 0, 0, 0.08);
            text-align: center;
            max-width: 420px;
        }
        h1 { color: #047857; font-size: 22px; margin: 0 0 12px 0; }
        p { color: #4B5563; line-height: 1.5; margin: 0; }
    </style>
</head>
<body>
    <div class="container">
        <h1>Authorization complete</h1>
        <p>AnyRouter access has been granted. You can close this window and return to your terminal.</p>
    </div>
</body>
</html>"#;

const ERROR_HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>Authorization Failed</title>
    <style>
        body {
            margin: 0;
            font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, "Helvetica Neue", Arial, sans-serif;
            background: #F3F4F6;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
        }
        .container {
            background: white;
            border-radius: 12px;
            padding: 40px;
            box-shadow: 0 8px 32px rgba(0, 0, 0, 0.08);
            text-align: center;
            max-width: 420px;
        }
        h1 { color: #B91C1C; font-size: 22px; margin: 0 0 12px 0; }
        p { color: #4B5563; line-height: 1.5; }
        .error-details {
            background: #FEE2E2;
            border-radius: 8px;
            padding: 12px;
            color: #991B1B;
            font-family: monospace;
            font-size: 14px;
        }
    </style>
</head>
<body>
    <div class="container">
        <h1>Authorization failed</h1>
        <div class="error-details">{ERROR}</div>
        <p>Close this window and run the authorize command again.</p>
    </div>
</body>
</html>"#;

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl CallbackParams {
    fn into_code(self, expected_state: &str) -> Result<String, AuthError> {
        if let Some(error) = self.error {
            let message = match self.error_description {
                Some(description) => format!("{}: {}", error, description),
                None => error,
            };
            return Err(AuthError::Denied(message));
        }

        match self.state {
            Some(state) if state == expected_state => {}
            _ => return Err(AuthError::StateMismatch),
        }

        self.code
            .filter(|code| !code.is_empty())
            .ok_or_else(|| AuthError::OAuth("callback is missing the authorization code".to_string()))
    }
}

type CodeSender = oneshot::Sender<Result<String, AuthError>>;

#[derive(Clone)]
struct CallbackState {
    expected_state: Arc<str>,
    result_tx: Arc<Mutex<Option<CodeSender>>>,
    shutdown_tx: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl CallbackState {
    async fn shutdown(&self) {
        if let Some(tx) = self.shutdown_tx.lock().await.take() {
            let _ = tx.send(());
        }
    }
}

async fn oauth_callback(
    State(state): State<CallbackState>,
    Query(params): Query<CallbackParams>,
) -> Response {
    let Some(sender) = state.result_tx.lock().await.take() else {
        return (
            StatusCode::GONE,
            Html(error_page("This authorization request was already handled.")),
        )
            .into_response();
    };

    let outcome = params.into_code(&state.expected_state);
    let response = match &outcome {
        Ok(_) => {
            tracing::info!("Authorization code received");
            (StatusCode::OK, Html(SUCCESS_HTML.to_string()))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Authorization callback rejected");
            let status = match e {
                AuthError::StateMismatch => StatusCode::UNAUTHORIZED,
                _ => StatusCode::BAD_REQUEST,
            };
            (status, Html(error_page(&e.to_string())))
        }
    };

    let _ = sender.send(outcome);
    state.shutdown().await;

    response.into_response()
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Unknown path")
}

fn error_page(message: &str) -> String {
    ERROR_HTML_TEMPLATE.replace("{ERROR}", &html_escape(message))
}

fn html_escape(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Loopback server waiting for a single OAuth redirect.
pub struct CallbackListener {
    listener: TcpListener,
    host: String,
    expected_state: String,
}

impl CallbackListener {
    /// Bind the listener. Port 0 picks an ephemeral port; read it back with
    /// [`CallbackListener::local_addr`].
    pub async fn bind(
        host: &str,
        port: u16,
        expected_state: impl Into<String>,
    ) -> Result<Self, AuthError> {
        let listener = TcpListener::bind((host, port)).await.map_err(|e| {
            AuthError::Listener(format!("could not bind {}:{}: {}", host, port, e))
        })?;

        Ok(Self {
            listener,
            host: host.to_string(),
            expected_state: expected_state.into(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, AuthError> {
        Ok(self.listener.local_addr()?)
    }

    /// Redirect URI for the bound port, keeping the host exactly as
    /// configured so it matches the URI registered with the provider.
    pub fn redirect_uri(&self) -> Result<String, AuthError> {
        Ok(format!(
            "http://{}:{}/callback",
            self.host,
            self.local_addr()?.port()
        ))
    }

    /// Serve until the first `/callback` request or until `timeout` elapses.
    pub async fn wait_for_code(self, timeout: Duration) -> Result<String, AuthError> {
        let (result_tx, result_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let state = CallbackState {
            expected_state: Arc::from(self.expected_state.as_str()),
            result_tx: Arc::new(Mutex::new(Some(result_tx))),
            shutdown_tx: Arc::new(Mutex::new(Some(shutdown_tx))),
        };

        let app = Router::new()
            .route("/callback", get(oauth_callback))
            .fallback(not_found)
            .layer(TraceLayer::new_for_http())
            .with_state(state.clone());

        let addr = self.local_addr()?;
        tracing::info!(%addr, "Waiting for authorization callback");

        let mut server = tokio::spawn(async move {
            axum::serve(self.listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        let outcome = match tokio::time::timeout(timeout, result_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(AuthError::Listener(
                "callback listener stopped before a callback arrived".to_string(),
            )),
            Err(_) => {
                tracing::warn!(timeout_secs = timeout.as_secs(), "Authorization callback timed out");
                Err(AuthError::CallbackTimeout(timeout.as_secs()))
            }
        };

        state.shutdown().await;
        match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
            Ok(Ok(Err(e))) => tracing::warn!(error = %e, "Callback listener exited with an error"),
            Ok(_) => {}
            Err(_) => {
                tracing::debug!("Callback listener did not drain in time, aborting");
                server.abort();
            }
        }

        outcome
    }
}
