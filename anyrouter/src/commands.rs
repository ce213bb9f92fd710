use anyhow::{Context, Result};
use anyrouter_auth::{AppPaths, AuthError, CredentialStore, Settings};
use secrecy::SecretString;
use std::process::ExitCode;
use std::time::Duration;

use crate::cli::{Command, PassphraseArg};
use crate::history::{HistoryEntry, HistoryLog};
use crate::runner::Runner;
use crate::scheduler::{self, ScheduleTime};

/// Settings and file locations shared by every command.
pub struct AppContext {
    pub settings: Settings,
    pub paths: AppPaths,
}

impl AppContext {
    pub fn load(command: &Command) -> Result<Self> {
        let settings = Settings::new().context("Failed to load configuration")?;
        if command.needs_valid_settings() {
            Self::from_settings(settings)
        } else {
            Self::without_validation(settings)
        }
    }

    pub fn from_settings(settings: Settings) -> Result<Self> {
        settings.validate().map_err(AuthError::Configuration)?;
        Self::without_validation(settings)
    }

    /// Resolve file locations only, accepting out-of-range schedule or
    /// callback values.
    pub fn without_validation(settings: Settings) -> Result<Self> {
        let paths = settings.paths()?;
        paths.ensure()?;
        Ok(Self { settings, paths })
    }

    pub fn credential_store(&self, passphrase: Option<SecretString>) -> CredentialStore {
        CredentialStore::new(self.paths.credentials_file(), passphrase)
    }

    pub fn history(&self) -> HistoryLog {
        HistoryLog::new(self.paths.history_file())
    }

    pub fn runner(&self, passphrase: &PassphraseArg) -> Runner {
        Runner::new(
            self.settings.clone(),
            self.credential_store(passphrase.secret()),
            self.history(),
        )
    }

    pub fn schedule_time(&self) -> Result<ScheduleTime> {
        ScheduleTime::new(self.settings.schedule_hour, self.settings.schedule_minute)
    }
}

pub async fn execute(command: Command, ctx: &AppContext) -> Result<ExitCode> {
    match command {
        Command::Authorize {
            client_id,
            passphrase,
            no_browser,
            timeout,
        } => {
            authorize(ctx, client_id.as_deref(), &passphrase, !no_browser, timeout).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Signin { passphrase } => signin(ctx, &passphrase).await,
        Command::Status { passphrase, limit } => {
            status(ctx, &passphrase, limit)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Schedule { passphrase } => {
            schedule(ctx, &passphrase).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Clear => {
            clear(ctx)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn authorize(
    ctx: &AppContext,
    client_id: Option<&str>,
    passphrase: &PassphraseArg,
    open_browser: bool,
    timeout_secs: Option<u64>,
) -> Result<()> {
    let client_id = ctx.settings.require_client_id(client_id)?;
    let store = ctx.credential_store(passphrase.secret());
    let timeout =
        Duration::from_secs(timeout_secs.unwrap_or(ctx.settings.callback_timeout_secs));

    let record = anyrouter_auth::authorize(&client_id, &ctx.settings, &store, timeout, |url| {
        anyrouter_auth::present_authorization_url(url, open_browser)
    })
    .await?;

    println!("Authorization succeeded. Access token stored.");
    if let Some(expires_at) = record.expires_at {
        println!("Token expires at {}", expires_at.to_rfc3339());
    }
    if store.is_encrypted() {
        println!("Credentials are encrypted with the supplied passphrase.");
    }
    Ok(())
}

async fn signin(ctx: &AppContext, passphrase: &PassphraseArg) -> Result<ExitCode> {
    let runner = ctx.runner(passphrase);
    let entry = runner.signin().await?;

    println!("{}", format_entry(&entry));
    if entry.outcome.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn status(ctx: &AppContext, passphrase: &PassphraseArg, limit: usize) -> Result<()> {
    let store = ctx.credential_store(passphrase.secret());

    match store.load()? {
        None => println!("No credentials stored. Run `anyrouter authorize` first."),
        Some(record) => {
            let state = if record.is_expired() { "expired" } else { "valid" };
            println!("Client ID:     {}", record.client_id);
            println!("Access token:  {} ({})", record.token_preview(), state);
            match record.expires_at {
                Some(expires_at) => println!("Expires at:    {}", expires_at.to_rfc3339()),
                None => println!("Expires at:    never"),
            }
            println!(
                "Refresh token: {}",
                if record.refresh_token.is_some() {
                    "stored"
                } else {
                    "none"
                }
            );
        }
    }

    let entries = ctx.history().read_recent(limit)?;
    if entries.is_empty() {
        println!("\nNo sign-in history yet.");
    } else {
        println!("\nRecent sign-ins (most recent last):");
        for entry in &entries {
            println!("- {}", format_entry(entry));
        }
    }
    Ok(())
}

async fn schedule(ctx: &AppContext, passphrase: &PassphraseArg) -> Result<()> {
    let time = ctx.schedule_time()?;
    let runner = ctx.runner(passphrase);

    println!(
        "Scheduler started, signing in daily at {} local time. Press Ctrl-C to stop.",
        time
    );
    tracing::info!(%time, history = %runner.history().path().display(), "Scheduler started");

    let runner = &runner;
    scheduler::run_daily(
        time,
        move || async move {
            runner.scheduled_attempt().await;
        },
        scheduler::shutdown_signal(),
    )
    .await;

    println!("Scheduler stopped.");
    Ok(())
}

fn clear(ctx: &AppContext) -> Result<()> {
    let store = ctx.credential_store(None);
    store.clear()?;
    println!("Stored credentials removed.");
    Ok(())
}

fn format_entry(entry: &HistoryEntry) -> String {
    format!(
        "{}  {:<7}  {}",
        entry.timestamp.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S"),
        entry.outcome.to_string(),
        entry.detail
    )
}
