//! Command line arguments.

use clap::{Args, Parser, Subcommand};
use secrecy::SecretString;

#[derive(Parser, Debug)]
#[command(name = "anyrouter", version)]
#[command(about = "Automate the AnyRouter daily sign-in", long_about = None)]
pub struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the OAuth flow and store the resulting credentials
    Authorize {
        /// OAuth client id, overrides ANYROUTER_CLIENT_ID
        #[arg(long)]
        client_id: Option<String>,

        #[command(flatten)]
        passphrase: PassphraseArg,

        /// Print the authorization URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,

        /// Seconds to wait for the OAuth callback
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Sign in once
    Signin {
        #[command(flatten)]
        passphrase: PassphraseArg,
    },

    /// Show credential state and recent sign-ins
    Status {
        #[command(flatten)]
        passphrase: PassphraseArg,

        /// Number of history entries to show
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Sign in every day at the configured time
    Schedule {
        #[command(flatten)]
        passphrase: PassphraseArg,
    },

    /// Remove stored credentials
    Clear,
}

impl Command {
    /// `clear` only touches files and must keep working with a broken config.
    pub fn needs_valid_settings(&self) -> bool {
        !matches!(self, Command::Clear)
    }
}

#[derive(Args, Debug, Default, Clone)]
pub struct PassphraseArg {
    /// Passphrase protecting the credential file
    #[arg(long, env = "ANYROUTER_PASSPHRASE", hide_env_values = true)]
    pub passphrase: Option<String>,
}

impl PassphraseArg {
    pub fn secret(&self) -> Option<SecretString> {
        self.passphrase
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(SecretString::from)
    }
}
