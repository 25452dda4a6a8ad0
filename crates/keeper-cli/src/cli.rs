//! CLI argument definitions for the credential keeper.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// keeper -- PIN-protected vault for Sellsy and Klaviyo API credentials.
#[derive(Parser)]
#[command(
    name = "keeper",
    version,
    about = "PIN-protected vault for Sellsy and Klaviyo API credentials",
    long_about = "Stores API credentials encrypted with a key derived from a numeric PIN. \
                  Three wrong PINs within one process wipe every stored credential. \
                  The attempt counter is not persisted: each `keeper` invocation starts \
                  with a fresh count, so repeated `--pin` runs (one attempt each) never \
                  add up to a lockout. Only the interactive prompt retries within a run."
)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "config/default.toml")]
    pub config: PathBuf,

    /// Override the credential store location.
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Protect a fresh vault with a new PIN.
    Enroll {
        /// PIN to enroll (prompted if omitted).
        #[arg(long)]
        pin: Option<String>,
    },

    /// Check a PIN against the vault.
    Unlock {
        /// PIN to try (prompted, with retries, if omitted).
        #[arg(long)]
        pin: Option<String>,
    },

    /// Store credentials for a scope.
    Set {
        /// Scope to write: `sellsy` or `klaviyo`.
        scope: String,

        /// Field assignment, e.g. `consumerToken=abc`. Repeatable.
        #[arg(long = "field", short = 'f', value_name = "NAME=VALUE", required = true)]
        fields: Vec<String>,

        /// PIN (prompted, with retries, if omitted).
        #[arg(long)]
        pin: Option<String>,
    },

    /// Decrypt and print the credentials of a scope.
    Show {
        /// Scope to read: `sellsy` or `klaviyo`.
        scope: String,

        /// Print as JSON.
        #[arg(long)]
        json: bool,

        /// PIN (prompted, with retries, if omitted).
        #[arg(long)]
        pin: Option<String>,
    },

    /// Delete every stored credential and the PIN sentinel.
    Reset {
        /// Skip the confirmation prompt.
        #[arg(long, short)]
        yes: bool,
    },

    /// Show whether a PIN is enrolled and which fields are stored.
    Status,

    /// Print a random numeric PIN.
    SuggestPin {
        /// Number of digits.
        #[arg(long, short, default_value_t = 4)]
        length: usize,
    },
}
