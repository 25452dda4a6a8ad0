//! CLI entry point for the credential keeper.
//!
//! This binary provides the `keeper` command: enroll a PIN, store and show
//! Sellsy/Klaviyo credentials, and wipe the vault.

mod cli;
mod helpers;

use anyhow::{Context, Result, bail};
use clap::Parser;
use keeper_vault::auth;
use keeper_vault::{CredentialKeeper, CredentialScope};
use tracing::info;

use crate::cli::{Cli, Commands};
use crate::helpers::{
    init_tracing, load_config, open_keeper, parse_assignments, parse_scope, prompt_line, unlock,
};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing("warn");

    let config = load_config(&cli.config, cli.store)?;

    match cli.command {
        Commands::Enroll { pin } => cmd_enroll(&open_keeper(config).await?, pin).await,
        Commands::Unlock { pin } => cmd_unlock(&open_keeper(config).await?, pin).await,
        Commands::Set { scope, fields, pin } => {
            cmd_set(&open_keeper(config).await?, &scope, &fields, pin).await
        }
        Commands::Show { scope, json, pin } => {
            cmd_show(&open_keeper(config).await?, &scope, json, pin).await
        }
        Commands::Reset { yes } => cmd_reset(&open_keeper(config).await?, yes).await,
        Commands::Status => cmd_status(&open_keeper(config).await?).await,
        Commands::SuggestPin { length } => cmd_suggest_pin(length),
    }
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

async fn cmd_enroll(keeper: &CredentialKeeper, pin: Option<String>) -> Result<()> {
    if keeper.is_enrolled().await? {
        bail!("a PIN is already enrolled; run `keeper reset` to start over");
    }

    let pin = match pin {
        Some(pin) => pin,
        None => {
            let first = prompt_line("New PIN: ")?;
            let second = prompt_line("Repeat PIN: ")?;
            if first != second {
                bail!("PINs do not match");
            }
            first
        }
    };

    keeper.enroll(&pin).await.context("failed to enroll PIN")?;
    info!(store = %keeper.config().storage_path.display(), "PIN enrolled");
    println!("PIN enrolled.");
    Ok(())
}

async fn cmd_unlock(keeper: &CredentialKeeper, pin: Option<String>) -> Result<()> {
    unlock(keeper, pin).await?;
    println!("PIN accepted.");
    Ok(())
}

async fn cmd_set(
    keeper: &CredentialKeeper,
    scope: &str,
    fields: &[String],
    pin: Option<String>,
) -> Result<()> {
    let scope = parse_scope(scope)?;
    let credentials = parse_assignments(scope, fields)?;

    unlock(keeper, pin).await?;
    keeper
        .secure(&credentials)
        .await
        .with_context(|| format!("failed to store {scope} credentials"))?;

    let written = credentials
        .entries()
        .iter()
        .filter(|(_, value)| !value.trim().is_empty())
        .count();
    println!("Stored {written} {scope} field(s).");
    Ok(())
}

async fn cmd_show(
    keeper: &CredentialKeeper,
    scope: &str,
    json: bool,
    pin: Option<String>,
) -> Result<()> {
    let scope = parse_scope(scope)?;

    unlock(keeper, pin).await?;
    let credentials = keeper.decrypted_credentials(scope).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&credentials)?);
        return Ok(());
    }

    if credentials.is_empty() {
        println!("No {scope} credentials stored.");
    }
    for (field, value) in credentials.entries() {
        println!("{:<16} {value}", field.as_str());
    }
    Ok(())
}

async fn cmd_reset(keeper: &CredentialKeeper, yes: bool) -> Result<()> {
    if !yes {
        let answer = prompt_line("Erase every stored credential and the PIN? [y/N] ")?;
        if !answer.eq_ignore_ascii_case("y") && !answer.eq_ignore_ascii_case("yes") {
            println!("Aborted.");
            return Ok(());
        }
    }

    keeper.reset().await.context("failed to reset vault")?;
    println!("Vault erased.");
    Ok(())
}

fn cmd_suggest_pin(length: usize) -> Result<()> {
    println!("{}", auth::suggest_pin(length)?);
    Ok(())
}

async fn cmd_status(keeper: &CredentialKeeper) -> Result<()> {
    println!("Store:     {}", keeper.config().storage_path.display());
    println!(
        "PIN:       {}",
        if keeper.is_enrolled().await? {
            "enrolled"
        } else {
            "not enrolled"
        }
    );
    println!("Attempts:  {}", keeper.remaining_pin_tests());

    for scope in [CredentialScope::Sellsy, CredentialScope::Klaviyo] {
        let stored = keeper.stored_fields(scope).await?;
        let names: Vec<_> = stored.iter().map(|f| f.as_str()).collect();
        println!(
            "{:<10} {}",
            format!("{scope}:"),
            if names.is_empty() {
                "-".to_string()
            } else {
                names.join(", ")
            }
        );
    }
    Ok(())
}
