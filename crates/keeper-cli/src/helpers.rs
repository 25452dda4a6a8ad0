//! Shared helpers for the keeper CLI: tracing, configuration, prompts and
//! argument parsing.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use keeper_vault::{
    CredentialField, CredentialKeeper, CredentialScope, CredentialSet, FileStore, VaultConfig,
};
use tracing_subscriber::EnvFilter;

/// Environment variable overriding the store location.
const STORE_ENV: &str = "KEEPER_STORAGE";

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Load `.env` and initialize the global tracing subscriber.
///
/// Respects `RUST_LOG`, including one set in `.env`; falls back to
/// `default_level`.
pub fn init_tracing(default_level: &str) {
    // A missing .env is fine. It must be loaded before the filter is built.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(EnvFilter::DEFAULT_ENV, default_level))
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .init();
}

fn env_filter(var: &str, default_level: &str) -> EnvFilter {
    EnvFilter::try_from_env(var).unwrap_or_else(|_| EnvFilter::new(default_level))
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Load the vault configuration.
///
/// Precedence for the store location: `--store`, then `KEEPER_STORAGE`
/// (also read from `.env` by [`init_tracing`]), then the config file.
pub fn load_config(config_path: &Path, store_override: Option<PathBuf>) -> Result<VaultConfig> {
    let mut config = VaultConfig::load(config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    if let Some(path) = store_override.or_else(|| std::env::var_os(STORE_ENV).map(PathBuf::from)) {
        config.storage_path = path;
    }

    tracing::debug!(store = %config.storage_path.display(), "configuration loaded");
    Ok(config)
}

/// Open the file-backed vault and load its records.
pub async fn open_keeper(config: VaultConfig) -> Result<CredentialKeeper> {
    let store = Arc::new(FileStore::new(&config.storage_path));
    let keeper = CredentialKeeper::new(store, config);
    keeper.load().await.context("failed to load credential store")?;
    Ok(keeper)
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

/// Print `prompt` on stderr and read one trimmed line from stdin.
pub fn prompt_line(prompt: &str) -> Result<String> {
    eprint!("{prompt}");
    io::stderr().flush().ok();

    let mut line = String::new();
    let read = io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read input")?;
    if read == 0 {
        bail!("no input");
    }
    Ok(line.trim().to_string())
}

/// Unlock `keeper` with `pin`, or prompt until success or lockout.
pub async fn unlock(keeper: &CredentialKeeper, pin: Option<String>) -> Result<()> {
    if !keeper.is_enrolled().await? {
        bail!("no PIN enrolled yet; run `keeper enroll` first");
    }

    if let Some(pin) = pin {
        if keeper.test_pin(&pin).await? {
            return Ok(());
        }
        report_failure(keeper);
        bail!("wrong PIN");
    }

    loop {
        let pin = prompt_line("PIN: ")?;
        if keeper.test_pin(&pin).await? {
            return Ok(());
        }
        report_failure(keeper);
        if keeper.is_locked_out() {
            bail!("too many wrong PINs: all stored credentials were erased");
        }
    }
}

fn report_failure(keeper: &CredentialKeeper) {
    match keeper.remaining_pin_tests() {
        0 => eprintln!("Wrong PIN. The vault has been wiped."),
        1 => eprintln!("Wrong PIN. 1 attempt left before the vault is wiped."),
        n => eprintln!("Wrong PIN. {n} attempts left."),
    }
}

// ---------------------------------------------------------------------------
// Argument parsing
// ---------------------------------------------------------------------------

/// Parse a user-facing scope name. The PIN sentinel scope is not
/// addressable from the command line.
pub fn parse_scope(name: &str) -> Result<CredentialScope> {
    match CredentialScope::parse(&name.to_ascii_lowercase()) {
        Some(CredentialScope::Test) | None => {
            bail!("unknown scope `{name}` (expected `sellsy` or `klaviyo`)")
        }
        Some(scope) => Ok(scope),
    }
}

/// Build a credential set from `NAME=VALUE` assignments.
pub fn parse_assignments(scope: CredentialScope, assignments: &[String]) -> Result<CredentialSet> {
    let mut set = CredentialSet::empty(scope)
        .with_context(|| format!("scope `{scope}` cannot hold credentials"))?;

    for assignment in assignments {
        let Some((name, value)) = assignment.split_once('=') else {
            bail!("expected NAME=VALUE, got `{assignment}`");
        };
        let field = CredentialField::parse(scope, name.trim()).with_context(|| {
            let known: Vec<_> = scope.fields().iter().map(|f| f.as_str()).collect();
            format!("unknown field `{name}` for {scope} (known: {})", known.join(", "))
        })?;
        set.set(field, value.to_string());
    }

    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use keeper_vault::scope::SellsyCredentials;

    #[test]
    fn scope_names_are_case_insensitive() {
        assert_eq!(parse_scope("Sellsy").unwrap(), CredentialScope::Sellsy);
        assert_eq!(parse_scope("klaviyo").unwrap(), CredentialScope::Klaviyo);
        assert!(parse_scope("test").is_err());
        assert!(parse_scope("github").is_err());
    }

    #[test]
    fn assignments_build_a_set() {
        let set = parse_assignments(
            CredentialScope::Sellsy,
            &["consumerToken=abc".into(), "userSecret=a=b".into()],
        )
        .unwrap();
        assert_eq!(
            set,
            CredentialSet::Sellsy(SellsyCredentials {
                consumer_token: Some("abc".into()),
                user_secret: Some("a=b".into()),
                ..Default::default()
            })
        );
    }

    #[test]
    fn bad_assignments_are_rejected() {
        assert!(parse_assignments(CredentialScope::Klaviyo, &["publicApiKey".into()]).is_err());
        assert!(parse_assignments(CredentialScope::Klaviyo, &["consumerToken=x".into()]).is_err());
    }

    #[test]
    fn dotenv_level_reaches_the_filter() {
        let dir = tempfile::tempdir().unwrap();
        let env_file = dir.path().join(".env");
        std::fs::write(&env_file, "KEEPER_TEST_LOG=keeper_vault=debug\n").unwrap();

        assert_eq!(env_filter("KEEPER_TEST_LOG", "warn").to_string(), "warn");
        dotenvy::from_path_override(&env_file).unwrap();
        assert_eq!(
            env_filter("KEEPER_TEST_LOG", "warn").to_string(),
            "keeper_vault=debug"
        );
    }

    #[test]
    fn store_override_wins() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(
            &dir.path().join("missing.toml"),
            Some(dir.path().join("custom.json")),
        )
        .unwrap();
        assert_eq!(config.storage_path, dir.path().join("custom.json"));
    }
}
