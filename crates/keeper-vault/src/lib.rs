//! PIN-gated encrypted credential vault.
//!
//! This crate stores API credentials for the Sellsy and Klaviyo services
//! encrypted at rest with AES-256-GCM. The encryption key is derived from a
//! short numeric PIN that is never stored; a sentinel record lets the vault
//! verify a PIN, and three wrong PINs in one process wipe every stored
//! credential.
//!
//! # Modules
//!
//! - [`crypto`] - SHA-256 hashing, PIN key derivation, AES-256-GCM.
//! - [`record`] - packed `ciphertext || nonce` record format.
//! - [`scope`] - credential scopes, fields, and plaintext credential sets.
//! - [`storage`] - key-value persistence (in-memory and JSON file).
//! - [`auth`] - PIN verification and lockout.
//! - [`keeper`] - the [`CredentialKeeper`] tying it all together.
//! - [`config`] - TOML configuration.
//! - [`error`] - Unified error types.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use keeper_vault::{CredentialKeeper, CredentialScope, CredentialSet, MemoryStore, VaultConfig};
//! use keeper_vault::scope::SellsyCredentials;
//!
//! # async fn example() -> keeper_vault::Result<()> {
//! let keeper = CredentialKeeper::new(Arc::new(MemoryStore::new()), VaultConfig::default());
//! keeper.load().await?;
//!
//! // First run: protect the vault with a PIN.
//! keeper.enroll("4821").await?;
//!
//! keeper
//!     .secure(&CredentialSet::Sellsy(SellsyCredentials {
//!         consumer_token: Some("ct_...".into()),
//!         ..Default::default()
//!     }))
//!     .await?;
//!
//! let sellsy = keeper.decrypted_credentials(CredentialScope::Sellsy).await?;
//! assert_eq!(sellsy.entries().len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod keeper;
pub mod record;
pub mod scope;
pub mod storage;

// Re-export the most commonly used types at the crate root for convenience.
pub use auth::{PinAuthenticator, PinCheck};
pub use config::VaultConfig;
pub use crypto::{AesGcmCipher, AuthenticatedCipher, Decryption, HashFunction, SessionKey, Sha256Hasher};
pub use error::{Result, VaultError};
pub use keeper::CredentialKeeper;
pub use record::EncryptedRecord;
pub use scope::{CredentialField, CredentialScope, CredentialSet};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
