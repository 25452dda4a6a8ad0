//! Vault error types.
//!
//! All vault subsystems surface errors through [`VaultError`], which is the
//! single error type returned by every public API in this crate.  A failed
//! decryption is deliberately *not* an error: it is reported through
//! [`crate::crypto::Decryption::Failed`] so that PIN checks and field reads
//! can treat it as an ordinary outcome.

/// Unified error type for the credential keeper vault.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    // -- Crypto errors ------------------------------------------------------
    /// Encryption failed (e.g. invalid key length, ring internal error).
    #[error("encryption failed: {reason}")]
    EncryptionFailed { reason: String },

    /// Key derivation failed (e.g. empty hashed PIN).
    #[error("key derivation failed: {reason}")]
    KeyDerivationFailed { reason: String },

    // -- Session errors -----------------------------------------------------
    /// An operation needed the session key but the vault is not unlocked.
    #[error("vault is locked: no session key, unlock with a PIN first")]
    NoSessionKey,

    /// Too many failed PIN attempts; the vault has been wiped.
    #[error("vault is locked out after too many failed PIN attempts")]
    LockedOut,

    /// A PIN sentinel already exists; enrolling again would orphan data.
    #[error("a PIN is already enrolled; reset the vault first")]
    AlreadyEnrolled,

    /// The PIN does not have the expected shape.
    #[error("invalid PIN: {reason}")]
    InvalidPin { reason: String },

    // -- Store errors -------------------------------------------------------
    /// The requested scope cannot be used for this operation.
    #[error("invalid credential scope: {scope}")]
    InvalidScope { scope: String },

    /// The persistence backend rejected an operation.
    #[error("storage error: {reason}")]
    Storage { reason: String },

    /// Invalid configuration value.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // -- Underlying errors --------------------------------------------------
    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML configuration parse error.
    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// I/O error from the filesystem (file store, config loading).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    // -- Generic ------------------------------------------------------------
    /// Catch-all for unexpected internal errors that don't fit a specific
    /// variant.  Prefer a typed variant whenever possible.
    #[error("internal vault error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the vault crate.
pub type Result<T> = std::result::Result<T, VaultError>;
