//! PIN verification and brute-force lockout.
//!
//! The PIN itself is never stored. A PIN is correct if the key derived from
//! its hash decrypts the sentinel record to a text containing the configured
//! tag. Every other outcome counts as a failed attempt; once the configured
//! number of failures is reached the authenticator reports a lockout and the
//! owning [`crate::CredentialKeeper`] wipes the vault.
//!
//! The attempt counter lives for the life of the process. It is not reset by
//! a successful unlock, nor by the wipe that follows a lockout.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::sync::RwLock;

use crate::crypto::{self, AuthenticatedCipher, HashFunction, SessionKey};
use crate::error::{Result, VaultError};
use crate::record::EncryptedRecord;

/// Shortest PIN accepted at enrollment.
pub const MIN_PIN_LEN: usize = 4;

/// Longest PIN accepted at enrollment.
pub const MAX_PIN_LEN: usize = 12;

/// Result of a single PIN attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinCheck {
    /// The PIN opened the sentinel; a session key is now held.
    Unlocked,
    /// Wrong PIN; `remaining` attempts are left before lockout.
    Rejected { remaining: u32 },
    /// This attempt reached the limit. The vault must be wiped.
    LockedOut,
    /// The limit was already reached earlier; nothing was checked.
    Blocked,
}

/// Owns the unlock protocol: attempt counting and the session key.
pub struct PinAuthenticator {
    hasher: Arc<dyn HashFunction>,
    cipher: Arc<dyn AuthenticatedCipher>,
    sentinel_tag: String,
    max_attempts: u32,
    attempts: AtomicU32,
    session: RwLock<Option<SessionKey>>,
}

impl PinAuthenticator {
    pub fn new(
        hasher: Arc<dyn HashFunction>,
        cipher: Arc<dyn AuthenticatedCipher>,
        sentinel_tag: impl Into<String>,
        max_attempts: u32,
    ) -> Self {
        Self {
            hasher,
            cipher,
            sentinel_tag: sentinel_tag.into(),
            max_attempts,
            attempts: AtomicU32::new(0),
            session: RwLock::new(None),
        }
    }

    /// Derive the key a PIN maps to, without touching any state.
    pub fn key_for_pin(&self, pin: &str) -> Result<SessionKey> {
        crypto::derive_key(&self.hasher.hash(pin))
    }

    /// Check `pin` against the sentinel record.
    ///
    /// A missing sentinel is treated like one that fails to decrypt. Only
    /// the failure that reaches the limit returns [`PinCheck::LockedOut`];
    /// every later call returns [`PinCheck::Blocked`] without attempting a
    /// decryption.
    pub async fn check(&self, pin: &str, sentinel: Option<&EncryptedRecord>) -> Result<PinCheck> {
        if self.is_locked_out() {
            tracing::warn!("PIN attempt refused, vault is locked out");
            return Ok(PinCheck::Blocked);
        }

        let key = self.key_for_pin(pin)?;
        let valid = sentinel
            .map(|record| self.cipher.decrypt(record, &key))
            .and_then(|outcome| outcome.plaintext().map(|text| text.contains(&self.sentinel_tag)))
            .unwrap_or(false);

        if valid {
            *self.session.write().await = Some(key);
            tracing::info!("vault unlocked");
            return Ok(PinCheck::Unlocked);
        }

        // Concurrent failures may overshoot; only one caller sees the limit.
        let attempts = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempts > self.max_attempts {
            return Ok(PinCheck::Blocked);
        }
        if attempts == self.max_attempts {
            tracing::warn!(attempts, "PIN attempt limit reached, locking out");
            return Ok(PinCheck::LockedOut);
        }

        let remaining = self.max_attempts - attempts;
        tracing::warn!(attempts, remaining, "rejected PIN attempt");
        Ok(PinCheck::Rejected { remaining })
    }

    /// Install a session key obtained outside [`check`](Self::check), e.g.
    /// right after enrolling a new PIN.
    pub async fn open_session(&self, key: SessionKey) {
        *self.session.write().await = Some(key);
    }

    /// Forget the session key.
    pub async fn lock(&self) {
        *self.session.write().await = None;
    }

    /// A copy of the current session key. The copy wipes itself on drop.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NoSessionKey`] if no PIN has been verified.
    pub async fn session_key(&self) -> Result<SessionKey> {
        self.session
            .read()
            .await
            .clone()
            .ok_or(VaultError::NoSessionKey)
    }

    pub async fn is_unlocked(&self) -> bool {
        self.session.read().await.is_some()
    }

    pub fn is_locked_out(&self) -> bool {
        self.attempts.load(Ordering::SeqCst) >= self.max_attempts
    }

    /// Attempts left before lockout.
    pub fn remaining_attempts(&self) -> u32 {
        self.max_attempts
            .saturating_sub(self.attempts.load(Ordering::SeqCst))
    }
}

/// Check that `pin` is 4 to 12 ASCII digits.
pub fn validate_pin(pin: &str) -> Result<()> {
    if !(MIN_PIN_LEN..=MAX_PIN_LEN).contains(&pin.len()) {
        return Err(VaultError::InvalidPin {
            reason: format!("must be {MIN_PIN_LEN} to {MAX_PIN_LEN} digits"),
        });
    }
    if !pin.bytes().all(|b| b.is_ascii_digit()) {
        return Err(VaultError::InvalidPin {
            reason: "must contain digits only".into(),
        });
    }
    Ok(())
}

/// Suggest a random numeric PIN of `len` digits.
pub fn suggest_pin(len: usize) -> Result<String> {
    if !(MIN_PIN_LEN..=MAX_PIN_LEN).contains(&len) {
        return Err(VaultError::InvalidPin {
            reason: format!("length must be {MIN_PIN_LEN} to {MAX_PIN_LEN}"),
        });
    }
    crypto::random_digits(len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{AesGcmCipher, Sha256Hasher};

    fn authenticator() -> PinAuthenticator {
        PinAuthenticator::new(
            Arc::new(Sha256Hasher),
            Arc::new(AesGcmCipher::new()),
            "-v4l1d",
            3,
        )
    }

    fn sentinel_for(auth: &PinAuthenticator, pin: &str, text: &str) -> EncryptedRecord {
        let key = auth.key_for_pin(pin).unwrap();
        AesGcmCipher::new().encrypt(text, &key).unwrap()
    }

    #[tokio::test]
    async fn correct_pin_unlocks() {
        let auth = authenticator();
        let sentinel = sentinel_for(&auth, "1234", "0042-v4l1d");

        let outcome = auth.check("1234", Some(&sentinel)).await.unwrap();
        assert_eq!(outcome, PinCheck::Unlocked);
        assert!(auth.is_unlocked().await);
        assert_eq!(auth.session_key().await.unwrap(), auth.key_for_pin("1234").unwrap());
        assert_eq!(auth.remaining_attempts(), 3);
    }

    #[tokio::test]
    async fn sentinel_without_tag_is_rejected() {
        let auth = authenticator();
        let sentinel = sentinel_for(&auth, "1234", "no marker here");

        let outcome = auth.check("1234", Some(&sentinel)).await.unwrap();
        assert_eq!(outcome, PinCheck::Rejected { remaining: 2 });
        assert!(!auth.is_unlocked().await);
    }

    #[tokio::test]
    async fn missing_sentinel_counts_as_failure() {
        let auth = authenticator();
        let outcome = auth.check("1234", None).await.unwrap();
        assert_eq!(outcome, PinCheck::Rejected { remaining: 2 });
    }

    #[tokio::test]
    async fn third_failure_locks_out_for_good() {
        let auth = authenticator();
        let sentinel = sentinel_for(&auth, "1234", "x-v4l1d");

        assert_eq!(
            auth.check("0000", Some(&sentinel)).await.unwrap(),
            PinCheck::Rejected { remaining: 2 }
        );
        assert_eq!(
            auth.check("1111", Some(&sentinel)).await.unwrap(),
            PinCheck::Rejected { remaining: 1 }
        );
        assert_eq!(
            auth.check("2222", Some(&sentinel)).await.unwrap(),
            PinCheck::LockedOut
        );
        assert!(auth.is_locked_out());
        assert_eq!(auth.remaining_attempts(), 0);

        // Even the right PIN is refused now, and the lockout is reported once.
        assert_eq!(
            auth.check("1234", Some(&sentinel)).await.unwrap(),
            PinCheck::Blocked
        );
        assert_eq!(
            auth.check("0000", Some(&sentinel)).await.unwrap(),
            PinCheck::Blocked
        );
        assert!(!auth.is_unlocked().await);
    }

    #[tokio::test]
    async fn success_does_not_reset_counter() {
        let auth = authenticator();
        let sentinel = sentinel_for(&auth, "1234", "x-v4l1d");

        auth.check("9999", Some(&sentinel)).await.unwrap();
        auth.check("1234", Some(&sentinel)).await.unwrap();
        assert_eq!(auth.remaining_attempts(), 2);
    }

    #[tokio::test]
    async fn lock_clears_session() {
        let auth = authenticator();
        auth.open_session(auth.key_for_pin("5678").unwrap()).await;
        assert!(auth.is_unlocked().await);

        auth.lock().await;
        assert!(matches!(
            auth.session_key().await,
            Err(VaultError::NoSessionKey)
        ));
    }

    #[test]
    fn pin_validation() {
        assert!(validate_pin("1234").is_ok());
        assert!(validate_pin("123456789012").is_ok());
        assert!(validate_pin("123").is_err());
        assert!(validate_pin("12a4").is_err());
        assert!(validate_pin("１２３４").is_err());
    }

    #[test]
    fn suggested_pins_are_valid() {
        let pin = suggest_pin(4).unwrap();
        assert!(validate_pin(&pin).is_ok());
        assert!(suggest_pin(2).is_err());
    }
}
