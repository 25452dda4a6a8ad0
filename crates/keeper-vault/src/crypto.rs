//! Hashing, PIN key derivation and AES-256-GCM using the `ring` crate.
//!
//! This module provides the cryptographic capabilities the vault is built
//! on:
//!
//! - **Hashing**: [`HashFunction`] with the SHA-256 [`Sha256Hasher`], used
//!   both to fingerprint PIN attempts and to address storage entries.
//! - **Key derivation**: [`derive_key`] expands a hashed PIN into a 256-bit
//!   [`SessionKey`].
//! - **Encryption/decryption**: [`AuthenticatedCipher`] with the AES-256-GCM
//!   [`AesGcmCipher`], producing packed [`EncryptedRecord`]s.
//!
//! # Security Notes
//!
//! - Key derivation is plain cyclic repetition of the hashed PIN: no salt,
//!   no stretching. A four digit PIN therefore offers no resistance to an
//!   offline attacker holding the stored records. The only brute-force
//!   defense is the online attempt limit enforced by the authenticator.
//! - Nonces are random 96-bit values, one per encryption.
//! - [`SessionKey`] and the seal/open working buffers are zeroized on drop.

use ring::aead::{self, Aad, BoundKey, NONCE_LEN, Nonce, NonceSequence, SealingKey, UnboundKey};
use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{Result, VaultError};
use crate::record::EncryptedRecord;

/// Length of the AES-256-GCM key in bytes.
pub const KEY_LEN: usize = 32;

/// Length of the AES-256-GCM nonce in bytes (96 bits).
pub const NONCE_LEN_BYTES: usize = NONCE_LEN;

/// AES-256-GCM algorithm from `ring`.
static AEAD_ALG: &aead::Algorithm = &aead::AES_256_GCM;

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

/// A deterministic one-way digest rendered as a string.
///
/// Implementations carry no secret state: the same input always yields the
/// same, fixed-length output.
pub trait HashFunction: Send + Sync {
    fn hash(&self, text: &str) -> String;
}

/// SHA-256, rendered as 64 lowercase hex characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl HashFunction for Sha256Hasher {
    fn hash(&self, text: &str) -> String {
        let digest = digest::digest(&digest::SHA256, text.as_bytes());
        digest.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }
}

// ---------------------------------------------------------------------------
// Key derivation
// ---------------------------------------------------------------------------

/// Symmetric key material derived from a verified PIN.
///
/// Only ever held in memory. Every copy is wiped when dropped and `Debug`
/// output is redacted.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; KEY_LEN]);

impl SessionKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(***)")
    }
}

/// Derive a 256-bit key from a hashed PIN.
///
/// The hashed PIN bytes are repeated cyclically until exactly
/// [`KEY_LEN`] bytes are filled. The result depends on nothing but the input,
/// so the same PIN always unlocks the same records.
///
/// # Errors
///
/// Returns [`VaultError::KeyDerivationFailed`] if `hashed_pin` is empty.
pub fn derive_key(hashed_pin: &str) -> Result<SessionKey> {
    let material = hashed_pin.as_bytes();
    if material.is_empty() {
        return Err(VaultError::KeyDerivationFailed {
            reason: "hashed PIN is empty".into(),
        });
    }

    let mut key = SessionKey([0u8; KEY_LEN]);
    for (slot, byte) in key.0.iter_mut().zip(material.iter().cycle()) {
        *slot = *byte;
    }

    Ok(key)
}

// ---------------------------------------------------------------------------
// Nonce handling
// ---------------------------------------------------------------------------

/// A single-use nonce sequence that yields exactly one nonce and then errors.
///
/// `ring` requires a [`NonceSequence`] for sealing and opening keys. Every
/// record carries its own nonce, so each bound key is used exactly once.
struct SingleNonce(Option<[u8; NONCE_LEN_BYTES]>);

impl SingleNonce {
    fn new(bytes: [u8; NONCE_LEN_BYTES]) -> Self {
        Self(Some(bytes))
    }
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.0
            .take()
            .map(Nonce::assume_unique_for_key)
            .ok_or(ring::error::Unspecified)
    }
}

// ---------------------------------------------------------------------------
// Decryption outcome
// ---------------------------------------------------------------------------

/// Outcome of decrypting a record.
///
/// An empty plaintext and a failed decryption are different things; callers
/// that need the legacy "empty string on failure" behavior can ask for it
/// explicitly with [`Decryption::into_lossy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decryption {
    /// The record decrypted to a non-empty string.
    Plaintext(String),
    /// The record decrypted successfully to an empty string.
    Empty,
    /// Wrong key, tampered ciphertext, or malformed record.
    Failed,
}

impl Decryption {
    fn from_plaintext(plaintext: String) -> Self {
        if plaintext.is_empty() {
            Self::Empty
        } else {
            Self::Plaintext(plaintext)
        }
    }

    /// The decrypted text, or `None` if decryption failed.
    pub fn plaintext(&self) -> Option<&str> {
        match self {
            Self::Plaintext(text) => Some(text),
            Self::Empty => Some(""),
            Self::Failed => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Collapse to a string, mapping failures to `""`.
    pub fn into_lossy(self) -> String {
        match self {
            Self::Plaintext(text) => text,
            Self::Empty | Self::Failed => String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Cipher
// ---------------------------------------------------------------------------

/// Authenticated encryption of single string values into packed records.
pub trait AuthenticatedCipher: Send + Sync {
    /// Encrypt `plaintext` under `key`.
    fn encrypt(&self, plaintext: &str, key: &SessionKey) -> Result<EncryptedRecord>;

    /// Decrypt `record` under `key`. Never fails loudly.
    fn decrypt(&self, record: &EncryptedRecord, key: &SessionKey) -> Decryption;
}

#[derive(Debug, Clone, Copy)]
enum NonceSource {
    Random,
    Fixed([u8; NONCE_LEN_BYTES]),
}

/// AES-256-GCM with a 128-bit tag, nonce appended to the record.
#[derive(Debug, Clone, Copy)]
pub struct AesGcmCipher {
    nonces: NonceSource,
}

impl Default for AesGcmCipher {
    fn default() -> Self {
        Self::new()
    }
}

impl AesGcmCipher {
    /// Cipher drawing a fresh random nonce from the system CSPRNG per call.
    pub fn new() -> Self {
        Self {
            nonces: NonceSource::Random,
        }
    }

    /// Cipher that reuses `nonce` for every encryption.
    ///
    /// Makes records reproducible in tests. Never use it for real data:
    /// nonce reuse under one key breaks GCM.
    pub fn with_fixed_nonce(nonce: [u8; NONCE_LEN_BYTES]) -> Self {
        Self {
            nonces: NonceSource::Fixed(nonce),
        }
    }

    fn next_nonce(&self) -> Result<[u8; NONCE_LEN_BYTES]> {
        match self.nonces {
            NonceSource::Fixed(nonce) => Ok(nonce),
            NonceSource::Random => {
                let mut nonce = [0u8; NONCE_LEN_BYTES];
                SystemRandom::new()
                    .fill(&mut nonce)
                    .map_err(|_| VaultError::EncryptionFailed {
                        reason: "failed to generate random nonce".into(),
                    })?;
                Ok(nonce)
            }
        }
    }
}

impl AuthenticatedCipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &str, key: &SessionKey) -> Result<EncryptedRecord> {
        let nonce = self.next_nonce()?;
        let sealed = seal(plaintext.as_bytes(), &nonce, key)?;
        Ok(EncryptedRecord::pack(&sealed, &nonce))
    }

    fn decrypt(&self, record: &EncryptedRecord, key: &SessionKey) -> Decryption {
        let Some((nonce, sealed)) = record.unpack() else {
            tracing::trace!("record is malformed");
            return Decryption::Failed;
        };

        match open(&nonce, &sealed, key) {
            Some(bytes) => match std::str::from_utf8(&bytes) {
                Ok(text) => Decryption::from_plaintext(text.to_owned()),
                Err(_) => Decryption::Failed,
            },
            None => Decryption::Failed,
        }
    }
}

/// Encrypt `plaintext` with AES-256-GCM under `nonce`.
///
/// The returned ciphertext includes the 128-bit authentication tag appended
/// by `ring`.
fn seal(plaintext: &[u8], nonce: &[u8; NONCE_LEN_BYTES], key: &SessionKey) -> Result<Vec<u8>> {
    let unbound_key =
        UnboundKey::new(AEAD_ALG, key.as_bytes()).map_err(|_| VaultError::EncryptionFailed {
            reason: "failed to create AES-256-GCM key".into(),
        })?;

    let mut sealing_key = SealingKey::new(unbound_key, SingleNonce::new(*nonce));

    // `ring` encrypts in-place and appends the authentication tag.
    let mut in_out = Zeroizing::new(plaintext.to_vec());
    sealing_key
        .seal_in_place_append_tag(Aad::empty(), &mut *in_out)
        .map_err(|_| VaultError::EncryptionFailed {
            reason: "seal_in_place failed".into(),
        })?;

    tracing::trace!(
        plaintext_len = plaintext.len(),
        ciphertext_len = in_out.len(),
        "encrypted data"
    );

    Ok(std::mem::take(&mut *in_out))
}

/// Decrypt `ciphertext` (tag included). `None` on any authentication failure.
fn open(
    nonce: &[u8; NONCE_LEN_BYTES],
    ciphertext: &[u8],
    key: &SessionKey,
) -> Option<Zeroizing<Vec<u8>>> {
    let unbound_key = UnboundKey::new(AEAD_ALG, key.as_bytes()).ok()?;
    let mut opening_key = aead::OpeningKey::new(unbound_key, SingleNonce::new(*nonce));

    let mut in_out = Zeroizing::new(ciphertext.to_vec());
    let plaintext = opening_key.open_in_place(Aad::empty(), &mut *in_out).ok()?;

    tracing::trace!(
        ciphertext_len = ciphertext.len(),
        plaintext_len = plaintext.len(),
        "decrypted data"
    );

    Some(Zeroizing::new(plaintext.to_vec()))
}

// ---------------------------------------------------------------------------
// Random generation
// ---------------------------------------------------------------------------

/// Generate `len` cryptographically secure random bytes.
///
/// # Errors
///
/// Returns [`VaultError::Internal`] if the system CSPRNG fails.
pub fn random_bytes(len: usize) -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let mut buf = vec![0u8; len];
    rng.fill(&mut buf)
        .map_err(|_| VaultError::Internal("failed to generate random bytes".into()))?;
    Ok(buf)
}

/// Generate a string of `len` uniformly random decimal digits.
pub fn random_digits(len: usize) -> Result<String> {
    let mut digits = String::with_capacity(len);
    while digits.len() < len {
        for byte in random_bytes(len)? {
            // Reject the top of the range so every digit is equally likely.
            if byte < 250 && digits.len() < len {
                digits.push(char::from(b'0' + byte % 10));
            }
        }
    }
    Ok(digits)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
