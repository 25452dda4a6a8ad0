//! Packed encrypted records.
//!
//! A record is the only unit the vault ever persists:
//!
//! ```text
//! base64(ciphertext || tag) || base64(nonce)
//! ```
//!
//! The 12-byte nonce always encodes to exactly [`NONCE_B64_LEN`] characters
//! (no padding), so the split point is unambiguous without a separator.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::crypto::NONCE_LEN_BYTES;

/// Length of the base64-encoded nonce suffix.
pub const NONCE_B64_LEN: usize = 16;

/// An opaque packed ciphertext as stored in the key-value store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EncryptedRecord(String);

impl EncryptedRecord {
    /// Pack sealed bytes (ciphertext with tag) and their nonce.
    pub fn pack(sealed: &[u8], nonce: &[u8; NONCE_LEN_BYTES]) -> Self {
        let mut packed = BASE64.encode(sealed);
        packed.push_str(&BASE64.encode(nonce));
        Self(packed)
    }

    /// Split the record back into `(nonce, sealed)`.
    ///
    /// Returns `None` for anything that is not a well-formed record.
    pub fn unpack(&self) -> Option<([u8; NONCE_LEN_BYTES], Vec<u8>)> {
        if !self.0.is_ascii() || self.0.len() <= NONCE_B64_LEN {
            return None;
        }

        let (body, suffix) = self.0.split_at(self.0.len() - NONCE_B64_LEN);
        let nonce_bytes = BASE64.decode(suffix).ok()?;
        let nonce: [u8; NONCE_LEN_BYTES] = nonce_bytes.try_into().ok()?;
        let sealed = BASE64.decode(body).ok()?;

        Some((nonce, sealed))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for EncryptedRecord {
    fn from(packed: String) -> Self {
        Self(packed)
    }
}

impl std::fmt::Display for EncryptedRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_suffix_is_sixteen_chars() {
        let record = EncryptedRecord::pack(&[1, 2, 3], &[0xff; NONCE_LEN_BYTES]);
        let packed = record.as_str();
        assert_eq!(&packed[packed.len() - NONCE_B64_LEN..], "////////////////");
        assert_eq!(&packed[..packed.len() - NONCE_B64_LEN], "AQID");
    }

    #[test]
    fn unpack_recovers_parts() {
        let nonce = [7u8; NONCE_LEN_BYTES];
        let record = EncryptedRecord::pack(b"sealed bytes and tag", &nonce);
        let (got_nonce, sealed) = record.unpack().unwrap();
        assert_eq!(got_nonce, nonce);
        assert_eq!(sealed, b"sealed bytes and tag");
    }

    #[test]
    fn unpack_rejects_nonce_only_record() {
        let record = EncryptedRecord::from("AAAAAAAAAAAAAAAA".to_string());
        assert!(record.unpack().is_none());
    }

    #[test]
    fn unpack_rejects_bad_base64() {
        let record = EncryptedRecord::from("@@@@AAAAAAAAAAAAAAAA".to_string());
        assert!(record.unpack().is_none());
    }
}
