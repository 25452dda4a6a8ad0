//! The credential keeper: encrypted, PIN-gated credential storage.
//!
//! [`CredentialKeeper`] is the only type UI collaborators talk to. It keeps
//! an in-memory mirror of the encrypted records, encrypts on write and
//! decrypts on read with the session key held by its [`PinAuthenticator`].
//!
//! # Lifecycle
//!
//! 1. [`CredentialKeeper::new`] wires the capabilities.
//! 2. [`CredentialKeeper::load`] fills the mirror from storage. Await it
//!    before the first PIN attempt.
//! 3. [`CredentialKeeper::test_pin`] (or [`CredentialKeeper::enroll`] on a
//!    fresh vault) opens a session.
//! 4. [`CredentialKeeper::secure`] and
//!    [`CredentialKeeper::decrypted_credentials`] write and read.
//!
//! # Storage layout
//!
//! Each field lives at `key_prefix + hash(scope_name + field_name)`. The
//! value is a packed [`EncryptedRecord`]; nothing else is persisted.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::try_join_all;
use tokio::sync::RwLock;

use crate::auth::{self, PinAuthenticator, PinCheck};
use crate::config::VaultConfig;
use crate::crypto::{self, AesGcmCipher, AuthenticatedCipher, Decryption, HashFunction, Sha256Hasher};
use crate::error::{Result, VaultError};
use crate::record::EncryptedRecord;
use crate::scope::{CredentialField, CredentialScope, CredentialSet};
use crate::storage::KeyValueStore;

/// Raw records mirrored from storage.
#[derive(Debug, Default)]
struct Mirror {
    /// Set once [`CredentialKeeper::load`] has run; until then reads go to
    /// storage.
    loaded: bool,
    records: BTreeMap<CredentialField, EncryptedRecord>,
}

/// Encrypted credential vault unlocked by a numeric PIN.
///
/// # Example
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use keeper_vault::{CredentialKeeper, CredentialScope, FileStore, VaultConfig};
/// # async fn example() -> keeper_vault::Result<()> {
/// let config = VaultConfig::default();
/// let store = Arc::new(FileStore::new(&config.storage_path));
/// let keeper = CredentialKeeper::new(store, config);
/// keeper.load().await?;
///
/// if keeper.test_pin("1234").await? {
///     let sellsy = keeper.decrypted_credentials(CredentialScope::Sellsy).await?;
///     println!("{} fields set", sellsy.entries().len());
/// }
/// # Ok(())
/// # }
/// ```
pub struct CredentialKeeper {
    config: VaultConfig,
    hasher: Arc<dyn HashFunction>,
    cipher: Arc<dyn AuthenticatedCipher>,
    store: Arc<dyn KeyValueStore>,
    auth: PinAuthenticator,
    mirror: RwLock<Mirror>,
}

impl CredentialKeeper {
    /// Create a keeper over `store` with SHA-256 addressing and AES-256-GCM.
    pub fn new(store: Arc<dyn KeyValueStore>, config: VaultConfig) -> Self {
        Self::with_capabilities(
            store,
            Arc::new(Sha256Hasher),
            Arc::new(AesGcmCipher::new()),
            config,
        )
    }

    /// Create a keeper with explicit hashing and cipher implementations.
    pub fn with_capabilities(
        store: Arc<dyn KeyValueStore>,
        hasher: Arc<dyn HashFunction>,
        cipher: Arc<dyn AuthenticatedCipher>,
        config: VaultConfig,
    ) -> Self {
        let auth = PinAuthenticator::new(
            Arc::clone(&hasher),
            Arc::clone(&cipher),
            config.sentinel_tag.clone(),
            config.max_pin_attempts,
        );

        Self {
            config,
            hasher,
            cipher,
            store,
            auth,
            mirror: RwLock::new(Mirror::default()),
        }
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Storage key of `field`.
    pub fn address(&self, field: CredentialField) -> String {
        format!(
            "{}{}",
            self.config.key_prefix,
            self.hasher.hash(&field.address_material())
        )
    }

    // -- Loading ------------------------------------------------------------

    /// Fill the mirror with every stored record, without decrypting.
    ///
    /// All fields are fetched concurrently. Replaces whatever the mirror
    /// held before.
    pub async fn load(&self) -> Result<()> {
        let fields: Vec<CredentialField> = CredentialScope::ALL
            .iter()
            .flat_map(|scope| scope.fields())
            .collect();

        let fetched = try_join_all(fields.into_iter().map(|field| async move {
            let value = self.store.get(&self.address(field)).await?;
            Ok::<_, VaultError>((field, value))
        }))
        .await?;

        let records: BTreeMap<_, _> = fetched
            .into_iter()
            .filter_map(|(field, value)| value.map(|v| (field, EncryptedRecord::from(v))))
            .collect();

        tracing::debug!(records = records.len(), "loaded credential records");

        let mut mirror = self.mirror.write().await;
        mirror.records = records;
        mirror.loaded = true;
        Ok(())
    }

    /// The raw record for `field`, from the mirror once loaded, from storage
    /// before that.
    async fn record(&self, field: CredentialField) -> Result<Option<EncryptedRecord>> {
        {
            let mirror = self.mirror.read().await;
            if mirror.loaded {
                return Ok(mirror.records.get(&field).cloned());
            }
        }

        let value = self.store.get(&self.address(field)).await?;
        Ok(value.map(EncryptedRecord::from))
    }

    /// Persist `record`, then mirror it. A failed write leaves the mirror
    /// untouched.
    async fn write_record(&self, field: CredentialField, record: EncryptedRecord) -> Result<()> {
        self.store.set(&self.address(field), record.as_str()).await?;
        self.mirror.write().await.records.insert(field, record);
        Ok(())
    }

    // -- PIN ----------------------------------------------------------------

    /// Try to unlock the vault with `pin`.
    ///
    /// Returns `true` on success. The failure that exhausts the attempt limit
    /// wipes every stored credential before returning `false`; later
    /// attempts return `false` and leave storage alone.
    pub async fn test_pin(&self, pin: &str) -> Result<bool> {
        let sentinel = self.record(CredentialField::Sentinel).await?;

        match self.auth.check(pin, sentinel.as_ref()).await? {
            PinCheck::Unlocked => Ok(true),
            PinCheck::Rejected { .. } | PinCheck::Blocked => Ok(false),
            PinCheck::LockedOut => {
                self.reset().await?;
                Ok(false)
            }
        }
    }

    /// PIN attempts left before the vault wipes itself.
    pub fn remaining_pin_tests(&self) -> u32 {
        self.auth.remaining_attempts()
    }

    /// Set up a fresh vault protected by `pin` and open a session.
    ///
    /// Writes the sentinel record that later PIN attempts are checked
    /// against.
    ///
    /// # Errors
    ///
    /// - [`VaultError::InvalidPin`] if `pin` is not 4 to 12 digits.
    /// - [`VaultError::LockedOut`] after a lockout in this process.
    /// - [`VaultError::AlreadyEnrolled`] if a sentinel already exists.
    pub async fn enroll(&self, pin: &str) -> Result<()> {
        auth::validate_pin(pin)?;

        if self.auth.is_locked_out() {
            return Err(VaultError::LockedOut);
        }
        if self.is_enrolled().await? {
            return Err(VaultError::AlreadyEnrolled);
        }

        let key = self.auth.key_for_pin(pin)?;
        let nonce = crypto::random_bytes(8)?;
        let marker: String = nonce.iter().map(|b| format!("{b:02x}")).collect();
        let sentinel = self
            .cipher
            .encrypt(&format!("{marker}{}", self.config.sentinel_tag), &key)?;

        self.write_record(CredentialField::Sentinel, sentinel).await?;
        self.auth.open_session(key).await;

        tracing::info!("enrolled new PIN");
        Ok(())
    }

    /// Whether a PIN sentinel exists.
    pub async fn is_enrolled(&self) -> Result<bool> {
        Ok(self.record(CredentialField::Sentinel).await?.is_some())
    }

    pub async fn is_unlocked(&self) -> bool {
        self.auth.is_unlocked().await
    }

    pub fn is_locked_out(&self) -> bool {
        self.auth.is_locked_out()
    }

    /// Forget the session key. Stored data is untouched.
    pub async fn lock(&self) {
        self.auth.lock().await;
        tracing::info!("vault locked");
    }

    // -- Credentials --------------------------------------------------------

    /// Encrypt and store every non-blank field of `credentials`.
    ///
    /// Values are trimmed before encryption. Blank fields are skipped, so an
    /// empty value never erases a stored one. Fields are written
    /// concurrently; if one write fails the others may already be stored.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NoSessionKey`] if the vault is not unlocked.
    pub async fn secure(&self, credentials: &CredentialSet) -> Result<()> {
        let key = self.auth.session_key().await?;

        let writes: Vec<_> = credentials
            .entries()
            .into_iter()
            .filter_map(|(field, value)| {
                let value = value.trim();
                (!value.is_empty()).then_some((field, value))
            })
            .collect();

        let written = writes.len();
        try_join_all(writes.into_iter().map(|(field, value)| {
            let key = &key;
            async move {
                let record = self.cipher.encrypt(value, key)?;
                self.write_record(field, record).await
            }
        }))
        .await?;

        tracing::debug!(scope = %credentials.scope(), fields = written, "secured credentials");
        Ok(())
    }

    /// Decrypt every stored field of `scope`.
    ///
    /// Unset fields are absent from the result. A record that fails to
    /// decrypt is skipped and logged.
    ///
    /// # Errors
    ///
    /// - [`VaultError::InvalidScope`] for [`CredentialScope::Test`].
    /// - [`VaultError::NoSessionKey`] if the vault is not unlocked.
    pub async fn decrypted_credentials(&self, scope: CredentialScope) -> Result<CredentialSet> {
        let mut credentials = CredentialSet::empty(scope).ok_or_else(|| VaultError::InvalidScope {
            scope: scope.to_string(),
        })?;
        let key = self.auth.session_key().await?;

        for field in scope.fields() {
            let Some(record) = self.record(field).await? else {
                continue;
            };

            match self.cipher.decrypt(&record, &key) {
                Decryption::Plaintext(text) => credentials.set(field, text),
                Decryption::Empty => credentials.set(field, String::new()),
                Decryption::Failed => {
                    tracing::warn!(%scope, field = field.as_str(), "stored credential failed to decrypt");
                }
            }
        }

        Ok(credentials)
    }

    /// Fields of `scope` that hold a record. Does not need the session key
    /// and decrypts nothing.
    pub async fn stored_fields(&self, scope: CredentialScope) -> Result<Vec<CredentialField>> {
        let mut stored = Vec::new();
        for field in scope.fields() {
            if self.record(field).await?.is_some() {
                stored.push(field);
            }
        }
        Ok(stored)
    }

    /// Delete every stored credential, clear the mirror, and forget the
    /// session key.
    ///
    /// Removes every storage key carrying the configured prefix, including
    /// ones this build has no field for. The attempt counter is untouched.
    pub async fn reset(&self) -> Result<()> {
        let keys: Vec<String> = self
            .store
            .keys()
            .await?
            .into_iter()
            .filter(|key| key.starts_with(&self.config.key_prefix))
            .collect();

        for key in &keys {
            self.store.remove(key).await?;
        }

        {
            let mut mirror = self.mirror.write().await;
            mirror.records.clear();
            mirror.loaded = true;
        }
        self.auth.lock().await;

        tracing::info!(removed = keys.len(), "vault reset");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use crate::crypto::NONCE_LEN_BYTES;
    use crate::scope::{KlaviyoCredentials, SellsyCredentials, SellsyField};
    use crate::storage::MemoryStore;

    /// Memory store whose writes can be made to fail.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_writes: AtomicBool,
    }

    #[async_trait]
    impl KeyValueStore for FlakyStore {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(VaultError::Storage {
                    reason: "disk full".into(),
                });
            }
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key).await
        }

        async fn keys(&self) -> Result<Vec<String>> {
            self.inner.keys().await
        }
    }

    async fn keeper_with(store: Arc<MemoryStore>) -> CredentialKeeper {
        let keeper = CredentialKeeper::with_capabilities(
            store,
            Arc::new(Sha256Hasher),
            Arc::new(AesGcmCipher::with_fixed_nonce([3; NONCE_LEN_BYTES])),
            VaultConfig::default(),
        );
        keeper.load().await.unwrap();
        keeper
    }

    fn sellsy(token: &str, secret: &str) -> CredentialSet {
        CredentialSet::Sellsy(SellsyCredentials {
            consumer_token: Some(token.into()),
            consumer_secret: Some(secret.into()),
            ..Default::default()
        })
    }

    #[test]
    fn address_is_prefixed_hash() {
        let keeper = CredentialKeeper::new(Arc::new(MemoryStore::new()), VaultConfig::default());
        let field = CredentialField::Sellsy(SellsyField::ConsumerToken);
        assert_eq!(
            keeper.address(field),
            format!("credential-{}", Sha256Hasher.hash("sellsyconsumerToken"))
        );
    }

    #[tokio::test]
    async fn enroll_then_unlock_in_new_process() {
        let store = Arc::new(MemoryStore::new());
        let keeper = keeper_with(Arc::clone(&store)).await;
        keeper.enroll("1234").await.unwrap();
        assert!(keeper.is_unlocked().await);
        assert_eq!(store.snapshot().await.len(), 1);

        let restarted = keeper_with(store).await;
        assert!(restarted.is_enrolled().await.unwrap());
        assert!(!restarted.is_unlocked().await);
        assert!(restarted.test_pin("1234").await.unwrap());
        assert_eq!(restarted.remaining_pin_tests(), 3);
    }

    #[tokio::test]
    async fn enroll_twice_is_rejected() {
        let keeper = keeper_with(Arc::new(MemoryStore::new())).await;
        keeper.enroll("1234").await.unwrap();
        assert!(matches!(
            keeper.enroll("5678").await,
            Err(VaultError::AlreadyEnrolled)
        ));
        assert!(matches!(
            keeper.enroll("12").await,
            Err(VaultError::InvalidPin { .. })
        ));
    }

    #[tokio::test]
    async fn secure_requires_session() {
        let keeper = keeper_with(Arc::new(MemoryStore::new())).await;
        assert!(matches!(
            keeper.secure(&sellsy("abc", "def")).await,
            Err(VaultError::NoSessionKey)
        ));
        assert!(matches!(
            keeper.decrypted_credentials(CredentialScope::Sellsy).await,
            Err(VaultError::NoSessionKey)
        ));
    }

    #[tokio::test]
    async fn test_scope_is_invalid_for_reads() {
        let keeper = keeper_with(Arc::new(MemoryStore::new())).await;
        keeper.enroll("1234").await.unwrap();
        assert!(matches!(
            keeper.decrypted_credentials(CredentialScope::Test).await,
            Err(VaultError::InvalidScope { .. })
        ));
    }

    #[tokio::test]
    async fn values_are_trimmed_and_blank_values_keep_old_data() {
        let keeper = keeper_with(Arc::new(MemoryStore::new())).await;
        keeper.enroll("1234").await.unwrap();

        keeper.secure(&sellsy("  abc  ", "s3cret")).await.unwrap();
        keeper.secure(&sellsy("xyz", "   ")).await.unwrap();

        let CredentialSet::Sellsy(read) =
            keeper.decrypted_credentials(CredentialScope::Sellsy).await.unwrap()
        else {
            panic!("expected sellsy credentials");
        };
        assert_eq!(read.consumer_token.as_deref(), Some("xyz"));
        assert_eq!(read.consumer_secret.as_deref(), Some("s3cret"));
        assert_eq!(read.user_token, None);
    }

    #[tokio::test]
    async fn reads_fall_back_to_storage_before_load() {
        let store = Arc::new(MemoryStore::new());
        let writer = keeper_with(Arc::clone(&store)).await;
        writer.enroll("1234").await.unwrap();
        writer
            .secure(&CredentialSet::Klaviyo(KlaviyoCredentials {
                public_api_key: Some("pk_live".into()),
                private_api_key: None,
            }))
            .await
            .unwrap();

        // No load() on this one.
        let reader = CredentialKeeper::new(store, VaultConfig::default());
        assert!(reader.test_pin("1234").await.unwrap());
        let read = reader
            .decrypted_credentials(CredentialScope::Klaviyo)
            .await
            .unwrap();
        assert_eq!(
            read,
            CredentialSet::Klaviyo(KlaviyoCredentials {
                public_api_key: Some("pk_live".into()),
                private_api_key: None,
            })
        );
    }

    #[tokio::test]
    async fn undecryptable_record_is_omitted() {
        let store = Arc::new(MemoryStore::new());
        let keeper = keeper_with(Arc::clone(&store)).await;
        keeper.enroll("1234").await.unwrap();
        keeper.secure(&sellsy("abc", "def")).await.unwrap();

        let secret_address = keeper.address(CredentialField::Sellsy(SellsyField::ConsumerSecret));
        store
            .set(&secret_address, "garbagegarbageAAAAAAAAAAAAAAAA")
            .await
            .unwrap();
        keeper.load().await.unwrap();

        let read = keeper
            .decrypted_credentials(CredentialScope::Sellsy)
            .await
            .unwrap();
        assert_eq!(read.entries().len(), 1);
    }

    #[tokio::test]
    async fn reset_removes_prefixed_keys_only() {
        let store = Arc::new(MemoryStore::with_entries([
            ("credential-orphan", "x"),
            ("theme", "dark"),
        ]));
        let keeper = keeper_with(Arc::clone(&store)).await;
        keeper.enroll("1234").await.unwrap();
        keeper.secure(&sellsy("abc", "def")).await.unwrap();

        keeper.reset().await.unwrap();

        let remaining: Vec<_> = store.snapshot().await.into_keys().collect();
        assert_eq!(remaining, ["theme"]);
        assert!(!keeper.is_unlocked().await);
        assert!(!keeper.is_enrolled().await.unwrap());
    }

    #[tokio::test]
    async fn stored_fields_lists_without_unlocking() {
        let store = Arc::new(MemoryStore::new());
        let keeper = keeper_with(Arc::clone(&store)).await;
        keeper.enroll("1234").await.unwrap();
        keeper.secure(&sellsy("abc", "")).await.unwrap();

        let restarted = keeper_with(store).await;
        assert_eq!(
            restarted.stored_fields(CredentialScope::Sellsy).await.unwrap(),
            [CredentialField::Sellsy(SellsyField::ConsumerToken)]
        );
        assert!(
            restarted
                .stored_fields(CredentialScope::Klaviyo)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn lock_keeps_data() {
        let keeper = keeper_with(Arc::new(MemoryStore::new())).await;
        keeper.enroll("1234").await.unwrap();
        keeper.secure(&sellsy("abc", "def")).await.unwrap();

        keeper.lock().await;
        assert!(!keeper.is_unlocked().await);
        assert!(keeper.test_pin("1234").await.unwrap());
        assert_eq!(
            keeper
                .decrypted_credentials(CredentialScope::Sellsy)
                .await
                .unwrap(),
            sellsy("abc", "def")
        );
    }

    #[tokio::test]
    async fn reset_keeps_attempt_counter() {
        let keeper = keeper_with(Arc::new(MemoryStore::new())).await;
        keeper.enroll("1234").await.unwrap();
        assert!(!keeper.test_pin("0000").await.unwrap());

        keeper.reset().await.unwrap();
        assert_eq!(keeper.remaining_pin_tests(), 2);

        keeper.enroll("5678").await.unwrap();
        keeper.secure(&sellsy("abc", "def")).await.unwrap();
        assert!(!keeper.test_pin("0000").await.unwrap());
        assert!(!keeper.test_pin("1111").await.unwrap());

        assert!(keeper.is_locked_out());
        assert!(!keeper.is_enrolled().await.unwrap());
        assert!(
            keeper
                .stored_fields(CredentialScope::Sellsy)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn failed_write_leaves_mirror_untouched() {
        let store = Arc::new(FlakyStore::default());
        let keeper = CredentialKeeper::new(Arc::clone(&store) as _, VaultConfig::default());
        keeper.load().await.unwrap();
        keeper.enroll("1234").await.unwrap();
        keeper.secure(&sellsy("abc", "def")).await.unwrap();

        store.fail_writes.store(true, Ordering::SeqCst);
        assert!(matches!(
            keeper.secure(&sellsy("new", "new")).await,
            Err(VaultError::Storage { .. })
        ));

        assert_eq!(
            keeper
                .decrypted_credentials(CredentialScope::Sellsy)
                .await
                .unwrap(),
            sellsy("abc", "def")
        );
    }

    #[tokio::test]
    async fn lockout_wipes_only_once() {
        let store = Arc::new(MemoryStore::new());
        let keeper = keeper_with(Arc::clone(&store)).await;
        keeper.enroll("1234").await.unwrap();
        for _ in 0..3 {
            assert!(!keeper.test_pin("0000").await.unwrap());
        }
        assert!(store.snapshot().await.is_empty());

        // Another process writes to the shared store after the wipe.
        store.set("credential-other", "data").await.unwrap();

        assert!(!keeper.test_pin("1234").await.unwrap());
        assert!(!keeper.test_pin("0000").await.unwrap());
        assert_eq!(
            store.snapshot().await.get("credential-other").map(String::as_str),
            Some("data")
        );
    }

    #[tokio::test]
    async fn enroll_refused_after_lockout() {
        let keeper = keeper_with(Arc::new(MemoryStore::new())).await;
        for _ in 0..3 {
            assert!(!keeper.test_pin("0000").await.unwrap());
        }
        assert!(keeper.is_locked_out());
        assert!(matches!(
            keeper.enroll("1234").await,
            Err(VaultError::LockedOut)
        ));
    }
}
