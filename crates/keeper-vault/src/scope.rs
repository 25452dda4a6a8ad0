//! Credential scopes, their fields, and plaintext credential sets.
//!
//! Every scope has a fixed, ordered list of fields known at compile time.
//! Storage addresses are derived from the wire names of a scope and a field,
//! so renaming any `as_str` value below orphans existing records.

use serde::Serialize;

// ---------------------------------------------------------------------------
// Scopes
// ---------------------------------------------------------------------------

/// A namespace of related credential fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CredentialScope {
    /// Holds the PIN sentinel only.
    Test,
    Sellsy,
    Klaviyo,
}

impl CredentialScope {
    pub const ALL: [CredentialScope; 3] = [Self::Test, Self::Sellsy, Self::Klaviyo];

    /// The name hashed into storage addresses.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Test => "test",
            Self::Sellsy => "sellsy",
            Self::Klaviyo => "klaviyo",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "test" => Some(Self::Test),
            "sellsy" => Some(Self::Sellsy),
            "klaviyo" => Some(Self::Klaviyo),
            _ => None,
        }
    }

    /// Every field of this scope, in declaration order.
    pub fn fields(&self) -> Vec<CredentialField> {
        match self {
            Self::Test => vec![CredentialField::Sentinel],
            Self::Sellsy => SellsyField::ALL
                .into_iter()
                .map(CredentialField::Sellsy)
                .collect(),
            Self::Klaviyo => KlaviyoField::ALL
                .into_iter()
                .map(CredentialField::Klaviyo)
                .collect(),
        }
    }
}

impl std::fmt::Display for CredentialScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Fields
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SellsyField {
    ConsumerToken,
    ConsumerSecret,
    UserToken,
    UserSecret,
}

impl SellsyField {
    pub const ALL: [SellsyField; 4] = [
        Self::ConsumerToken,
        Self::ConsumerSecret,
        Self::UserToken,
        Self::UserSecret,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConsumerToken => "consumerToken",
            Self::ConsumerSecret => "consumerSecret",
            Self::UserToken => "userToken",
            Self::UserSecret => "userSecret",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KlaviyoField {
    PublicApiKey,
    PrivateApiKey,
}

impl KlaviyoField {
    pub const ALL: [KlaviyoField; 2] = [Self::PublicApiKey, Self::PrivateApiKey];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PublicApiKey => "publicApiKey",
            Self::PrivateApiKey => "privateApiKey",
        }
    }
}

/// One addressable slot in the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CredentialField {
    /// The single, unnamed field of [`CredentialScope::Test`].
    Sentinel,
    Sellsy(SellsyField),
    Klaviyo(KlaviyoField),
}

impl CredentialField {
    pub fn scope(&self) -> CredentialScope {
        match self {
            Self::Sentinel => CredentialScope::Test,
            Self::Sellsy(_) => CredentialScope::Sellsy,
            Self::Klaviyo(_) => CredentialScope::Klaviyo,
        }
    }

    /// The field's wire name. Empty for the sentinel.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sentinel => "",
            Self::Sellsy(field) => field.as_str(),
            Self::Klaviyo(field) => field.as_str(),
        }
    }

    /// Text hashed into this field's storage address: scope name followed by
    /// field name, no separator.
    pub fn address_material(&self) -> String {
        format!("{}{}", self.scope().as_str(), self.as_str())
    }

    /// Look up a field of `scope` by wire name.
    pub fn parse(scope: CredentialScope, name: &str) -> Option<Self> {
        scope.fields().into_iter().find(|field| field.as_str() == name)
    }
}

// ---------------------------------------------------------------------------
// Plaintext credential sets
// ---------------------------------------------------------------------------

/// Sellsy API credentials. `None` means unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SellsyCredentials {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumer_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumer_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_secret: Option<String>,
}

impl SellsyCredentials {
    fn slot(&self, field: SellsyField) -> Option<&str> {
        match field {
            SellsyField::ConsumerToken => self.consumer_token.as_deref(),
            SellsyField::ConsumerSecret => self.consumer_secret.as_deref(),
            SellsyField::UserToken => self.user_token.as_deref(),
            SellsyField::UserSecret => self.user_secret.as_deref(),
        }
    }

    fn slot_mut(&mut self, field: SellsyField) -> &mut Option<String> {
        match field {
            SellsyField::ConsumerToken => &mut self.consumer_token,
            SellsyField::ConsumerSecret => &mut self.consumer_secret,
            SellsyField::UserToken => &mut self.user_token,
            SellsyField::UserSecret => &mut self.user_secret,
        }
    }
}

/// Klaviyo API keys. `None` means unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KlaviyoCredentials {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_api_key: Option<String>,
}

impl KlaviyoCredentials {
    fn slot(&self, field: KlaviyoField) -> Option<&str> {
        match field {
            KlaviyoField::PublicApiKey => self.public_api_key.as_deref(),
            KlaviyoField::PrivateApiKey => self.private_api_key.as_deref(),
        }
    }

    fn slot_mut(&mut self, field: KlaviyoField) -> &mut Option<String> {
        match field {
            KlaviyoField::PublicApiKey => &mut self.public_api_key,
            KlaviyoField::PrivateApiKey => &mut self.private_api_key,
        }
    }
}

/// Plaintext credentials for one scope, as exchanged with the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum CredentialSet {
    Sellsy(SellsyCredentials),
    Klaviyo(KlaviyoCredentials),
}

impl CredentialSet {
    /// An empty set for `scope`, or `None` for [`CredentialScope::Test`].
    pub fn empty(scope: CredentialScope) -> Option<Self> {
        match scope {
            CredentialScope::Test => None,
            CredentialScope::Sellsy => Some(Self::Sellsy(SellsyCredentials::default())),
            CredentialScope::Klaviyo => Some(Self::Klaviyo(KlaviyoCredentials::default())),
        }
    }

    pub fn scope(&self) -> CredentialScope {
        match self {
            Self::Sellsy(_) => CredentialScope::Sellsy,
            Self::Klaviyo(_) => CredentialScope::Klaviyo,
        }
    }

    /// The value stored in `field`, if set and belonging to this scope.
    pub fn get(&self, field: CredentialField) -> Option<&str> {
        match (self, field) {
            (Self::Sellsy(creds), CredentialField::Sellsy(f)) => creds.slot(f),
            (Self::Klaviyo(creds), CredentialField::Klaviyo(f)) => creds.slot(f),
            _ => None,
        }
    }

    /// Set `field` to `value`. Fields of another scope are ignored.
    pub fn set(&mut self, field: CredentialField, value: String) {
        match (self, field) {
            (Self::Sellsy(creds), CredentialField::Sellsy(f)) => *creds.slot_mut(f) = Some(value),
            (Self::Klaviyo(creds), CredentialField::Klaviyo(f)) => *creds.slot_mut(f) = Some(value),
            _ => {}
        }
    }

    /// All set fields with their values, in declaration order.
    pub fn entries(&self) -> Vec<(CredentialField, &str)> {
        self.scope()
            .fields()
            .into_iter()
            .filter_map(|field| self.get(field).map(|value| (field, value)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}
