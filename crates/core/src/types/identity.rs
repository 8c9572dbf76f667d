//! Identities issued by the identity provider.

use serde::{Deserialize, Serialize};

use super::{Email, Uid};

/// An authenticated user as issued by the identity provider.
///
/// Other records refer to an identity by its [`Uid`]; they never copy it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: Uid,
    pub email: Email,
    pub display_name: Option<String>,
}

/// Opaque bearer token proving an identity to the document and blob stores.
///
/// `Debug` is redacted so tokens never end up in logs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdToken(String);

impl IdToken {
    /// Wrap a raw token string.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The raw token, for handing to a verifier.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for IdToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("IdToken([REDACTED])")
    }
}
