//! User profiles and administrator authorization records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ProfileRole, Uid};

/// Field of a profile that must equal the document id.
pub const PROFILE_UID_FIELD: &str = "uid";
/// Field of a profile only administrators may change.
pub const PROFILE_ROLE_FIELD: &str = "role";

/// Body of a `users/{uid}` document, written once at sign-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub uid: Uid,
    pub display_name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub role: ProfileRole,
}

/// Body of an `admins/{uid}` document.
///
/// Existence of the document is what grants administrator privilege; the
/// body is bookkeeping only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationRecord {
    pub granted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}
