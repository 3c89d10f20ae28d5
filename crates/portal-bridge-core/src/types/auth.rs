//! Authentication state published by the host shell.
//!
//! `AuthState` is an immutable snapshot. The host never edits one in place;
//! every login, logout or token refresh builds a new value and the store
//! swaps it in, so subscribers can compare snapshots by pointer or by value.

use crate::constants::{GUEST_DISPLAY_NAME, ROLE_ADMIN, ROLE_SELLER, ROLE_SUPER_ADMIN};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Profile claims of the signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Subject (user uuid)
    pub sub: String,
    /// Email address
    pub email: String,
    /// Login name
    pub username: Option<String>,
    /// Real name
    pub name: Option<String>,
    /// Nickname shown in the portal
    pub nickname: Option<String>,
    /// Avatar url
    pub picture: Option<String>,
}

/// What the signed-in user is allowed to do
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAuthority {
    /// Granted role strings, e.g. `ROLE_USER`
    pub roles: BTreeSet<String>,
    /// OAuth scopes of the access token
    pub scopes: Vec<String>,
    /// Service id to membership tier
    pub memberships: BTreeMap<String, String>,
}

/// Access token bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    /// Bearer token handed to API clients
    pub access_token: String,
    /// When the token was issued
    pub issued_at: DateTime<Utc>,
    /// When the token stops being valid, if known
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenMetadata {
    /// Create token metadata issued now with no known expiry
    pub fn issued_now(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            issued_at: Utc::now(),
            expires_at: None,
        }
    }

    /// Whether the token is past its expiry at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

/// A signed-in portal user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalUser {
    /// Profile claims
    pub profile: UserProfile,
    /// Roles, scopes and memberships
    pub authority: UserAuthority,
    /// Token metadata
    pub token: TokenMetadata,
}

impl PortalUser {
    /// User known only by email, with `roles` and a token issued now
    pub fn basic<I, S>(email: impl Into<String>, roles: I, access_token: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let email = email.into();
        Self {
            profile: UserProfile {
                sub: email.clone(),
                email,
                username: None,
                name: None,
                nickname: None,
                picture: None,
            },
            authority: UserAuthority {
                roles: roles.into_iter().map(Into::into).collect(),
                ..UserAuthority::default()
            },
            token: TokenMetadata::issued_now(access_token),
        }
    }

    /// Name shown in the UI: nickname, then username, then name, then email
    pub fn display_name(&self) -> String {
        let p = &self.profile;
        [&p.nickname, &p.username, &p.name]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
            .cloned()
            .unwrap_or_else(|| p.email.clone())
    }
}

/// Snapshot of the canonical authentication state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthState {
    /// Whether a user is signed in
    pub is_authenticated: bool,
    /// Name shown in the UI (`Guest` when anonymous)
    pub display_name: String,
    /// Portal administrator
    pub is_admin: bool,
    /// Seller console access
    pub is_seller: bool,
    /// Granted roles
    pub roles: BTreeSet<String>,
    /// Service id to membership tier
    pub memberships: BTreeMap<String, String>,
    /// Signed-in user, if any
    pub user: Option<PortalUser>,
}

impl AuthState {
    /// The anonymous default every consumer falls back to
    pub fn anonymous() -> Self {
        Self {
            is_authenticated: false,
            display_name: GUEST_DISPLAY_NAME.to_string(),
            is_admin: false,
            is_seller: false,
            roles: BTreeSet::new(),
            memberships: BTreeMap::new(),
            user: None,
        }
    }

    /// Derive a complete snapshot from a signed-in user
    pub fn from_user(user: PortalUser) -> Self {
        let roles = user.authority.roles.clone();
        let has = |role: &str| roles.contains(role);
        Self {
            is_authenticated: true,
            display_name: user.display_name(),
            is_admin: has(ROLE_ADMIN) || has(ROLE_SUPER_ADMIN),
            is_seller: has(ROLE_SELLER),
            memberships: user.authority.memberships.clone(),
            roles,
            user: Some(user),
        }
    }

    /// Whether the role is granted
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Whether at least one of the roles is granted
    pub fn has_any_role<S: AsRef<str>>(&self, roles: &[S]) -> bool {
        roles.iter().any(|r| self.has_role(r.as_ref()))
    }

    /// Whether the user administers the given service
    pub fn is_service_admin(&self, service: &str) -> bool {
        self.has_role(ROLE_SUPER_ADMIN)
            || self.has_role(&format!("ROLE_{}_ADMIN", service.to_uppercase()))
    }

    /// Current bearer token, if signed in
    pub fn access_token(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.token.access_token.as_str())
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self::anonymous()
    }
}
