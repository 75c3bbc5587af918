//! Identity handles reported by the identity provider

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier shared by the identity provider and the `users` table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wrap a non-empty id
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            None
        } else {
            Some(Self(id))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Provider-side profile metadata (OAuth claims)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

impl UserMetadata {
    /// `full_name`, then `name`
    pub fn display_name(&self) -> Option<&str> {
        non_empty(&self.full_name).or_else(|| non_empty(&self.name))
    }

    /// `avatar_url`, then `picture`
    pub fn avatar(&self) -> Option<&str> {
        non_empty(&self.avatar_url).or_else(|| non_empty(&self.picture))
    }
}

/// A confirmed user as reported by the identity provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: UserId,
    pub email: Option<String>,
    pub metadata: UserMetadata,
}

impl Identity {
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            email: None,
            metadata: UserMetadata::default(),
        }
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    pub fn with_metadata(mut self, metadata: UserMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A handle emitted mid-OAuth, before the provider knows the user id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingIdentity {
    pub email: Option<String>,
}

/// The "current user" as reported by the identity provider.
///
/// Only `Authenticated` carries a [`UserId`]; code that needs an id takes
/// an [`Identity`], so a pending handle can never reach a lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawUser", into = "RawUser")]
pub enum IdentityHandle {
    Authenticated(Identity),
    Pending(PendingIdentity),
}

impl IdentityHandle {
    /// The identity, when the handle carries an id
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            IdentityHandle::Authenticated(identity) => Some(identity),
            IdentityHandle::Pending(_) => None,
        }
    }

    pub fn id(&self) -> Option<&UserId> {
        self.identity().map(|identity| &identity.id)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, IdentityHandle::Pending(_))
    }
}

impl From<Identity> for IdentityHandle {
    fn from(identity: Identity) -> Self {
        IdentityHandle::Authenticated(identity)
    }
}

/// Wire shape of a provider user object
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawUser {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(default)]
    user_metadata: Option<UserMetadata>,
}

impl From<RawUser> for IdentityHandle {
    fn from(raw: RawUser) -> Self {
        match raw.id.and_then(UserId::new) {
            Some(id) => IdentityHandle::Authenticated(Identity {
                id,
                email: raw.email.filter(|e| !e.is_empty()),
                metadata: raw.user_metadata.unwrap_or_default(),
            }),
            None => IdentityHandle::Pending(PendingIdentity { email: raw.email }),
        }
    }
}

impl From<IdentityHandle> for RawUser {
    fn from(handle: IdentityHandle) -> Self {
        match handle {
            IdentityHandle::Authenticated(identity) => RawUser {
                id: Some(identity.id.0),
                email: identity.email,
                user_metadata: Some(identity.metadata),
            },
            IdentityHandle::Pending(pending) => RawUser {
                id: None,
                email: pending.email,
                user_metadata: None,
            },
        }
    }
}
