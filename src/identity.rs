//! Who is editing.
//!
//! The current user stamps `ownerId` on created documents. Without a user the
//! session is read-only.

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
}

impl User {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

pub trait IdentityProvider: Send + Sync {
    /// The signed-in user, or `None` for an anonymous visitor.
    fn current_user(&self) -> Option<User>;
}

/// Identity fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    user: Option<User>,
}

impl StaticIdentity {
    pub fn anonymous() -> Self {
        Self {
            user: None,
        }
    }

    pub fn user(user: User) -> Self {
        Self {
            user: Some(user),
        }
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user(&self) -> Option<User> {
        self.user.clone()
    }
}
