use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity assigned by the external identity provider (the `clerk_id` column)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
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

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve the caller from a bearer credential. `None` means unauthenticated.
    async fn current_user_id(&self, bearer: Option<&str>) -> Option<UserId>;

    /// Like `current_user_id`, but only for operators allowed to settle orders by hand
    async fn current_admin_id(&self, _bearer: Option<&str>) -> Option<UserId> {
        None
    }
}
