//! Scoped access tokens.
//!
//! Account-wide and video-scoped tokens are distinct types so a call that
//! touches one video cannot be handed an account token, and listing/search
//! calls cannot be handed a video token. Tokens are minted on every call and
//! never cached.

use crate::error::Result;
use crate::gateway::Gateway;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Permission requested for a token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Read,
    Edit,
}

impl Permission {
    /// Value of the `allowEdit` query parameter
    pub fn allow_edit(&self) -> &'static str {
        match self {
            Permission::Read => "false",
            Permission::Edit => "true",
        }
    }
}

/// Bearer token scoped to the whole account
#[derive(Clone, PartialEq, Eq)]
pub struct AccountToken {
    value: String,
    permission: Permission,
}

impl AccountToken {
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn permission(&self) -> Permission {
        self.permission
    }
}

/// Bearer token scoped to a single video
#[derive(Clone, PartialEq, Eq)]
pub struct ResourceToken {
    value: String,
    video_id: String,
    permission: Permission,
}

impl ResourceToken {
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Video this token grants access to
    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn permission(&self) -> Permission {
        self.permission
    }
}

// Token values stay out of logs.
impl fmt::Debug for AccountToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountToken")
            .field("permission", &self.permission)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for ResourceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceToken")
            .field("video_id", &self.video_id)
            .field("permission", &self.permission)
            .finish_non_exhaustive()
    }
}

/// Exchanges account and video identifiers for short-lived tokens
#[derive(Clone)]
pub struct TokenBroker {
    gateway: Arc<Gateway>,
}

impl TokenBroker {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    /// Mint an account-scoped token
    pub async fn account_token(
        &self,
        permission: Permission,
        cancel: &CancellationToken,
    ) -> Result<AccountToken> {
        let url = self.gateway.endpoint(
            &self.gateway.account().auth_root(),
            &["AccessToken"],
            &[("allowEdit", permission.allow_edit())],
        )?;

        let value = self.gateway.get_quoted(url, cancel).await?;
        debug!(permission = ?permission, "Minted account token");

        Ok(AccountToken { value, permission })
    }

    /// Mint a token scoped to one video
    pub async fn resource_token(
        &self,
        video_id: &str,
        permission: Permission,
        cancel: &CancellationToken,
    ) -> Result<ResourceToken> {
        let url = self.gateway.endpoint(
            &self.gateway.account().auth_root(),
            &["Videos", video_id, "AccessToken"],
            &[("allowEdit", permission.allow_edit())],
        )?;

        let value = self.gateway.get_quoted(url, cancel).await?;
        debug!(video_id = %video_id, permission = ?permission, "Minted video token");

        Ok(ResourceToken {
            value,
            video_id: video_id.to_string(),
            permission,
        })
    }
}
