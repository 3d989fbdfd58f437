use super::ports::{AllowListValidator, IdentityClaims, OAuthError};
use async_trait::async_trait;
use config::AuthConfig;

/// Allow-list backed by the emails and domains in [`AuthConfig`]
#[derive(Debug, Clone)]
pub struct ConfigAllowList {
    config: AuthConfig,
}

impl ConfigAllowList {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl AllowListValidator for ConfigAllowList {
    async fn is_allowed(&self, email: &str) -> anyhow::Result<bool> {
        Ok(self.config.is_allowed_email(email))
    }
}

/// Allow-list first, verified email second; stops at the first failure.
/// Rejections are logged by the caller, which knows the platform.
pub async fn enforce_policy(
    allow_list: &dyn AllowListValidator,
    claims: &IdentityClaims,
) -> Result<(), OAuthError> {
    let allowed = allow_list.is_allowed(&claims.email).await.map_err(|e| {
        OAuthError::AllowListCheckFailed(format!("Failed to check allow list: {e}"))
    })?;

    if !allowed {
        return Err(OAuthError::EmailNotAllowed);
    }

    if !claims.email_verified {
        return Err(OAuthError::EmailNotVerified);
    }

    Ok(())
}
