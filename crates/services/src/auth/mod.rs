pub mod memory;
pub mod oauth;
pub mod policy;
pub mod ports;
pub mod providers;
pub mod state;
pub mod tokens;

pub use memory::InMemoryUserRepository;
pub use oauth::OAuthManager;
pub use policy::{enforce_policy, ConfigAllowList};
pub use ports::*;
pub use providers::StaticProviderResolver;
pub use state::{encode_state, parse_state, parse_state_with_default};
pub use tokens::UuidTokenGenerator;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Completes OAuth callbacks and issues bearer tokens
pub struct OAuthCallbackService {
    resolver: Arc<dyn ProviderResolver>,
    identity_provider: Arc<dyn IdentityProvider>,
    allow_list: Arc<dyn AllowListValidator>,
    token_generator: Arc<dyn TokenGenerator>,
    user_repository: Arc<dyn UserRepository>,
    default_site: String,
}

impl OAuthCallbackService {
    pub fn new(
        resolver: Arc<dyn ProviderResolver>,
        identity_provider: Arc<dyn IdentityProvider>,
        allow_list: Arc<dyn AllowListValidator>,
        token_generator: Arc<dyn TokenGenerator>,
        user_repository: Arc<dyn UserRepository>,
        default_site: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            identity_provider,
            allow_list,
            token_generator,
            user_repository,
            default_site: default_site.into(),
        }
    }

    /// Generate a token and attach it to the user, creating the user on first login.
    /// The display name is only recorded on creation.
    pub async fn issue(
        &self,
        subject_id: &str,
        display_name: &str,
    ) -> Result<(String, UpsertOutcome), OAuthError> {
        let token = self.token_generator.generate().map_err(|e| {
            error!(sub = %subject_id, error = %e, "Failed to generate bearer token");
            OAuthError::TokenGenerationFailed(e.to_string())
        })?;

        let outcome = self
            .user_repository
            .upsert_with_token(subject_id, display_name, &token)
            .await
            .map_err(|e| {
                error!(sub = %subject_id, error = %e, "Failed to store bearer token");
                OAuthError::StoreError(format!("Failed to store token: {e}"))
            })?;

        match outcome {
            UpsertOutcome::Created => info!(sub = %subject_id, "Created user on first login"),
            UpsertOutcome::Appended => debug!(sub = %subject_id, "Appended token to existing user"),
        }

        Ok((token, outcome))
    }
}

#[async_trait]
impl OAuthCallbackServiceTrait for OAuthCallbackService {
    async fn handle_callback(
        &self,
        platform: Platform,
        request: &AuthRequest,
    ) -> Result<CallbackOutcome, OAuthError> {
        let details = parse_state_with_default(request, &self.default_site).map_err(|e| {
            error!(%platform, error = %e, "Rejected OAuth callback state");
            e
        })?;

        let config = self
            .resolver
            .resolve(&details.site, &details.callback_url(platform))
            .map_err(|e| {
                error!(%platform, site = %details.site, error = %e, "Failed to resolve OAuth provider");
                e
            })?;

        let claims = self
            .identity_provider
            .fetch_identity(&config, &details)
            .await
            .map_err(|e| {
                error!(
                    %platform,
                    provider = %config.provider_id,
                    redirect_url = %details.redirect_url,
                    backend_url = %details.backend_url,
                    error = %e,
                    "Failed to exchange OAuth code"
                );
                e
            })?;

        enforce_policy(self.allow_list.as_ref(), &claims)
            .await
            .map_err(|e| {
                error!(
                    %platform,
                    email = %claims.email,
                    sub = %claims.subject_id,
                    error = %e,
                    "OAuth login rejected"
                );
                e
            })?;

        let (bearer_token, outcome) = self.issue(&claims.subject_id, &claims.display_name).await?;

        info!(
            %platform,
            provider = %config.provider_id,
            sub = %claims.subject_id,
            "OAuth callback completed"
        );

        Ok(CallbackOutcome {
            redirect_url: details.redirect_url,
            bearer_token,
            provider: config.provider_id,
            created_user: outcome == UpsertOutcome::Created,
        })
    }

    async fn authorize_url(
        &self,
        platform: Platform,
        redirect_url: &str,
        backend_url: &str,
        site: Option<String>,
    ) -> Result<String, OAuthError> {
        if redirect_url.is_empty() {
            return Err(OAuthError::MissingRedirect);
        }
        if backend_url.is_empty() {
            return Err(OAuthError::MissingBackend);
        }

        let backend = backend_url.strip_suffix('/').unwrap_or(backend_url);
        let site = site
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.default_site.clone());

        let config = self
            .resolver
            .resolve(&site, &format!("{backend}/oauth/{platform}"))?;

        OAuthManager::authorize_url(&config, encode_state(redirect_url, backend, Some(&site)))
    }
}
