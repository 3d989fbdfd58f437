use super::ports::{OAuthError, ProviderConfig, ProviderId, ProviderResolver};
use config::{AuthConfig, OAuthClientConfig};
use oauth2::{AuthUrl, RedirectUrl, TokenUrl};

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_USER_INFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
const GOOGLE_SCOPES: &[&str] = &["openid", "email", "profile"];

pub const GITHUB_AUTH_URL: &str = "https://github.com/login/oauth/authorize";
pub const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
pub const GITHUB_USER_INFO_URL: &str = "https://api.github.com/user";
const GITHUB_SCOPES: &[&str] = &["read:user", "user:email"];

/// Resolves site selectors against the provider credentials loaded at startup
#[derive(Debug, Clone, Default)]
pub struct StaticProviderResolver {
    google: Option<OAuthClientConfig>,
    github: Option<OAuthClientConfig>,
}

impl StaticProviderResolver {
    pub fn new(google: Option<OAuthClientConfig>, github: Option<OAuthClientConfig>) -> Self {
        Self { google, github }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.google.clone(), config.github.clone())
    }

    /// Providers that have credentials configured
    pub fn configured(&self) -> Vec<ProviderId> {
        let mut providers = Vec::new();
        if self.google.is_some() {
            providers.push(ProviderId::Google);
        }
        if self.github.is_some() {
            providers.push(ProviderId::Github);
        }
        providers
    }

    fn client_for(&self, provider: ProviderId) -> Option<&OAuthClientConfig> {
        match provider {
            ProviderId::Google => self.google.as_ref(),
            ProviderId::Github => self.github.as_ref(),
        }
    }
}

impl ProviderResolver for StaticProviderResolver {
    fn resolve(&self, site: &str, callback_url: &str) -> Result<ProviderConfig, OAuthError> {
        let provider_id = ProviderId::from_site(site)
            .ok_or_else(|| OAuthError::UnsupportedProvider(site.to_string()))?;

        let client = self.client_for(provider_id).ok_or_else(|| {
            OAuthError::UnsupportedProvider(format!("{site} is not configured"))
        })?;

        let (default_auth, default_token, default_user_info, scopes) = match provider_id {
            ProviderId::Google => (
                GOOGLE_AUTH_URL,
                GOOGLE_TOKEN_URL,
                GOOGLE_USER_INFO_URL,
                GOOGLE_SCOPES,
            ),
            ProviderId::Github => (
                GITHUB_AUTH_URL,
                GITHUB_TOKEN_URL,
                GITHUB_USER_INFO_URL,
                GITHUB_SCOPES,
            ),
        };

        let auth_url = client.auth_url.as_deref().unwrap_or(default_auth);
        let token_url = client.token_url.as_deref().unwrap_or(default_token);
        let user_info_url = client.user_info_url.as_deref().unwrap_or(default_user_info);

        // Validate once here so the exchange never starts with a broken client
        AuthUrl::new(auth_url.to_string()).map_err(|e| {
            OAuthError::ProviderConfigError(format!("Invalid {provider_id} auth URL: {e}"))
        })?;
        TokenUrl::new(token_url.to_string()).map_err(|e| {
            OAuthError::ProviderConfigError(format!("Invalid {provider_id} token URL: {e}"))
        })?;
        url::Url::parse(user_info_url).map_err(|e| {
            OAuthError::ProviderConfigError(format!("Invalid {provider_id} user info URL: {e}"))
        })?;
        RedirectUrl::new(callback_url.to_string()).map_err(|e| {
            OAuthError::ProviderConfigError(format!("Invalid redirect URL {callback_url}: {e}"))
        })?;

        Ok(ProviderConfig {
            provider_id,
            client_id: client.client_id.clone(),
            client_secret: client.client_secret.clone(),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            auth_url: auth_url.to_string(),
            token_url: token_url.to_string(),
            user_info_url: user_info_url.to_string(),
            redirect_uri: callback_url.to_string(),
        })
    }
}
