use super::ports::{
    IdentityClaims, IdentityProvider, OAuthDetails, OAuthError, ProviderConfig, ProviderId,
};
use async_trait::async_trait;
use oauth2::{
    basic::BasicClient, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

const USER_AGENT: &str = "oauth-callback-service";

// Type alias for a fully configured OAuth client
type ConfiguredClient = oauth2::Client<
    oauth2::basic::BasicErrorResponse,
    oauth2::basic::BasicTokenResponse,
    oauth2::basic::BasicTokenIntrospectionResponse,
    oauth2::StandardRevocableToken,
    oauth2::basic::BasicRevocationErrorResponse,
    oauth2::EndpointSet,
    oauth2::EndpointNotSet,
    oauth2::EndpointNotSet,
    oauth2::EndpointNotSet,
    oauth2::EndpointSet,
>;

/// Performs the code-for-token and token-for-identity round trips
pub struct OAuthManager {
    http_client: Client,
    exchange_timeout: Duration,
}

impl OAuthManager {
    pub fn new(exchange_timeout: Duration) -> Result<Self, OAuthError> {
        // Provider endpoints are never followed through redirects
        let http_client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(exchange_timeout)
            .build()
            .map_err(|e| OAuthError::ProviderConfigError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            exchange_timeout,
        })
    }

    fn create_client(config: &ProviderConfig) -> Result<ConfiguredClient, OAuthError> {
        let auth_url = AuthUrl::new(config.auth_url.clone()).map_err(|e| {
            OAuthError::ProviderConfigError(format!("Invalid {} auth URL: {}", config.provider_id, e))
        })?;

        let token_url = TokenUrl::new(config.token_url.clone()).map_err(|e| {
            OAuthError::ProviderConfigError(format!(
                "Invalid {} token URL: {}",
                config.provider_id, e
            ))
        })?;

        let client = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_client_secret(ClientSecret::new(config.client_secret.clone()))
            .set_auth_uri(auth_url)
            .set_token_uri(token_url)
            .set_redirect_uri(RedirectUrl::new(config.redirect_uri.clone()).map_err(|e| {
                OAuthError::ProviderConfigError(format!("Invalid redirect URL: {}", e))
            })?);

        Ok(client)
    }

    /// Provider authorization URL carrying the caller's state blob untouched
    pub fn authorize_url(config: &ProviderConfig, state: String) -> Result<String, OAuthError> {
        let client = Self::create_client(config)?;

        let (auth_url, _csrf_state) = client
            .authorize_url(move || CsrfToken::new(state))
            .add_scopes(config.scopes.iter().cloned().map(Scope::new))
            .url();

        Ok(auth_url.to_string())
    }

    async fn exchange(
        &self,
        config: &ProviderConfig,
        details: &OAuthDetails,
    ) -> Result<IdentityClaims, OAuthError> {
        let client = Self::create_client(config)?;

        debug!("Exchanging {} code for token", config.provider_id);

        let token = client
            .exchange_code(AuthorizationCode::new(details.code.clone()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| OAuthError::IdentityExchangeFailed(format!("Token exchange failed: {}", e)))?;

        let access_token = token.access_token().secret();

        let claims = match config.provider_id {
            ProviderId::Google => self.fetch_google_user(&config.user_info_url, access_token).await?,
            ProviderId::Github => self.fetch_github_user(&config.user_info_url, access_token).await?,
        };

        info!(
            provider = %config.provider_id,
            sub = %claims.subject_id,
            email = %claims.email,
            "OAuth user identified"
        );
        Ok(claims)
    }

    /// Fetch Google user information
    async fn fetch_google_user(
        &self,
        user_info_url: &str,
        access_token: &str,
    ) -> Result<IdentityClaims, OAuthError> {
        debug!("Fetching Google user info with access token");

        let response = self
            .http_client
            .get(user_info_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                OAuthError::IdentityExchangeFailed(format!("Failed to fetch Google user: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let response_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response".to_string());
            return Err(OAuthError::IdentityExchangeFailed(format!(
                "Google API returned status: {}, body: {}",
                status, response_text
            )));
        }

        let user: GoogleUser = response.json().await.map_err(|e| {
            OAuthError::IdentityExchangeFailed(format!("Failed to parse Google user: {}", e))
        })?;

        Ok(IdentityClaims {
            display_name: user.given_name.or(user.name).unwrap_or_default(),
            subject_id: user.id,
            email: user.email,
            email_verified: user.verified_email,
        })
    }

    /// Fetch GitHub user information; email and its verification come from `/user/emails`
    async fn fetch_github_user(
        &self,
        user_info_url: &str,
        access_token: &str,
    ) -> Result<IdentityClaims, OAuthError> {
        let response = self
            .http_client
            .get(user_info_url)
            .bearer_auth(access_token)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .map_err(|e| {
                OAuthError::IdentityExchangeFailed(format!("Failed to fetch GitHub user: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(OAuthError::IdentityExchangeFailed(format!(
                "GitHub API returned status: {}",
                response.status()
            )));
        }

        let user: GitHubUser = response.json().await.map_err(|e| {
            OAuthError::IdentityExchangeFailed(format!("Failed to parse GitHub user: {}", e))
        })?;

        let emails_url = format!("{}/emails", user_info_url.trim_end_matches('/'));
        let emails_response = self
            .http_client
            .get(&emails_url)
            .bearer_auth(access_token)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .map_err(|e| {
                OAuthError::IdentityExchangeFailed(format!("Failed to fetch GitHub emails: {}", e))
            })?;

        if !emails_response.status().is_success() {
            return Err(OAuthError::IdentityExchangeFailed(format!(
                "GitHub emails API returned status: {}",
                emails_response.status()
            )));
        }

        let emails: Vec<GitHubEmail> = emails_response.json().await.map_err(|e| {
            OAuthError::IdentityExchangeFailed(format!("Failed to parse GitHub emails: {}", e))
        })?;

        // Get primary email
        let chosen = emails
            .iter()
            .find(|e| e.primary)
            .or_else(|| emails.first())
            .ok_or_else(|| {
                OAuthError::IdentityExchangeFailed("GitHub user has no email address".to_string())
            })?;

        Ok(IdentityClaims {
            subject_id: user.id.to_string(),
            display_name: user.name.filter(|n| !n.is_empty()).unwrap_or(user.login),
            email: chosen.email.clone(),
            email_verified: chosen.verified,
        })
    }
}

#[async_trait]
impl IdentityProvider for OAuthManager {
    async fn fetch_identity(
        &self,
        config: &ProviderConfig,
        details: &OAuthDetails,
    ) -> Result<IdentityClaims, OAuthError> {
        tokio::time::timeout(self.exchange_timeout, self.exchange(config, details))
            .await
            .map_err(|_| {
                OAuthError::IdentityExchangeFailed(format!(
                    "{} exchange timed out after {:?}",
                    config.provider_id, self.exchange_timeout
                ))
            })?
    }
}

#[derive(Debug, Deserialize)]
struct GoogleUser {
    #[serde(alias = "sub")]
    id: String,
    email: String,
    #[serde(default)]
    verified_email: bool,
    #[serde(default)]
    given_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct GitHubUser {
    id: u64,
    #[serde(default)]
    login: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    #[serde(default)]
    verified: bool,
}
