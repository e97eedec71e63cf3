//! Auth0 client — authorize/logout URLs, token and userinfo endpoints.
//!
//! Thin HTTP wrapper. The tenant domain may be a bare host
//! (`tenant.eu.auth0.com`) or a full base URL, which lets tests point it at a
//! local mock server.

use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;

use super::{AuthorizeRequest, Claims, IdentityClient, IdentityError, TokenSet};
use crate::config::Settings;

const REQUEST_TIMEOUT_SECS: u64 = 15;
const CONNECT_TIMEOUT_SECS: u64 = 5;
const SCOPE: &str = "openid profile email offline_access";

// =============================================================================
// CLIENT
// =============================================================================

pub struct Auth0Client {
    http: reqwest::Client,
    issuer: String,
    authorize_endpoint: Url,
    logout_endpoint: Url,
    client_id: String,
    client_secret: Option<String>,
    redirect_uri: String,
    audience: String,
}

impl Auth0Client {
    /// Build a client from validated identity settings.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Config`] if the domain or callback URL cannot
    /// be turned into URLs, or the HTTP client fails to build.
    pub fn new(settings: &Settings) -> Result<Self, IdentityError> {
        let issuer = issuer_base(&settings.auth0_domain);
        let authorize_endpoint = Url::parse(&format!("{issuer}/authorize"))
            .map_err(|e| IdentityError::Config(format!("auth0_domain: {e}")))?;

        let return_to = origin_of(&settings.auth0_callback_url).ok_or_else(|| {
            IdentityError::Config(format!("auth0_callback_url is not an absolute URL: {}", settings.auth0_callback_url))
        })?;
        let mut logout_endpoint = Url::parse(&format!("{issuer}/v2/logout"))
            .map_err(|e| IdentityError::Config(format!("auth0_domain: {e}")))?;
        logout_endpoint
            .query_pairs_mut()
            .append_pair("client_id", &settings.auth0_client_id)
            .append_pair("returnTo", &return_to);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| IdentityError::Config(format!("http client: {e}")))?;

        Ok(Self {
            http,
            issuer,
            authorize_endpoint,
            logout_endpoint,
            client_id: settings.auth0_client_id.clone(),
            client_secret: settings.auth0_client_secret.clone(),
            redirect_uri: settings.auth0_callback_url.clone(),
            audience: settings.auth0_audience.clone(),
        })
    }

    async fn token_request(&self, grant: &[(&str, &str)]) -> Result<TokenSet, String> {
        let mut params: Vec<(&str, &str)> = grant.to_vec();
        params.push(("client_id", self.client_id.as_str()));
        if let Some(secret) = &self.client_secret {
            params.push(("client_secret", secret.as_str()));
        }

        let response = self
            .http
            .post(format!("{}/oauth/token", self.issuer))
            .form(&params)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        let body = response.text().await.map_err(|e| e.to_string())?;
        if !status.is_success() {
            return Err(format!("{}: {}", status.as_u16(), describe_error_body(&body)));
        }

        serde_json::from_str::<TokenSet>(&body).map_err(|_| format!("unexpected response: {body}"))
    }
}

#[async_trait::async_trait]
impl IdentityClient for Auth0Client {
    fn authorize_url(&self, request: &AuthorizeRequest<'_>) -> String {
        let mut url = self.authorize_endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", &self.redirect_uri)
                .append_pair("audience", &self.audience)
                .append_pair("scope", SCOPE)
                .append_pair("state", request.state)
                .append_pair("code_challenge", request.code_challenge)
                .append_pair("code_challenge_method", "S256");
            for (key, value) in request.prompt.authorize_params() {
                query.append_pair(key, value);
            }
        }
        url.to_string()
    }

    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<TokenSet, IdentityError> {
        let grant = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("code_verifier", code_verifier),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];
        self.token_request(&grant)
            .await
            .map_err(IdentityError::TokenExchange)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, IdentityError> {
        let grant = [("grant_type", "refresh_token"), ("refresh_token", refresh_token)];
        self.token_request(&grant)
            .await
            .map_err(IdentityError::Refresh)
    }

    async fn user_claims(&self, access_token: &str) -> Result<Claims, IdentityError> {
        let response = self
            .http
            .get(format!("{}/userinfo", self.issuer))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| IdentityError::UserInfo(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IdentityError::UserInfo(format!("{}: {}", status.as_u16(), describe_error_body(&body))));
        }

        let value = response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| IdentityError::UserInfo(e.to_string()))?;
        match value {
            serde_json::Value::Object(claims) => Ok(claims),
            other => Err(IdentityError::UserInfo(format!("expected a JSON object, got {other}"))),
        }
    }

    fn logout_url(&self) -> String {
        self.logout_endpoint.to_string()
    }
}

// =============================================================================
// HELPERS
// =============================================================================

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

fn describe_error_body(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody { error, error_description: Some(description) }) => format!("{error}: {description}"),
        Ok(ErrorBody { error, error_description: None }) => error,
        Err(_) => body.to_owned(),
    }
}

/// Base URL of the tenant: `https://{domain}` unless a scheme is already present.
pub(crate) fn issuer_base(domain: &str) -> String {
    let trimmed = domain.trim().trim_end_matches('/');
    if trimmed.starts_with("https://") || trimmed.starts_with("http://") {
        trimmed.to_owned()
    } else {
        format!("https://{trimmed}")
    }
}

/// `scheme://host[:port]` of an absolute URL.
pub(crate) fn origin_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    Some(parsed.origin().ascii_serialization()).filter(|origin| origin != "null")
}

#[cfg(test)]
#[path = "auth0_test.rs"]
mod tests;
