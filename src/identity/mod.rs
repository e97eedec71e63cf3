//! Identity provider — the external OAuth2/OIDC collaborator.
//!
//! DESIGN
//! ======
//! `IdentityClient` is the narrow contract with the provider: build the
//! authorize URL, exchange or refresh tokens, read user claims, and build the
//! logout URL. `Auth0Client` is the production implementation; tests plug in
//! a mock. Session bookkeeping lives in `crate::session`.

pub mod auth0;
pub mod pkce;

use serde::Deserialize;

pub use auth0::Auth0Client;

/// Identity claims, claim name to JSON value.
pub type Claims = serde_json::Map<String, serde_json::Value>;

const DEFAULT_EXPIRES_IN_SECS: u64 = 86_400;

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum IdentityError {
    /// The provider reported an error on the callback URL.
    #[error("{error}: {description}")]
    Provider { error: String, description: String },
    #[error("invalid or expired login state")]
    InvalidState,
    #[error("missing authorization code")]
    MissingCode,
    #[error("token exchange failed: {0}")]
    TokenExchange(String),
    #[error("token refresh failed: {0}")]
    Refresh(String),
    #[error("user info request failed: {0}")]
    UserInfo(String),
    /// No session, or the session can no longer produce an access token.
    #[error("login required")]
    LoginRequired,
    #[error("identity configuration invalid: {0}")]
    Config(String),
}

// =============================================================================
// WIRE TYPES
// =============================================================================

/// How the provider should treat the login page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    /// Always show the login form, even with an existing provider session.
    Login,
    /// Open the provider on its signup screen.
    Signup,
}

impl Prompt {
    /// Extra authorize-URL query parameters for this prompt.
    #[must_use]
    pub fn authorize_params(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Login => &[("prompt", "login")],
            Self::Signup => &[("prompt", "login"), ("screen_hint", "signup")],
        }
    }
}

/// Per-login inputs to the authorize URL.
#[derive(Debug, Clone, Copy)]
pub struct AuthorizeRequest<'a> {
    pub state: &'a str,
    pub code_challenge: &'a str,
    pub prompt: Prompt,
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
}

fn default_expires_in() -> u64 {
    DEFAULT_EXPIRES_IN_SECS
}

// =============================================================================
// CLIENT TRAIT
// =============================================================================

/// Provider-neutral identity client. Enables mocking in tests.
#[async_trait::async_trait]
pub trait IdentityClient: Send + Sync {
    /// Authorization endpoint URL for a new login.
    fn authorize_url(&self, request: &AuthorizeRequest<'_>) -> String;

    /// Exchange an authorization code (plus PKCE verifier) for tokens.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::TokenExchange`] on transport, status or parse failure.
    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<TokenSet, IdentityError>;

    /// Obtain a fresh access token with a refresh token, without user interaction.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Refresh`] when the provider rejects the refresh.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, IdentityError>;

    /// Read the user's identity claims.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::UserInfo`] on transport, status or parse failure.
    async fn user_claims(&self, access_token: &str) -> Result<Claims, IdentityError>;

    /// Provider logout URL that returns the browser to this application.
    fn logout_url(&self) -> String;
}
