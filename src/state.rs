//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! It holds the immutable settings, the identity bootstrap outcome, the
//! backend API client and the page templates.

use std::sync::Arc;

use crate::config::Settings;
use crate::fetch::{ApiClient, FetchError};
use crate::identity::IdentityError;
use crate::session::Identity;
use crate::views::Views;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("identity setup failed: {0}")]
    Identity(#[from] IdentityError),
    #[error("api client setup failed: {0}")]
    Api(#[from] FetchError),
    #[error("template setup failed: {0}")]
    Views(#[from] minijinja::Error),
}

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped or Clone.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub identity: Identity,
    pub api: ApiClient,
    pub views: Arc<Views>,
}

impl AppState {
    /// Build state with the Auth0 identity client.
    ///
    /// # Errors
    ///
    /// Returns a [`StartupError`] if any component fails to initialize.
    pub fn new(settings: Settings) -> Result<Self, StartupError> {
        let identity = Identity::from_settings(&settings)?;
        Self::with_identity(settings, identity)
    }

    /// Build state around an already bootstrapped identity.
    ///
    /// # Errors
    ///
    /// Returns a [`StartupError`] if the API client or templates fail to initialize.
    pub fn with_identity(settings: Settings, identity: Identity) -> Result<Self, StartupError> {
        let api = ApiClient::new(&settings.api_base_url)?;
        let views = Views::new()?;
        Ok(Self { settings: Arc::new(settings), identity, api, views: Arc::new(views) })
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::identity::{AuthorizeRequest, Claims, IdentityClient, TokenSet};
    use crate::session::SessionProvider;

    pub const MOCK_AUTHORIZE_URL: &str = "https://idp.test/authorize";
    pub const MOCK_LOGOUT_URL: &str = "https://idp.test/v2/logout";

    /// Scripted identity provider.
    pub struct MockIdentity {
        pub claims: Claims,
        /// Lifetime of issued access tokens; `0` forces a refresh on first use.
        pub expires_in: u64,
        pub issue_refresh_token: bool,
        pub fail_exchange: bool,
        pub fail_refresh: bool,
        pub exchanges: Mutex<Vec<(String, String)>>,
        pub refreshes: AtomicUsize,
    }

    impl MockIdentity {
        #[must_use]
        pub fn new() -> Self {
            let mut claims = Claims::new();
            claims.insert("sub".into(), "auth0|42".into());
            claims.insert("name".into(), "Ada Lovelace".into());
            Self {
                claims,
                expires_in: 3600,
                issue_refresh_token: true,
                fail_exchange: false,
                fail_refresh: false,
                exchanges: Mutex::new(Vec::new()),
                refreshes: AtomicUsize::new(0),
            }
        }

        #[must_use]
        pub fn refresh_count(&self) -> usize {
            self.refreshes.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl IdentityClient for MockIdentity {
        fn authorize_url(&self, request: &AuthorizeRequest<'_>) -> String {
            let mut url = format!(
                "{MOCK_AUTHORIZE_URL}?state={}&code_challenge={}",
                request.state, request.code_challenge
            );
            for (key, value) in request.prompt.authorize_params() {
                url.push_str(&format!("&{key}={value}"));
            }
            url
        }

        async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<TokenSet, IdentityError> {
            self.exchanges
                .lock()
                .unwrap()
                .push((code.to_owned(), code_verifier.to_owned()));
            if self.fail_exchange {
                return Err(IdentityError::TokenExchange("403: invalid_grant".into()));
            }
            Ok(TokenSet {
                access_token: format!("access-{code}"),
                refresh_token: self.issue_refresh_token.then(|| "refresh-1".to_owned()),
                expires_in: self.expires_in,
            })
        }

        async fn refresh(&self, _refresh_token: &str) -> Result<TokenSet, IdentityError> {
            let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_refresh {
                return Err(IdentityError::Refresh("401: invalid_grant".into()));
            }
            Ok(TokenSet { access_token: format!("access-refreshed-{n}"), refresh_token: None, expires_in: 3600 })
        }

        async fn user_claims(&self, _access_token: &str) -> Result<Claims, IdentityError> {
            Ok(self.claims.clone())
        }

        fn logout_url(&self) -> String {
            MOCK_LOGOUT_URL.to_owned()
        }
    }

    /// Complete identity settings pointing the API at `api_base_url`.
    #[must_use]
    pub fn test_settings(api_base_url: &str) -> Settings {
        Settings {
            auth0_domain: "tenant.example.com".into(),
            auth0_client_id: "client-123".into(),
            auth0_client_secret: None,
            auth0_callback_url: "http://localhost:3000/callback".into(),
            auth0_audience: "https://api.example.com".into(),
            api_base_url: api_base_url.to_owned(),
            env: "test".into(),
            port: 3000,
            cookie_secure: false,
        }
    }

    /// `AppState` backed by a mock identity provider.
    #[must_use]
    pub fn test_app_state(api_base_url: &str, mock: Arc<MockIdentity>) -> AppState {
        let client: Arc<dyn IdentityClient> = mock;
        let identity = Identity::Ready(Arc::new(SessionProvider::new(client)));
        AppState::with_identity(test_settings(api_base_url), identity).expect("test state should build")
    }

    /// Pull `state` out of a mock authorize URL.
    #[must_use]
    pub fn state_param(url: &str) -> String {
        url.split(['?', '&'])
            .find_map(|pair| pair.strip_prefix("state="))
            .unwrap_or_default()
            .to_owned()
    }
}
