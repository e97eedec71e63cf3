//! Identity session provider — login redirects, callback completion, tokens.
//!
//! ARCHITECTURE
//! ============
//! The browser only ever holds an opaque session id cookie. Tokens and
//! claims stay in this process, in two maps:
//!
//! - pending logins, keyed by the OAuth `state` parameter, holding the PKCE
//!   verifier and the path to return to after login;
//! - sessions, keyed by session id, holding claims and the token set.
//!
//! Locks are never held across a call to the identity provider.
//!
//! TRADE-OFFS
//! ==========
//! Sessions are in memory only, so a restart logs everyone out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::RwLock;

use crate::config::Settings;
use crate::fetch::{FetchError, TokenSource};
use crate::identity::{
    Auth0Client, AuthorizeRequest, Claims, IdentityClient, IdentityError, Prompt, TokenSet, pkce,
};

/// Where a completed login lands when no return path was supplied.
pub const DEFAULT_RETURN_TO: &str = "/me";

pub const PENDING_LOGIN_TTL: Duration = Duration::from_secs(10 * 60);
/// Absolute session lifetime, independent of token refreshes.
pub const SESSION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
/// Oldest pending logins are evicted past this many.
pub const MAX_PENDING_LOGINS: usize = 10_000;
const REFRESH_LEEWAY: Duration = Duration::from_secs(60);

// =============================================================================
// BOOTSTRAP
// =============================================================================

/// Identity bootstrap outcome. Either a working provider, or the list of
/// settings that kept it from starting.
#[derive(Clone)]
pub enum Identity {
    Ready(Arc<SessionProvider>),
    Misconfigured { missing: Vec<&'static str> },
}

impl Identity {
    /// Build the Auth0-backed provider, unless identity settings are missing.
    ///
    /// # Errors
    ///
    /// Returns an [`IdentityError::Config`] if present settings are malformed.
    pub fn from_settings(settings: &Settings) -> Result<Self, IdentityError> {
        Self::bootstrap(settings, |settings| {
            let client: Arc<dyn IdentityClient> = Arc::new(Auth0Client::new(settings)?);
            Ok(client)
        })
    }

    /// Validate settings, then build the provider around `build`. `build` is
    /// not called when any identity field is missing.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `build`.
    pub fn bootstrap(
        settings: &Settings,
        build: impl FnOnce(&Settings) -> Result<Arc<dyn IdentityClient>, IdentityError>,
    ) -> Result<Self, IdentityError> {
        let missing = settings.missing_identity_fields();
        if !missing.is_empty() {
            return Ok(Self::Misconfigured { missing });
        }
        Ok(Self::Ready(Arc::new(SessionProvider::new(build(settings)?))))
    }

    /// `Missing: a, b` when misconfigured.
    #[must_use]
    pub fn diagnostic(&self) -> Option<String> {
        match self {
            Self::Ready(_) => None,
            Self::Misconfigured { missing } => Some(format!("Missing: {}", missing.join(", "))),
        }
    }
}

// =============================================================================
// STATE
// =============================================================================

/// Snapshot of a browser's session, as published to pages.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionState {
    pub is_authenticated: bool,
    pub user: Claims,
    pub error: Option<String>,
}

impl SessionState {
    /// Unauthenticated state carrying an identity-flow error.
    #[must_use]
    pub fn failed(error: &IdentityError) -> Self {
        Self { error: Some(error.to_string()), ..Self::default() }
    }
}

struct PendingLogin {
    code_verifier: String,
    return_to: String,
    created_at: Instant,
}

#[derive(Clone)]
struct StoredTokens {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Instant,
}

impl StoredTokens {
    fn from_token_set(tokens: TokenSet, previous_refresh: Option<String>) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token.or(previous_refresh),
            expires_at: Instant::now() + Duration::from_secs(tokens.expires_in),
        }
    }

    fn is_fresh(&self, now: Instant) -> bool {
        now + REFRESH_LEEWAY < self.expires_at
    }
}

struct Session {
    user: Claims,
    tokens: StoredTokens,
    created_at: Instant,
}

impl Session {
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.duration_since(self.created_at) >= ttl
    }
}

/// A login that is ready to redirect to the provider.
#[derive(Debug, Clone)]
pub struct LoginRedirect {
    /// OAuth `state`; also bound to a browser cookie by the caller.
    pub state: String,
    pub url: String,
}

/// A completed callback.
#[derive(Debug, Clone)]
pub struct CallbackOutcome {
    pub session_id: String,
    pub return_to: String,
}

// =============================================================================
// PROVIDER
// =============================================================================

pub struct SessionProvider {
    client: Arc<dyn IdentityClient>,
    pending: RwLock<HashMap<String, PendingLogin>>,
    sessions: RwLock<HashMap<String, Session>>,
    session_ttl: Duration,
    pending_capacity: usize,
}

impl SessionProvider {
    #[must_use]
    pub fn new(client: Arc<dyn IdentityClient>) -> Self {
        Self {
            client,
            pending: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            session_ttl: SESSION_TTL,
            pending_capacity: MAX_PENDING_LOGINS,
        }
    }

    /// Override the session lifetime and pending-login capacity.
    #[must_use]
    pub fn with_limits(mut self, session_ttl: Duration, pending_capacity: usize) -> Self {
        self.session_ttl = session_ttl;
        self.pending_capacity = pending_capacity.max(1);
        self
    }

    /// Start a login: remember the PKCE verifier and return path under a fresh
    /// `state`, and build the provider URL to redirect to.
    pub async fn login_with_redirect(&self, return_to: Option<&str>, prompt: Prompt) -> LoginRedirect {
        let state = pkce::generate_token();
        let code_verifier = pkce::code_verifier();
        let code_challenge = pkce::code_challenge(&code_verifier);
        let url = self
            .client
            .authorize_url(&AuthorizeRequest { state: &state, code_challenge: &code_challenge, prompt });

        let now = Instant::now();
        let mut pending = self.pending.write().await;
        pending.retain(|_, login| now.duration_since(login.created_at) < PENDING_LOGIN_TTL);
        if pending.len() >= self.pending_capacity {
            let oldest = pending
                .iter()
                .min_by_key(|(_, login)| login.created_at)
                .map(|(state, _)| state.clone());
            if let Some(oldest) = oldest {
                pending.remove(&oldest);
                tracing::warn!(capacity = self.pending_capacity, "pending logins at capacity, evicted oldest");
            }
        }
        pending.insert(
            state.clone(),
            PendingLogin { code_verifier, return_to: sanitize_return_to(return_to), created_at: now },
        );

        tracing::debug!(?prompt, pending = pending.len(), "login redirect issued");
        LoginRedirect { state, url }
    }

    /// Complete the provider redirect: consume the pending login, exchange the
    /// code, load claims and open a session. This is the only place the
    /// post-login destination is decided.
    ///
    /// # Errors
    ///
    /// [`IdentityError::InvalidState`] for an unknown or expired `state`, or
    /// the provider error from the code exchange or claims lookup.
    pub async fn handle_redirect_callback(&self, state: &str, code: &str) -> Result<CallbackOutcome, IdentityError> {
        let login = self
            .pending
            .write()
            .await
            .remove(state)
            .filter(|login| login.created_at.elapsed() < PENDING_LOGIN_TTL)
            .ok_or(IdentityError::InvalidState)?;

        let tokens = self.client.exchange_code(code, &login.code_verifier).await?;
        let user = self.client.user_claims(&tokens.access_token).await?;

        let session_id = pkce::generate_token();
        let subject = user
            .get("sub")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, session| !session.is_expired(now, self.session_ttl));
        sessions.insert(
            session_id.clone(),
            Session { user, tokens: StoredTokens::from_token_set(tokens, None), created_at: now },
        );
        drop(sessions);

        tracing::info!(%subject, return_to = %login.return_to, "session established");
        Ok(CallbackOutcome { session_id, return_to: login.return_to })
    }

    /// Current state for a session id; unauthenticated when absent or unknown.
    pub async fn session_state(&self, session_id: Option<&str>) -> SessionState {
        let Some(session_id) = session_id else {
            return SessionState::default();
        };
        let now = Instant::now();
        let (user, expired) = match self.sessions.read().await.get(session_id) {
            Some(session) => (session.user.clone(), session.is_expired(now, self.session_ttl)),
            None => return SessionState::default(),
        };
        if expired {
            self.end_session(session_id).await;
            return SessionState::default();
        }
        SessionState { is_authenticated: true, user, error: None }
    }

    /// A usable access token for the session, refreshing it silently when it
    /// is about to expire. A session that cannot refresh is dropped.
    ///
    /// # Errors
    ///
    /// [`IdentityError::LoginRequired`] without a usable session, or the
    /// provider's refresh error.
    pub async fn get_access_token(&self, session_id: &str) -> Result<String, IdentityError> {
        let now = Instant::now();
        let (tokens, expired) = self
            .sessions
            .read()
            .await
            .get(session_id)
            .map(|session| (session.tokens.clone(), session.is_expired(now, self.session_ttl)))
            .ok_or(IdentityError::LoginRequired)?;
        if expired {
            self.end_session(session_id).await;
            return Err(IdentityError::LoginRequired);
        }

        if tokens.is_fresh(now) {
            return Ok(tokens.access_token);
        }

        let Some(refresh_token) = tokens.refresh_token else {
            self.end_session(session_id).await;
            return Err(IdentityError::LoginRequired);
        };

        match self.client.refresh(&refresh_token).await {
            Ok(fresh) => {
                let stored = StoredTokens::from_token_set(fresh, Some(refresh_token));
                let access_token = stored.access_token.clone();
                if let Some(session) = self.sessions.write().await.get_mut(session_id) {
                    session.tokens = stored;
                }
                tracing::debug!("access token refreshed");
                Ok(access_token)
            }
            Err(e) => {
                tracing::warn!(error = %e, "silent token refresh failed");
                self.end_session(session_id).await;
                Err(e)
            }
        }
    }

    /// Drop the session (if any) and return the provider logout URL.
    pub async fn logout(&self, session_id: Option<&str>) -> String {
        if let Some(session_id) = session_id {
            self.end_session(session_id).await;
        }
        self.client.logout_url()
    }

    pub async fn end_session(&self, session_id: &str) {
        self.sessions.write().await.remove(session_id);
    }
}

/// [`TokenSource`] bound to one browser session.
pub struct SessionToken<'a> {
    pub provider: &'a SessionProvider,
    pub session_id: &'a str,
}

#[async_trait::async_trait]
impl TokenSource for SessionToken<'_> {
    async fn access_token(&self) -> Result<String, FetchError> {
        self.provider
            .get_access_token(self.session_id)
            .await
            .map_err(|e| FetchError::Token(e.to_string()))
    }
}

/// Keep local absolute paths only; anything else becomes [`DEFAULT_RETURN_TO`].
/// Control characters are rejected outright: browsers drop tabs and newlines
/// while parsing, which would turn `/\t/host` into `//host`.
#[must_use]
pub fn sanitize_return_to(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.contains('\\')
                && !path.chars().any(char::is_control) =>
        {
            path.to_owned()
        }
        _ => DEFAULT_RETURN_TO.to_owned(),
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
