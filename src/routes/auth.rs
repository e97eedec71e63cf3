//! Auth routes — login/signup redirects, OAuth callback, logout.

use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts, Query, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use time::Duration;

use super::{misconfigured, render};
use crate::identity::{IdentityError, Prompt};
use crate::session::{CallbackOutcome, DEFAULT_RETURN_TO, Identity, SessionProvider, SessionState};
use crate::state::AppState;
use crate::views::nav::nav_bar;
use crate::views::pages;

pub const SESSION_COOKIE_NAME: &str = "session_id";
pub const OAUTH_STATE_COOKIE_NAME: &str = "oauth_state";

const OAUTH_STATE_MAX_AGE: Duration = Duration::minutes(10);
const SESSION_COOKIE_MAX_AGE: Duration = Duration::days(7);

fn auth_cookie(name: &'static str, value: String, secure: bool, max_age: Option<Duration>) -> Cookie<'static> {
    let mut builder = Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure);
    if let Some(max_age) = max_age {
        builder = builder.max_age(max_age);
    }
    builder.build()
}

fn clear_cookie(name: &'static str, secure: bool) -> Cookie<'static> {
    auth_cookie(name, String::new(), secure, Some(Duration::ZERO))
}

pub(crate) fn identity_error_status(err: &IdentityError) -> StatusCode {
    match err {
        IdentityError::Provider { .. } | IdentityError::InvalidState | IdentityError::MissingCode => {
            StatusCode::BAD_REQUEST
        }
        IdentityError::TokenExchange(_) | IdentityError::Refresh(_) | IdentityError::UserInfo(_) => {
            StatusCode::BAD_GATEWAY
        }
        IdentityError::LoginRequired => StatusCode::UNAUTHORIZED,
        IdentityError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// =============================================================================
// SESSION EXTRACTOR
// =============================================================================

/// The browser's session, resolved from the session cookie.
/// Rejects with the configuration diagnostic when identity is misconfigured.
pub struct CurrentSession {
    pub provider: Arc<SessionProvider>,
    pub id: Option<String>,
    pub state: SessionState,
}

impl<S> FromRequestParts<S> for CurrentSession
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let provider = match &app_state.identity {
            Identity::Ready(provider) => Arc::clone(provider),
            Identity::Misconfigured { .. } => return Err(misconfigured(&app_state)),
        };

        let jar = CookieJar::from_headers(&parts.headers);
        let id = jar
            .get(SESSION_COOKIE_NAME)
            .map(|cookie| cookie.value().to_owned())
            .filter(|value| !value.is_empty());
        let session = provider.session_state(id.as_deref()).await;

        Ok(Self { provider, id, state: session })
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

#[derive(Deserialize)]
pub struct LoginQuery {
    return_to: Option<String>,
}

/// `GET /login` — redirect to the provider login page.
pub async fn login(State(state): State<AppState>, session: CurrentSession, Query(query): Query<LoginQuery>) -> Response {
    start_login(&state, &session, query.return_to.as_deref(), Prompt::Login).await
}

/// `GET /signup` — redirect to the provider signup page.
pub async fn signup(
    State(state): State<AppState>,
    session: CurrentSession,
    Query(query): Query<LoginQuery>,
) -> Response {
    start_login(&state, &session, query.return_to.as_deref(), Prompt::Signup).await
}

async fn start_login(state: &AppState, session: &CurrentSession, return_to: Option<&str>, prompt: Prompt) -> Response {
    let redirect = session
        .provider
        .login_with_redirect(return_to, prompt)
        .await;
    let cookie = auth_cookie(
        OAUTH_STATE_COOKIE_NAME,
        redirect.state,
        state.settings.cookie_secure,
        Some(OAUTH_STATE_MAX_AGE),
    );
    (CookieJar::new().add(cookie), Redirect::temporary(&redirect.url)).into_response()
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// `GET /callback` — finish the provider redirect, open a session, and send
/// the browser to the path it started from. Failures render on this page.
pub async fn callback(
    State(state): State<AppState>,
    session: CurrentSession,
    jar: CookieJar,
    Query(params): Query<CallbackQuery>,
) -> Response {
    let secure = state.settings.cookie_secure;
    let expected_state = jar
        .get(OAUTH_STATE_COOKIE_NAME)
        .map(|cookie| cookie.value().to_owned())
        .unwrap_or_default();
    let jar = jar.add(clear_cookie(OAUTH_STATE_COOKIE_NAME, secure));

    if params.error.is_none() && params.code.is_none() {
        if session.state.is_authenticated {
            return (jar, Redirect::temporary(DEFAULT_RETURN_TO)).into_response();
        }
        let page = pages::callback_page(&state.views, &nav_bar(false), None);
        return (jar, render(StatusCode::OK, page)).into_response();
    }

    match complete_callback(&session, &expected_state, params).await {
        Ok(outcome) => {
            if let Some(previous) = session.id.as_deref() {
                session.provider.end_session(previous).await;
            }
            let jar = jar.add(auth_cookie(SESSION_COOKIE_NAME, outcome.session_id, secure, Some(SESSION_COOKIE_MAX_AGE)));
            (jar, Redirect::temporary(&outcome.return_to)).into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, "login callback failed");
            let failed = SessionState::failed(&e);
            let page = pages::callback_page(&state.views, &nav_bar(false), failed.error.as_deref());
            (jar, render(identity_error_status(&e), page)).into_response()
        }
    }
}

async fn complete_callback(
    session: &CurrentSession,
    expected_state: &str,
    params: CallbackQuery,
) -> Result<CallbackOutcome, IdentityError> {
    if let Some(error) = params.error {
        return Err(IdentityError::Provider { error, description: params.error_description.unwrap_or_default() });
    }
    let code = params.code.ok_or(IdentityError::MissingCode)?;
    let callback_state = params.state.unwrap_or_default();
    if expected_state.is_empty() || expected_state != callback_state {
        return Err(IdentityError::InvalidState);
    }
    session
        .provider
        .handle_redirect_callback(&callback_state, &code)
        .await
}

/// `GET /logout` — drop the session and hand the browser to the provider logout.
pub async fn logout(State(state): State<AppState>, session: CurrentSession) -> Response {
    let url = session.provider.logout(session.id.as_deref()).await;
    let jar = CookieJar::new().add(clear_cookie(SESSION_COOKIE_NAME, state.settings.cookie_secure));
    tracing::info!("logged out");
    (jar, Redirect::temporary(&url)).into_response()
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
