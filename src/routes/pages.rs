//! Page routes — public landing and the protected profile page.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};

use super::auth::CurrentSession;
use super::render;
use crate::fetch::{FetchError, FetchOptions, USER_RECORD_ENDPOINT, fetch_json};
use crate::session::{DEFAULT_RETURN_TO, SessionToken};
use crate::state::AppState;
use crate::views::nav::nav_bar;
use crate::views::pages;

/// `GET /`
pub async fn public(State(state): State<AppState>, session: CurrentSession) -> Response {
    render(StatusCode::OK, pages::public_page(&state.views, &nav_bar(session.state.is_authenticated)))
}

/// `GET /me` — identity claims plus the backend user record.
///
/// Signed-out visitors are sent through login and returned here, as are
/// sessions that end while acquiring a token. Any other failed record fetch
/// is logged and the record section stays on its placeholder.
pub async fn my_info(State(state): State<AppState>, session: CurrentSession) -> Response {
    let Some(session_id) = session
        .id
        .as_deref()
        .filter(|_| session.state.is_authenticated)
    else {
        return login_redirect();
    };

    let tokens = SessionToken { provider: &session.provider, session_id };
    let fetched = fetch_json(&state.api, &tokens, USER_RECORD_ENDPOINT, &FetchOptions::json()).await;
    if matches!(fetched.error, Some(FetchError::Token(_))) {
        return login_redirect();
    }
    let record = fetched
        .data
        .as_ref()
        .and_then(serde_json::Value::as_object);

    render(
        StatusCode::OK,
        pages::my_info_page(&state.views, &nav_bar(true), &session.state.user, record),
    )
}

fn login_redirect() -> Response {
    Redirect::temporary(&format!("/login?return_to={DEFAULT_RETURN_TO}")).into_response()
}

#[cfg(test)]
#[path = "pages_test.rs"]
mod tests;
