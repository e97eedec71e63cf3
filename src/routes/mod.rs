//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Three pages (`/`, `/callback`, `/me`) plus the redirect endpoints that
//! drive the identity provider (`/login`, `/signup`, `/logout`). While
//! identity settings are incomplete every page answers with the
//! configuration diagnostic instead.

pub mod auth;
pub mod pages;

use axum::Router;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::views;

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(pages::public))
        .route("/me", get(pages::my_info))
        .route("/callback", get(auth::callback))
        .route("/login", get(auth::login))
        .route("/signup", get(auth::signup))
        .route("/logout", get(auth::logout))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Turn a rendered page into an HTML response; render failures become 500.
pub(crate) fn render(status: StatusCode, rendered: Result<String, minijinja::Error>) -> Response {
    match rendered {
        Ok(body) => (status, Html(body)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "page render failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// The `Missing: ...` diagnostic page.
pub(crate) fn misconfigured(state: &AppState) -> Response {
    let message = state.identity.diagnostic().unwrap_or_default();
    render(StatusCode::SERVICE_UNAVAILABLE, views::pages::diagnostic_page(&state.views, &message))
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
