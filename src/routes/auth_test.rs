use std::sync::Arc;

use axum::http::StatusCode;

use super::*;
use crate::routes::app;
use crate::routes::test_client::{body_text, get, location, set_cookie, sign_in};
use crate::state::test_helpers::{MOCK_AUTHORIZE_URL, MOCK_LOGOUT_URL, MockIdentity, state_param, test_app_state, test_settings};

const UNUSED_API: &str = "http://127.0.0.1:9";

fn test_app(mock: MockIdentity) -> (axum::Router, Arc<MockIdentity>) {
    let mock = Arc::new(mock);
    (app(test_app_state(UNUSED_API, Arc::clone(&mock))), mock)
}

// =============================================================================
// misconfiguration
// =============================================================================

#[tokio::test]
async fn misconfigured_identity_renders_diagnostic_on_every_page() {
    let mut settings = test_settings(UNUSED_API);
    settings.auth0_domain = String::new();
    settings.auth0_audience = String::new();
    let identity = Identity::bootstrap(&settings, |_| unreachable!("build must not run")).unwrap();
    let router = app(AppState::with_identity(settings, identity).unwrap());

    for path in ["/", "/me", "/callback", "/login", "/signup", "/logout"] {
        let response = get(&router, path, &[]).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE, "{path}");
        let body = body_text(response).await;
        assert!(body.contains("Missing: auth0_domain, auth0_audience"), "{path}");
        assert!(!body.contains("Log In"), "{path}");
    }
}

#[tokio::test]
async fn healthz_ignores_configuration() {
    let mut settings = test_settings(UNUSED_API);
    settings.auth0_client_id = String::new();
    let identity = Identity::bootstrap(&settings, |_| unreachable!("build must not run")).unwrap();
    let router = app(AppState::with_identity(settings, identity).unwrap());

    assert_eq!(get(&router, "/healthz", &[]).await.status(), StatusCode::OK);
}

// =============================================================================
// login / signup
// =============================================================================

#[tokio::test]
async fn login_redirects_to_provider_with_state_cookie() {
    let (router, _) = test_app(MockIdentity::new());
    let response = get(&router, "/login", &[]).await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let url = location(&response);
    assert!(url.starts_with(MOCK_AUTHORIZE_URL));
    assert!(url.contains("prompt=login"));
    assert!(!url.contains("screen_hint"));

    let cookie = set_cookie(&response, OAUTH_STATE_COOKIE_NAME).unwrap();
    assert_eq!(cookie, state_param(&url));
}

#[tokio::test]
async fn signup_redirect_carries_screen_hint() {
    let (router, _) = test_app(MockIdentity::new());
    let response = get(&router, "/signup", &[]).await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let url = location(&response);
    assert!(url.contains("prompt=login"));
    assert!(url.contains("screen_hint=signup"));
}

#[tokio::test]
async fn oauth_state_cookie_is_http_only() {
    let (router, _) = test_app(MockIdentity::new());
    let response = get(&router, "/login", &[]).await;
    let header = response
        .headers()
        .get(axum::http::header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .unwrap()
        .to_owned();
    assert!(header.contains("HttpOnly"));
    assert!(header.contains("SameSite=Lax"));
}

// =============================================================================
// callback
// =============================================================================

#[tokio::test]
async fn callback_lands_on_default_return_path() {
    let (router, mock) = test_app(MockIdentity::new());
    let (session_id, callback) = sign_in(&router, "code-1", None).await;

    assert_eq!(callback.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&callback), DEFAULT_RETURN_TO);
    assert_eq!(session_id.len(), 64);
    assert_eq!(mock.exchanges.lock().unwrap()[0].0, "code-1");
}

#[tokio::test]
async fn callback_honours_requested_return_path() {
    let (router, _) = test_app(MockIdentity::new());
    let (_, callback) = sign_in(&router, "code-1", Some("/foo")).await;
    assert_eq!(location(&callback), "/foo");
}

#[tokio::test]
async fn callback_ignores_return_path_with_tab_between_slashes() {
    let (router, _) = test_app(MockIdentity::new());
    let (_, callback) = sign_in(&router, "code-1", Some("/%09/evil.example")).await;
    assert_eq!(callback.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&callback), DEFAULT_RETURN_TO);
}

#[tokio::test]
async fn callback_ignores_return_path_with_control_characters() {
    let (router, _) = test_app(MockIdentity::new());
    for return_to in ["/a%01b", "/a%7Fb", "/%0D%0A/evil.example"] {
        let (_, callback) = sign_in(&router, "code-1", Some(return_to)).await;
        assert_eq!(callback.status(), StatusCode::TEMPORARY_REDIRECT, "{return_to}");
        assert_eq!(location(&callback), DEFAULT_RETURN_TO, "{return_to}");
    }
}

#[tokio::test]
async fn session_cookie_carries_max_age() {
    let (router, _) = test_app(MockIdentity::new());
    let (_, callback) = sign_in(&router, "code-1", None).await;
    let header = callback
        .headers()
        .get_all(axum::http::header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|value| value.starts_with(SESSION_COOKIE_NAME))
        .unwrap()
        .to_owned();
    assert!(header.contains("Max-Age=604800"));
}

#[tokio::test]
async fn callback_clears_oauth_state_cookie() {
    let (router, _) = test_app(MockIdentity::new());
    let (_, callback) = sign_in(&router, "code-1", None).await;
    assert_eq!(set_cookie(&callback, OAUTH_STATE_COOKIE_NAME).as_deref(), Some(""));
}

#[tokio::test]
async fn signed_in_public_page_shows_logout() {
    let (router, _) = test_app(MockIdentity::new());
    let (session_id, _) = sign_in(&router, "code-1", None).await;

    let body = body_text(get(&router, "/", &[(SESSION_COOKIE_NAME, &session_id)]).await).await;
    assert!(body.contains("Log Out"));
    assert!(body.contains("My Info (protected)"));
    assert!(!body.contains("Sign Up"));
}

#[tokio::test]
async fn callback_with_provider_error_renders_description() {
    let (router, mock) = test_app(MockIdentity::new());
    let response = get(
        &router,
        "/callback?error=access_denied&error_description=User%20cancelled&state=abc",
        &[(OAUTH_STATE_COOKIE_NAME, "abc")],
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(set_cookie(&response, SESSION_COOKIE_NAME).is_none());
    let body = body_text(response).await;
    assert!(body.contains("access_denied: User cancelled"));
    assert!(mock.exchanges.lock().unwrap().is_empty());
}

#[tokio::test]
async fn callback_with_mismatched_state_is_rejected() {
    let (router, mock) = test_app(MockIdentity::new());
    let login = get(&router, "/login", &[]).await;
    let oauth_state = set_cookie(&login, OAUTH_STATE_COOKIE_NAME).unwrap();

    let response = get(
        &router,
        "/callback?code=code-1&state=forged",
        &[(OAUTH_STATE_COOKIE_NAME, &oauth_state)],
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(set_cookie(&response, SESSION_COOKIE_NAME).is_none());
    assert!(mock.exchanges.lock().unwrap().is_empty());
}

#[tokio::test]
async fn callback_without_state_cookie_is_rejected() {
    let (router, _) = test_app(MockIdentity::new());
    let login = get(&router, "/login", &[]).await;
    let oauth_state = set_cookie(&login, OAUTH_STATE_COOKIE_NAME).unwrap();

    let response = get(&router, &format!("/callback?code=code-1&state={oauth_state}"), &[]).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn callback_exchange_failure_is_bad_gateway() {
    let mut mock = MockIdentity::new();
    mock.fail_exchange = true;
    let (router, _) = test_app(mock);
    let login = get(&router, "/login", &[]).await;
    let oauth_state = set_cookie(&login, OAUTH_STATE_COOKIE_NAME).unwrap();

    let response = get(
        &router,
        &format!("/callback?code=code-1&state={oauth_state}"),
        &[(OAUTH_STATE_COOKIE_NAME, &oauth_state)],
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(body_text(response).await.contains(r#"class="error""#));
}

#[tokio::test]
async fn bare_callback_signed_out_shows_loading() {
    let (router, _) = test_app(MockIdentity::new());
    let response = get(&router, "/callback", &[]).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("Loading..."));
    assert!(!body.contains(r#"class="error""#));
}

#[tokio::test]
async fn bare_callback_signed_in_goes_to_profile() {
    let (router, _) = test_app(MockIdentity::new());
    let (session_id, _) = sign_in(&router, "code-1", None).await;

    let response = get(&router, "/callback", &[(SESSION_COOKIE_NAME, &session_id)]).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), DEFAULT_RETURN_TO);
}

#[tokio::test]
async fn second_login_replaces_previous_session() {
    let (router, _) = test_app(MockIdentity::new());
    let (first, _) = sign_in(&router, "code-1", None).await;

    let login = get(&router, "/login", &[(SESSION_COOKIE_NAME, &first)]).await;
    let oauth_state = set_cookie(&login, OAUTH_STATE_COOKIE_NAME).unwrap();
    let callback = get(
        &router,
        &format!("/callback?code=code-2&state={oauth_state}"),
        &[(SESSION_COOKIE_NAME, &first), (OAUTH_STATE_COOKIE_NAME, &oauth_state)],
    )
    .await;
    let second = set_cookie(&callback, SESSION_COOKIE_NAME).unwrap();
    assert_ne!(first, second);

    let stale = body_text(get(&router, "/", &[(SESSION_COOKIE_NAME, &first)]).await).await;
    assert!(stale.contains("Log In"));
}

// =============================================================================
// logout
// =============================================================================

#[tokio::test]
async fn logout_ends_session_and_redirects_to_provider() {
    let (router, _) = test_app(MockIdentity::new());
    let (session_id, _) = sign_in(&router, "code-1", None).await;

    let response = get(&router, "/logout", &[(SESSION_COOKIE_NAME, &session_id)]).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), MOCK_LOGOUT_URL);
    assert_eq!(set_cookie(&response, SESSION_COOKIE_NAME).as_deref(), Some(""));

    let after = body_text(get(&router, "/", &[(SESSION_COOKIE_NAME, &session_id)]).await).await;
    assert!(after.contains("Log In"));
    assert!(!after.contains("Log Out"));
}

// =============================================================================
// status mapping
// =============================================================================

#[test]
fn identity_errors_map_to_statuses() {
    assert_eq!(identity_error_status(&IdentityError::InvalidState), StatusCode::BAD_REQUEST);
    assert_eq!(identity_error_status(&IdentityError::MissingCode), StatusCode::BAD_REQUEST);
    assert_eq!(identity_error_status(&IdentityError::TokenExchange("x".into())), StatusCode::BAD_GATEWAY);
    assert_eq!(identity_error_status(&IdentityError::LoginRequired), StatusCode::UNAUTHORIZED);
    assert_eq!(identity_error_status(&IdentityError::Config("x".into())), StatusCode::INTERNAL_SERVER_ERROR);
}
