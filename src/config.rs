//! Application settings resolved from the environment.
//!
//! DESIGN
//! ======
//! `Settings` is built once in `main` and shared read-only through
//! `AppState`. Reading never fails: an absent identity field is an empty
//! string, and the session provider decides what to do about it.

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_PORT: u16 = 3000;

/// Identity field names, in the order diagnostics list them.
pub const IDENTITY_FIELDS: [&str; 4] = ["auth0_domain", "auth0_client_id", "auth0_callback_url", "auth0_audience"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub auth0_domain: String,
    pub auth0_client_id: String,
    /// Only sent on token requests when present (confidential clients).
    pub auth0_client_secret: Option<String>,
    pub auth0_callback_url: String,
    pub auth0_audience: String,
    pub api_base_url: String,
    /// Deployment environment name (`APP_ENV`), empty when unset.
    pub env: String,
    pub port: u16,
    pub cookie_secure: bool,
}

impl Settings {
    /// Read settings from the process environment.
    ///
    /// - `AUTH0_DOMAIN`, `AUTH0_CLIENT_ID`, `AUTH0_CALLBACK_URL`, `AUTH0_AUDIENCE`
    /// - `AUTH0_CLIENT_SECRET` (optional)
    /// - `API_BASE_URL` (default `http://localhost:8080`)
    /// - `APP_ENV`, `PORT` (default 3000), `COOKIE_SECURE`
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let auth0_callback_url = var("AUTH0_CALLBACK_URL").unwrap_or_default();
        let cookie_secure = var("COOKIE_SECURE")
            .and_then(|raw| parse_bool(&raw))
            .unwrap_or_else(|| auth0_callback_url.starts_with("https://"));
        let api_base_url = var("API_BASE_URL")
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_owned())
            .trim_end_matches('/')
            .to_owned();
        let port = var("PORT")
            .and_then(|raw| raw.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        Self {
            auth0_domain: var("AUTH0_DOMAIN").unwrap_or_default(),
            auth0_client_id: var("AUTH0_CLIENT_ID").unwrap_or_default(),
            auth0_client_secret: var("AUTH0_CLIENT_SECRET"),
            auth0_callback_url,
            auth0_audience: var("AUTH0_AUDIENCE").unwrap_or_default(),
            api_base_url,
            env: var("APP_ENV").unwrap_or_default(),
            port,
            cookie_secure,
        }
    }

    /// Names of the identity fields that are empty, in [`IDENTITY_FIELDS`] order.
    #[must_use]
    pub fn missing_identity_fields(&self) -> Vec<&'static str> {
        let values = [&self.auth0_domain, &self.auth0_client_id, &self.auth0_callback_url, &self.auth0_audience];
        IDENTITY_FIELDS
            .into_iter()
            .zip(values)
            .filter(|(_, value)| value.is_empty())
            .map(|(name, _)| name)
            .collect()
    }
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
