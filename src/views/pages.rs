//! Page renderers: public, callback, my info, and the config diagnostic.

use minijinja::context;
use serde::Serialize;

use super::Views;
use super::nav::NavBar;
use crate::identity::Claims;

/// One `key: value` line of a data list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub key: String,
    pub value: String,
}

/// Flatten a JSON object into display lines. Strings render bare; every
/// other value renders as compact JSON.
#[must_use]
pub fn entries(map: &Claims) -> Vec<Entry> {
    map.iter()
        .map(|(key, value)| Entry {
            key: key.clone(),
            value: match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            },
        })
        .collect()
}

/// # Errors
///
/// Returns the template render error.
pub fn public_page(views: &Views, nav: &NavBar) -> Result<String, minijinja::Error> {
    views.render("public.html", context! { title => "Public", nav => nav })
}

/// Callback landing page. Shows the identity-flow error when there is one,
/// otherwise the loading placeholder.
///
/// # Errors
///
/// Returns the template render error.
pub fn callback_page(views: &Views, nav: &NavBar, error: Option<&str>) -> Result<String, minijinja::Error> {
    views.render("callback.html", context! { title => "Signing in", nav => nav, error => error })
}

/// Protected page: identity claims, plus the backend record once loaded.
///
/// # Errors
///
/// Returns the template render error.
pub fn my_info_page(
    views: &Views,
    nav: &NavBar,
    user: &Claims,
    record: Option<&Claims>,
) -> Result<String, minijinja::Error> {
    views.render(
        "my_info.html",
        context! {
            title => "My Info",
            nav => nav,
            user => entries(user),
            record_loaded => record.is_some(),
            record => record.map(entries).unwrap_or_default(),
        },
    )
}

/// Shown on every page while identity settings are incomplete.
///
/// # Errors
///
/// Returns the template render error.
pub fn diagnostic_page(views: &Views, message: &str) -> Result<String, minijinja::Error> {
    views.render("diagnostic.html", context! { title => "Configuration error", message => message })
}

#[cfg(test)]
#[path = "pages_test.rs"]
mod tests;
