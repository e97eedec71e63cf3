//! Navigation shell: tabs and auth buttons for the current session.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Tab {
    pub path: &'static str,
    pub label: &'static str,
}

pub const PUBLIC_TAB: Tab = Tab { path: "/", label: "Public" };
pub const MY_INFO_TAB: Tab = Tab { path: "/me", label: "My Info (protected)" };

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonKind {
    Signup,
    Login,
    Logout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Button {
    pub kind: ButtonKind,
    pub label: &'static str,
    pub href: &'static str,
    pub class: &'static str,
}

impl Button {
    #[must_use]
    pub fn new(kind: ButtonKind) -> Self {
        match kind {
            ButtonKind::Signup => Self { kind, label: "Sign Up", href: "/signup", class: "button__sign-up" },
            ButtonKind::Login => Self { kind, label: "Log In", href: "/login", class: "button__login" },
            ButtonKind::Logout => Self { kind, label: "Log Out", href: "/logout", class: "button__logout" },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavBar {
    pub tabs: Vec<Tab>,
    pub buttons: Vec<Button>,
}

/// Nav bar for a session: Public always, My Info only when signed in;
/// Sign Up + Log In when signed out, Log Out when signed in.
#[must_use]
pub fn nav_bar(is_authenticated: bool) -> NavBar {
    if is_authenticated {
        NavBar { tabs: vec![PUBLIC_TAB, MY_INFO_TAB], buttons: vec![Button::new(ButtonKind::Logout)] }
    } else {
        NavBar {
            tabs: vec![PUBLIC_TAB],
            buttons: vec![Button::new(ButtonKind::Signup), Button::new(ButtonKind::Login)],
        }
    }
}

#[cfg(test)]
#[path = "nav_test.rs"]
mod tests;
