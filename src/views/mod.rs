//! Server-rendered pages.
//!
//! Templates are compiled into the binary and rendered with `minijinja`,
//! which HTML-escapes every interpolated value (template names end in
//! `.html`). Page modules build plain serializable contexts; nothing here
//! touches session or network state.

pub mod nav;
pub mod pages;

use minijinja::Environment;
use serde::Serialize;

const TEMPLATES: [(&str, &str); 5] = [
    ("layout.html", include_str!("templates/layout.html")),
    ("public.html", include_str!("templates/public.html")),
    ("callback.html", include_str!("templates/callback.html")),
    ("my_info.html", include_str!("templates/my_info.html")),
    ("diagnostic.html", include_str!("templates/diagnostic.html")),
];

pub struct Views {
    env: Environment<'static>,
}

impl Views {
    /// Compile all page templates.
    ///
    /// # Errors
    ///
    /// Returns the template syntax error, if any.
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        for (name, source) in TEMPLATES {
            env.add_template(name, source)?;
        }
        Ok(Self { env })
    }

    /// Render a named template.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown template or a failed render.
    pub fn render(&self, name: &str, context: impl Serialize) -> Result<String, minijinja::Error> {
        self.env.get_template(name)?.render(context)
    }
}
