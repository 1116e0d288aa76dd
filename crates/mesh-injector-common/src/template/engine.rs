//! Template engine for container definitions
//!
//! Uses minijinja with its default `{{ }}` / `{% %}` syntax, strict undefined
//! handling and auto-escaping switched off. String values that land inside
//! JSON are expected to go through the built-in `tojson` filter.

use minijinja::{AutoEscape, Environment, ErrorKind, UndefinedBehavior};
use serde::Serialize;
use tracing::trace;

use super::filters;
use crate::{Error, Result};

/// Template engine used by every mutator
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine {
    /// Create a new engine with strict undefined handling
    ///
    /// Trailing newlines are kept: rendered YAML is embedded in heredocs whose
    /// terminator must start on its own line.
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.set_keep_trailing_newline(true);
        env.add_filter("flag", filters::flag);
        Self { env }
    }

    /// Render `text` under `name` with the given variables
    ///
    /// # Errors
    ///
    /// Returns [`Error::TemplateParse`] for syntax errors and
    /// [`Error::TemplateExec`] for everything that fails while rendering.
    pub fn render<V: Serialize>(&self, name: &str, text: &str, vars: &V) -> Result<String> {
        trace!(template = name, "rendering template");
        self.env
            .render_named_str(name, text, vars)
            .map_err(|err| classify(name, err))
    }
}

/// Render a template with a fresh engine
pub fn render_template<V: Serialize>(name: &str, text: &str, vars: &V) -> Result<String> {
    TemplateEngine::new().render(name, text, vars)
}

fn classify(name: &str, err: minijinja::Error) -> Error {
    let message = match err.detail() {
        Some(detail) => format!("{}: {}", err.kind(), detail),
        None => err.kind().to_string(),
    };
    match err.kind() {
        ErrorKind::SyntaxError => Error::TemplateParse {
            template: name.to_string(),
            message,
        },
        _ => Error::TemplateExec {
            template: name.to_string(),
            message,
        },
    }
}
