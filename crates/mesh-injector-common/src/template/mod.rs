//! Container templates rendered with minijinja
//!
//! Sidecar and init-container definitions are kept as JSON (or YAML) text with
//! `{{ ... }}` placeholders. Rendering is a pure function of the template text
//! and a serializable variable record; nothing is cached between calls.
//!
//! Failures are reported as two distinct kinds:
//! - [`Error::TemplateParse`](crate::Error::TemplateParse) when the text is not a valid template
//! - [`Error::TemplateExec`](crate::Error::TemplateExec) when a variable is undefined or a filter fails
//!
//! Decoding the rendered text is the caller's job and has its own error kind.

mod engine;
mod filters;

pub use engine::{render_template, TemplateEngine};
