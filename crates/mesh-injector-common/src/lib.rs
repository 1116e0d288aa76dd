//! Common types for mesh-injector: errors, templates, quantities and mesh snapshots

#![deny(missing_docs)]

pub mod error;
pub mod mesh;
pub mod quantity;
pub mod template;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
