//! Error types for the sidecar injection pipeline
//!
//! Every failure a mutator can produce is one variant here. Display strings
//! are part of the contract: admission responses surface them verbatim, so
//! callers must not wrap them.

use thiserror::Error;

/// Main error type for injection operations
#[derive(Debug, Error)]
pub enum Error {
    /// A pod annotation does not follow its documented format
    #[error("malformed annotation {annotation}, expected format: {expected}")]
    MalformedAnnotation {
        /// Full annotation key (e.g. "appmesh.k8s.aws/secretMounts")
        annotation: String,
        /// Expected format (e.g. "secretName:mountPath")
        expected: String,
    },

    /// Template text is not syntactically valid
    #[error("failed to parse template {template}: {message}")]
    TemplateParse {
        /// Template name
        template: String,
        /// Parser diagnostic
        message: String,
    },

    /// Template parsed but could not be executed against its variables
    #[error("failed to execute template {template}: {message}")]
    TemplateExec {
        /// Template name
        template: String,
        /// Execution diagnostic
        message: String,
    },

    /// Rendered template output could not be decoded into a Kubernetes type
    #[error("failed to decode rendered template {template}: {source}")]
    Decode {
        /// Template name
        template: String,
        /// The underlying serde_json error
        #[source]
        source: serde_json::Error,
    },

    /// A resource quantity string is invalid
    #[error("unable to parse quantity {quantity:?}: {reason}")]
    QuantityParse {
        /// The offending input
        quantity: String,
        /// Why the parser rejected it
        reason: &'static str,
    },

    /// Process-wide injector configuration is inconsistent
    #[error("{message}")]
    ConfigValidation {
        /// Description of what's invalid
        message: String,
    },

    /// A configuration value was rejected while mutating a pod
    #[error("{message}")]
    InvalidConfig {
        /// Description of what's invalid
        message: String,
    },
}

impl Error {
    /// Create a malformed annotation error
    pub fn malformed_annotation(annotation: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::MalformedAnnotation {
            annotation: annotation.into(),
            expected: expected.into(),
        }
    }

    /// Create a decode error for the named template
    pub fn decode(template: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode {
            template: template.into(),
            source,
        }
    }

    /// Create a configuration validation error
    pub fn config_validation(msg: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: msg.into(),
        }
    }

    /// Create an invalid configuration error raised at mutation time
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: msg.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_annotation_display() {
        let err = Error::malformed_annotation(
            "appmesh.k8s.aws/secretMounts",
            "secretName:mountPath",
        );
        assert_eq!(
            err.to_string(),
            "malformed annotation appmesh.k8s.aws/secretMounts, expected format: secretName:mountPath"
        );
    }

    #[test]
    fn test_config_validation_display_is_verbatim() {
        let err = Error::config_validation("only one tracer");
        assert_eq!(err.to_string(), "only one tracer");
    }

    #[test]
    fn test_quantity_display_quotes_input() {
        let err = Error::QuantityParse {
            quantity: "abc".to_string(),
            reason: "bad",
        };
        assert_eq!(err.to_string(), "unable to parse quantity \"abc\": bad");
    }

    #[test]
    fn test_decode_error_keeps_source() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = Error::decode("envoy", source);
        assert!(err.to_string().starts_with("failed to decode rendered template envoy:"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
