//! Error types for the extension runtime.

use crate::contract::ExtensionScope;
use thiserror::Error;

/// Result type for extension operations.
pub type Result<T> = std::result::Result<T, ExtensionError>;

/// Extension runtime error types.
///
/// The enum is `Clone` so that a failed adaptive cell can re-raise the
/// original error on every later lookup without rebuilding anything.
#[derive(Debug, Clone, Error)]
pub enum ExtensionError {
    /// A caller-supplied argument was rejected before any work started.
    #[error("invalid argument for extension point `{point}`: {reason}")]
    InvalidArgument { point: String, reason: String },

    /// No provider is registered under the requested name. Scan-time
    /// failures whose line key starts with the name are carried along.
    #[error("no extension `{name}` for point `{point}`{}", render_causes(.causes))]
    NotFound {
        point: String,
        name: String,
        causes: Vec<String>,
    },

    /// Two providers claimed the same name without an overriding strategy.
    #[error(
        "duplicate extension name `{name}` for point `{point}`: `{existing}` and `{duplicate}`"
    )]
    Ambiguous {
        point: String,
        name: String,
        existing: String,
        duplicate: String,
    },

    /// A second adaptive provider was registered for the same point.
    #[error(
        "more than one adaptive provider for point `{point}`: `{existing}` and `{duplicate}`"
    )]
    AmbiguousAdaptive {
        point: String,
        existing: String,
        duplicate: String,
    },

    /// The point declares a default name that is not a single token.
    #[error("invalid default extension name `{value}` on point `{point}`")]
    InvalidDefaultName { point: String, value: String },

    /// Constructing, wrapping or initialising an instance failed.
    #[error("extension `{name}` of point `{point}` could not be built: {cause}")]
    Build {
        point: String,
        name: String,
        cause: String,
    },

    /// The point has neither an adaptive provider nor an adaptive binding.
    #[error("no adaptive instance available for point `{point}`: {reason}")]
    AdaptiveUnavailable { point: String, reason: String },

    /// An adaptive method was invoked without a request URL.
    #[error("adaptive call `{point}::{method}` received no URL")]
    MissingUrl { point: String, method: String },

    /// An adaptive method is outside the dispatch table of its facade.
    #[error("method `{method}` of point `{point}` does not support adaptive dispatch")]
    Unsupported { point: String, method: String },

    /// No dispatch key matched and the point declares no default name.
    #[error(
        "adaptive call `{point}::{method}` found no extension name in url keys [{}] \
         and the point declares no default",
        .keys.join(", ")
    )]
    NoDispatchName {
        point: String,
        method: String,
        keys: Vec<String>,
    },

    /// The point's declared scope matches neither this director nor any
    /// ancestor.
    #[error(
        "extension point `{point}` declares scope {declared:?} which matches no director \
         in a chain ending at scope {searched:?}"
    )]
    ScopeMismatch {
        point: String,
        declared: ExtensionScope,
        searched: ExtensionScope,
    },

    /// A request URL failed to parse.
    #[error("invalid url `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    /// The director or loader was destroyed before the call.
    #[error("{0} is destroyed")]
    Destroyed(String),

    /// Invariant violation inside the runtime itself.
    #[error("internal extension runtime error: {0}")]
    Internal(String),
}

impl ExtensionError {
    /// True when the error is the destroyed-signal kind.
    pub fn is_destroyed(&self) -> bool {
        matches!(self, ExtensionError::Destroyed(_))
    }
}

fn render_causes(causes: &[String]) -> String {
    if causes.is_empty() {
        return String::from(", no recorded scan failures match; check that the provider is registered");
    }
    let mut out = String::from(", possible causes:");
    for (i, cause) in causes.iter().enumerate() {
        out.push_str(&format!("\n({}) {}", i + 1, cause));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_lists_causes() {
        let err = ExtensionError::NotFound {
            point: "relay.Probe".to_string(),
            name: "gzip".to_string(),
            causes: vec!["gzip=relay::GzipProbe: unresolved path".to_string()],
        };
        let text = err.to_string();
        assert!(text.contains("no extension `gzip`"));
        assert!(text.contains("(1) gzip=relay::GzipProbe"));
    }

    #[test]
    fn test_destroyed_detection() {
        assert!(ExtensionError::Destroyed("loader".to_string()).is_destroyed());
        assert!(!ExtensionError::Internal("x".to_string()).is_destroyed());
    }
}
