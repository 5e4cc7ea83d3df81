//! Core data types for fragment activations and their outcomes.

use serde::{Deserialize, Serialize};

use crate::negotiate::DEFAULT_ACCEPT;

/// Immutable snapshot of what to load, taken at the moment a load begins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationRequest {
    /// Resolved source locator. Empty means "not configured".
    pub locator: String,
    /// Accepted content type (or comma-separated list of types).
    pub accept: String,
}

impl ActivationRequest {
    /// Build a request, falling back to `text/html` when `accept` is blank.
    pub fn new(locator: impl Into<String>, accept: impl Into<String>) -> Self {
        let accept = accept.into();
        let accept = if accept.trim().is_empty() {
            DEFAULT_ACCEPT.to_string()
        } else {
            accept.trim().to_string()
        };
        Self {
            locator: locator.into(),
            accept,
        }
    }

    /// Build a request with the default accept type.
    pub fn html(locator: impl Into<String>) -> Self {
        Self::new(locator, DEFAULT_ACCEPT)
    }
}

/// When an attached element starts loading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadingMode {
    /// Load as soon as the element is attached with a locator.
    #[default]
    Eager,
    /// Wait until the element is visible in its document.
    Lazy,
}

impl LoadingMode {
    /// Normalize an attribute value. Anything but `lazy` is `eager`.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("lazy") {
            Self::Lazy
        } else {
            Self::Eager
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eager => "eager",
            Self::Lazy => "lazy",
        }
    }
}

impl std::fmt::Display for LoadingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-element lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    #[default]
    Idle,
    Loading,
    Loaded,
    Errored,
}

impl LifecycleState {
    /// Whether this state ends an activation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Loaded | Self::Errored)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Loading => write!(f, "loading"),
            Self::Loaded => write!(f, "loaded"),
            Self::Errored => write!(f, "errored"),
        }
    }
}

/// Why a load failed. Every variant is terminal for its activation.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FragmentError {
    #[error("missing src")]
    NoSource,

    #[error("Failed to load resource: {reason}")]
    Network { reason: String },

    #[error("Failed to load resource: the server responded with a status of {code}")]
    HttpStatus { code: u16 },

    #[error(
        "Failed to load resource: expected {expected} but was {}",
        .actual.as_deref().unwrap_or("no content type")
    )]
    TypeMismatch {
        expected: String,
        actual: Option<String>,
    },

    #[error("Failed to sanitize fragment: {reason}")]
    Sanitization { reason: String },
}

impl FragmentError {
    /// Short machine-friendly name for logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoSource => "no_source",
            Self::Network { .. } => "network",
            Self::HttpStatus { .. } => "http_status",
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::Sanitization { .. } => "sanitization",
        }
    }
}

/// Result of one pipeline run: the markup to splice, or why it failed.
pub type LoadOutcome = Result<String, FragmentError>;
