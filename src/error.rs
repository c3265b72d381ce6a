// src/error.rs
//! Error types for the credential flow.
//!
//! Ordinary failures of a credential request (the user declining, the popup
//! being closed, a timeout) are values of [`HandshakeError`] returned through
//! `Result`, never panics.

use thiserror::Error;

/// Outcome of a credential request that did not yield a presentation.
///
/// The `Display` form of each variant is the reason string handed to callers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// The identity provider URL could not be used to build the flow URL.
    #[error("invalid identity provider URL: {0}")]
    InvalidIdentityProvider(String),

    /// The identity provider reported an error (e.g. the user declined consent).
    /// Carried verbatim.
    #[error("{0}")]
    Rejected(String),

    /// A correlated result carried neither an error nor a presentation.
    #[error("missing verifiable presentation")]
    MissingPresentation,

    /// A correlated result could not be decoded.
    #[error("malformed result message: {0}")]
    MalformedResult(String),

    #[error("popup closed")]
    PopupClosed,

    #[error("popup blocked")]
    PopupBlocked,

    #[error("timeout")]
    Timeout,

    #[error("window error: {0}")]
    Window(#[from] WindowError),
}

/// Failures reported by the window host.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WindowError {
    /// The host refused to open the popup.
    #[error("popup was blocked by the host")]
    Blocked,

    /// The popup is gone and can no longer receive messages.
    #[error("target window is closed")]
    Closed,

    #[error("failed to post message: {0}")]
    PostMessage(String),
}

/// Errors from decoding a verifiable presentation.
#[derive(Debug, Error)]
pub enum PresentationError {
    #[error("expected 3 JWT segments, found {0}")]
    SegmentCount(usize),

    #[error("invalid base64url segment: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("presentation has no `vp` claim")]
    MissingVpClaim,

    #[error("credential {index} is not a JWT string")]
    CredentialNotString { index: usize },
}

/// Errors raised when building credential specs from templates or user input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SpecError {
    #[error("Only one argument is supported")]
    TooManyArguments,

    #[error("Expected a number")]
    ExpectedNumber,

    #[error("Expected a string")]
    ExpectedString,

    #[error("empty credential argument")]
    EmptyArgument,
}

/// Errors from the remote credential validation API.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The service answered and rejected the presentation.
    #[error("credential rejected: {0}")]
    Rejected(String),

    #[error("validation service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid validation endpoint: {0}")]
    Endpoint(String),

    #[error("validation request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Errors loading application settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}
