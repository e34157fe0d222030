//! # Error Taxonomy
//!
//! Every failure the session can observe falls into one of these types:
//!
//! - [`DecodeError`]: local file or byte handling
//! - [`ServiceError`]: anything that went wrong talking to a collaborator
//! - [`SessionError`]: what a trigger on the session returns, wrapping the above
//!   plus the re-entrancy and precondition rejections
//!
//! [`ErrorKind`] flattens a [`SessionError`] into a comparable tag, and
//! [`ErrorInfo`] is the cloneable record the session keeps as its last error.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Failure while materialising or emitting image bytes.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("image payload is empty")]
    Empty,

    #[error("unsupported media type: {0}")]
    UnsupportedFormat(String),

    #[error("invalid data URL: {0}")]
    DataUrl(String),

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Normalised outcome of a failed collaborator call.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Network failure, timeout or non-2xx status.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Well-formed envelope carrying `success: false`.
    #[error("request rejected by service{}", rejection_suffix(.0))]
    Rejected(Option<String>),

    /// Envelope did not match the expected shape.
    #[error("malformed response: {0}")]
    Malformed(String),
}

fn rejection_suffix(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|m| format!(": {m}"))
        .unwrap_or_default()
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ServiceError::Transport(format!("request timed out: {err}"))
        } else {
            ServiceError::Transport(err.to_string())
        }
    }
}

/// Which image slot of the session a trigger refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSlot {
    Original,
    Cloaked,
}

impl std::fmt::Display for ImageSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageSlot::Original => f.write_str("original"),
            ImageSlot::Cloaked => f.write_str("cloaked"),
        }
    }
}

/// Returned by every session trigger that did not complete.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Another cloak or verify is in flight. No call was made.
    #[error("session is busy with another operation")]
    Busy,

    /// The trigger needs an image the session does not hold. No call was made.
    #[error("no {0} image in session")]
    MissingImage(ImageSlot),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Busy => ErrorKind::Busy,
            SessionError::MissingImage(_) => ErrorKind::MissingImage,
            SessionError::Decode(_) => ErrorKind::Decode,
            SessionError::Service(err) => ErrorKind::from(err),
        }
    }

    /// True when the rejection happened before any collaborator was contacted.
    pub fn is_local_rejection(&self) -> bool {
        matches!(self, SessionError::Busy | SessionError::MissingImage(_))
    }
}

/// Flat classification of [`SessionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Busy,
    MissingImage,
    Decode,
    Transport,
    Rejected,
    Malformed,
}

impl From<&ServiceError> for ErrorKind {
    fn from(err: &ServiceError) -> Self {
        match err {
            ServiceError::Transport(_) => ErrorKind::Transport,
            ServiceError::Rejected(_) => ErrorKind::Rejected,
            ServiceError::Malformed(_) => ErrorKind::Malformed,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Busy => "busy",
            ErrorKind::MissingImage => "missing_image",
            ErrorKind::Decode => "decode",
            ErrorKind::Transport => "transport",
            ErrorKind::Rejected => "rejected",
            ErrorKind::Malformed => "malformed",
        };
        f.write_str(name)
    }
}

/// The error record a session keeps in its `last_error` slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&SessionError> for ErrorInfo {
    fn from(err: &SessionError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
