//! Error types for catalog payload parsing
//!
//! A parse failure fails only the page that produced it; the owning job keeps
//! going.

use thiserror::Error;

use crate::domain::source::WireFormat;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParsingError {
    #[error("empty {format} response body")]
    EmptyBody { format: WireFormat },

    #[error("malformed {format} payload: {message}")]
    MalformedPayload { format: WireFormat, message: String },

    #[error("unexpected {format} document shape: {reason}")]
    UnexpectedShape { format: WireFormat, reason: String },
}

impl ParsingError {
    pub const fn empty_body(format: WireFormat) -> Self {
        Self::EmptyBody { format }
    }

    pub fn malformed(format: WireFormat, message: impl Into<String>) -> Self {
        Self::MalformedPayload {
            format,
            message: message.into(),
        }
    }

    pub fn unexpected_shape(format: WireFormat, reason: impl Into<String>) -> Self {
        Self::UnexpectedShape {
            format,
            reason: reason.into(),
        }
    }

    /// An empty body is often a transient upstream hiccup; a malformed
    /// document will not fix itself on retry.
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::EmptyBody { .. })
    }

    pub const fn format(&self) -> WireFormat {
        match self {
            Self::EmptyBody { format }
            | Self::MalformedPayload { format, .. }
            | Self::UnexpectedShape { format, .. } => *format,
        }
    }
}

pub type ParsingResult<T> = Result<T, ParsingError>;
