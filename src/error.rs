use std::borrow::Cow;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use static_assertions::assert_impl_all;
use thiserror::Error;

use crate::proto::ProtocolError;

/// Errors for X11 connections and requests.
#[non_exhaustive]
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("invalid display name: {0}")]
    ParseError(&'static &'static str),

    #[error("connection closed")]
    ConnectionClosed,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("extension {0} not present")]
    ExtensionNotPresent(Cow<'static, str>),

    #[error("request {sequence} failed and its error was delivered to connection error stream")]
    UncheckedError { sequence: u64 },

    #[error("connection setup refused: {0}")]
    SetupRefused(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("unable to unmarshal {entity} due to {reason}")]
    UnmarshalError { entity: &'static str, reason: Cow<'static, str> },

    #[error("request {request} of {len} bytes exceeds maximum request length {max}")]
    RequestTooLarge { request: &'static str, len: usize, max: usize },

    #[error("bad arguments: {0}")]
    BadArguments(&'static &'static str),

    #[error("resource ids exhausted")]
    IdsExhausted,

    #[error("timeout")]
    Timeout,

    #[error("unexpected error: {0}")]
    UnexpectedError(String),

    #[error(transparent)]
    Custom(CustomError),
}

#[derive(Error, Clone, Debug)]
pub struct CustomError {
    message: Option<Arc<Cow<'static, str>>>,
    source: Option<Arc<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Display for CustomError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match (self.message.as_ref(), self.source.as_ref()) {
            (Some(message), None) => f.write_str(message),
            (Some(message), Some(err)) => write!(f, "{message}: {err}"),
            (None, Some(err)) => err.fmt(f),
            _ => unreachable!("no error message or source"),
        }
    }
}

impl PartialEq for CustomError {
    fn eq(&self, other: &Self) -> bool {
        if !self.message.eq(&other.message) {
            return false;
        }
        match (self.source.as_ref(), other.source.as_ref()) {
            (Some(lhs), Some(rhs)) => Arc::ptr_eq(lhs, rhs),
            (None, None) => true,
            _ => false,
        }
    }
}

impl Eq for CustomError {}

impl Error {
    /// Whether this error ends the connection for all outstanding and future requests.
    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::ConnectionClosed | Self::SetupRefused(_) | Self::AuthenticationRequired(_))
    }

    /// Protocol error reported by server, if any.
    pub fn protocol_error(&self) -> Option<&ProtocolError> {
        match self {
            Self::Protocol(err) => Some(err),
            _ => None,
        }
    }

    pub(crate) fn with_other(
        message: impl Into<Cow<'static, str>>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Custom(CustomError { message: Some(Arc::new(message.into())), source: Some(Arc::new(source)) })
    }
}

assert_impl_all!(Error: Send, Sync);
