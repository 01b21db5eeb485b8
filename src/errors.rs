use std::io;
use thiserror::Error;

/// Reasons a raw request buffer could not be turned into a [`Request`](crate::Request).
///
/// These errors are local to one connection: they never stop the accept loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty request")]
    Empty,

    #[error("malformed request line: expected 3 tokens, found {tokens}")]
    MalformedRequestLine { tokens: usize },

    #[error("unknown request method `{0}`")]
    UnknownMethod(String),

    #[error("request head is not valid UTF-8")]
    InvalidEncoding,
}

/// Failure reported by a route handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// The handler received a value it could not work with.
    #[error("invalid value: {0}")]
    Value(String),

    /// The handler produced or received data of the wrong shape.
    #[error("type mismatch: {0}")]
    Type(String),

    /// An environ-style handler returned a body without starting the response.
    #[error("response body returned before start_response was called")]
    MissingStartResponse,
}

impl HandlerError {
    #[inline]
    pub fn value<M: Into<String>>(msg: M) -> Self {
        Self::Value(msg.into())
    }

    #[inline]
    pub fn type_mismatch<M: Into<String>>(msg: M) -> Self {
        Self::Type(msg.into())
    }
}

/// Errors surfaced by the gateway to its caller.
///
/// Only [`Error::Bind`] is fatal at startup. [`Error::Parse`] and [`Error::Handler`]
/// reach the caller only in debug mode, otherwise they are answered with
/// `500 Internal Server Error`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },

    #[error("server not started, call `start` before polling")]
    NotStarted,

    #[error("failed to accept connection: {0}")]
    Accept(io::Error),

    #[error("connection I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("unparseable request: {0}")]
    Parse(#[from] ParseError),

    #[error("no proper response returned by the handler for '{path}': {source}")]
    Handler { path: String, source: HandlerError },

    #[error("invalid route pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        source: regex::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl Error {
    /// Returns `true` for errors that belong to a single request and are
    /// converted into a `500` response outside of debug mode.
    #[inline]
    pub fn is_request_local(&self) -> bool {
        matches!(self, Error::Parse(_) | Error::Handler { .. })
    }
}
