//! Crate & protocol level errors.
//!
//! The crate uses a two-layer error taxonomy:
//!
//! ## Transport Layer
//!
//! [`Error`]: connection, framing and parsing failures. These are retried
//! once transparently (reconnect plus retransmit) for idempotent requests
//! and surfaced to the caller otherwise.
//!
//! ## Protocol Layer
//!
//! [`ErrCode`]: wire error codes carried inside a [`Response`], and
//! [`ResponseError`]: the typed failure built from one. Protocol errors are
//! always surfaced, never swallowed — with a single documented exception:
//! [`ErrCode::Range`] terminates directory pagination successfully (see
//! [`Client::getdir_all`](crate::Client::getdir_all)).
//!
//! [`Response`]: crate::msg::Response

use std::time::Duration;
use std::{io, result};

use bytes::Bytes;
use num_derive::FromPrimitive;
use thiserror::Error as ThisError;

use crate::msg::{Request, Response};

pub type Result<T> = result::Result<T, Error>;

/// Transport and connection level errors.
///
/// These are low-level errors that occur during:
/// - Network I/O operations
/// - Frame and message parsing
/// - Connection management
///
/// Protocol-level failures reported by the server travel as
/// [`Error::Response`].
#[derive(Clone, Debug, ThisError)]
pub enum Error {
    /// An error in the network.
    #[error("IO error: {0:?}")]
    IoError(io::ErrorKind),

    /// Could not parse the data.
    #[error("Parsing error: invalid data ({} bytes)", .0.len())]
    ParsingError(Bytes),

    /// Missing data or connection closed.
    #[error("Missing data: {0}")]
    MissingData(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Every cluster address failed across all backoff rounds. Fatal: the
    /// call that triggered the reconnect cannot complete.
    #[error("Connect error: {0}")]
    ConnectError(String),

    /// The server did not answer within the request timeout (after the one
    /// permitted retry for idempotent requests).
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The connection was explicitly disconnected.
    #[error("Connection closed")]
    Closed,

    /// The server answered with a protocol error code.
    #[error(transparent)]
    Response(#[from] ResponseError),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::IoError(e.kind())
    }
}

/// Errors reported by a Doozer server inside a response.
///
/// The numeric values are the wire representation (`err_code` field of a
/// response). An unrecognized code decodes to [`ErrCode::Other`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, Default)]
pub enum ErrCode {
    /// Catch-all for server-side failures with no dedicated code.
    #[default]
    Other = 127,
    /// The request reused a tag that is already pending on this connection.
    TagInUse = 1,
    /// The server does not understand the request verb.
    UnknownVerb = 2,
    /// The addressed node is read-only (e.g. a non-leader during failover).
    Readonly = 3,
    /// The requested revision has already been garbage collected.
    TooLate = 4,
    /// Compare-and-set failure: the given revision is older than the
    /// file's current revision.
    RevMismatch = 5,
    /// The path is not well formed.
    BadPath = 6,
    /// A required request field was absent.
    MissingArg = 7,
    /// The offset is past the end of the result set. Directory pagination
    /// treats this as the documented end-of-results signal.
    Range = 8,
    /// The path exists but is not a directory.
    NotDirectory = 20,
    /// The path exists but is a directory.
    IsDirectory = 21,
    /// The path does not exist.
    NoEntity = 22,
}

/// A typed protocol failure carrying the originating request and the
/// response for diagnostics.
#[derive(Debug, Clone, ThisError)]
#[error("{code:?}: {}", .detail.as_deref().unwrap_or("no detail"))]
pub struct ResponseError {
    /// The decoded wire error code.
    pub code: ErrCode,
    /// Human-readable detail from the server, when present.
    pub detail: Option<String>,
    /// The request that provoked the error.
    pub request: Request,
    /// The full response, including any fields beyond the error pair.
    pub response: Response,
}

impl ResponseError {
    /// Build the typed error from an error-carrying response.
    pub fn new(code: ErrCode, request: Request, response: Response) -> Self {
        ResponseError {
            code,
            detail: response.err_detail.clone(),
            request,
            response,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::FromPrimitive;

    #[test]
    fn err_code_decodes_from_wire_values() {
        assert_eq!(ErrCode::from_i64(127), Some(ErrCode::Other));
        assert_eq!(ErrCode::from_i64(1), Some(ErrCode::TagInUse));
        assert_eq!(ErrCode::from_i64(8), Some(ErrCode::Range));
        assert_eq!(ErrCode::from_i64(20), Some(ErrCode::NotDirectory));
        assert_eq!(ErrCode::from_i64(21), Some(ErrCode::IsDirectory));
        assert_eq!(ErrCode::from_i64(22), Some(ErrCode::NoEntity));
    }

    #[test]
    fn unknown_err_code_has_no_mapping() {
        // The parser falls back to Other for codes it does not know.
        assert_eq!(ErrCode::from_i64(1000), None);
        assert_eq!(ErrCode::from_i64(1000).unwrap_or_default(), ErrCode::Other);
    }

    #[test]
    fn response_error_displays_detail() {
        let response = Response {
            err_code: Some(ErrCode::NoEntity),
            err_detail: Some("/missing".to_string()),
            ..Default::default()
        };
        let err = ResponseError::new(ErrCode::NoEntity, Request::default(), response);
        let shown = err.to_string();
        assert!(shown.contains("NoEntity"));
        assert!(shown.contains("/missing"));
    }
}
