//! Error types.
//!
//! Two kinds of failure exist and they never mix:
//!
//! - [`Error`]: infrastructure, such as binding the listener or parsing
//!   the listen address.
//! - [`HttpError`]: application, something a handler wants to answer with
//!   a status code and a message. Bind failures convert into it, so `?`
//!   works inside handlers.

use std::fmt;
use std::net::AddrParseError;

use http::StatusCode;
use serde::Serialize;

use crate::binder::BindError;
use crate::response::{IntoResponse, Response};

/// The error type returned by roost's infrastructure operations.
#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Addr(AddrParseError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Addr(e) => write!(f, "invalid listen address: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Addr(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<AddrParseError> for Error {
    fn from(e: AddrParseError) -> Self {
        Self::Addr(e)
    }
}

// ── HttpError ─────────────────────────────────────────────────────────────────

/// An error a handler answers with: a status code plus a human-readable
/// message.
///
/// ```rust
/// use roost::{HttpError, Request, Response};
///
/// async fn show(req: Request) -> Result<Response, HttpError> {
///     let id = req.param("id").ok_or_else(|| HttpError::bad_request("missing id"))?;
///     Ok(Response::text(format!("order {id}")))
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpError {
    pub status: StatusCode,
    pub message: String,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "http {}: {}", self.status.as_u16(), self.message)
    }
}

impl std::error::Error for HttpError {}

impl From<BindError> for HttpError {
    fn from(e: BindError) -> Self {
        Self::new(e.status(), e.to_string())
    }
}

/// Wire shape of an error response.
#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    code: u16,
    message: &'a str,
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let body = ErrorBody { success: false, code: self.status.as_u16(), message: &self.message };
        Response::builder().status(self.status).json(&body)
    }
}

impl IntoResponse for BindError {
    fn into_response(self) -> Response {
        HttpError::from(self).into_response()
    }
}
