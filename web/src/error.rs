use std::error::Error as StdError;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::*;

pub type Result<T> = core::result::Result<T, Error>;

/// Web layer error. Translates hub errors and request-level failures into
/// HTTP responses without leaking the `ws` crate's internals to clients.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: WebErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum WebErrorKind {
    Hub(ws::ErrorKind),
    /// The request's `Origin` is not accepted by the configured policy.
    ForbiddenOrigin,
}

impl Error {
    pub fn forbidden_origin(origin: &str) -> Self {
        Self {
            source: Some(format!("origin {origin:?} is not allowed").into()),
            error_kind: WebErrorKind::ForbiddenOrigin,
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> core::result::Result<(), std::fmt::Error> {
        match &self.source {
            Some(source) => write!(fmt, "{:?}: {source}", self.error_kind),
            None => write!(fmt, "{:?}", self.error_kind),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self.error_kind {
            WebErrorKind::Hub(hub_error_kind) => match hub_error_kind {
                ws::ErrorKind::UpgradeFailure => (
                    StatusCode::BAD_REQUEST,
                    "Could not create websocket connection",
                )
                    .into_response(),
                ws::ErrorKind::ShutdownInProgress => {
                    (StatusCode::SERVICE_UNAVAILABLE, "SERVICE UNAVAILABLE").into_response()
                }
                ws::ErrorKind::RegistrationConflict | ws::ErrorKind::Serialization => {
                    error!("Internal hub error: {:?}", self.source);
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL SERVER ERROR").into_response()
                }
            },
            WebErrorKind::ForbiddenOrigin => (StatusCode::FORBIDDEN, "FORBIDDEN").into_response(),
        }
    }
}

impl From<ws::Error> for Error {
    fn from(err: ws::Error) -> Self {
        Self {
            error_kind: WebErrorKind::Hub(err.error_kind),
            source: Some(Box::new(err)),
        }
    }
}

impl From<WebSocketUpgradeRejection> for Error {
    fn from(rejection: WebSocketUpgradeRejection) -> Self {
        ws::Error::with_source(ws::ErrorKind::UpgradeFailure, rejection).into()
    }
}
