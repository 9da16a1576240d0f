use std::io::Cursor;

use mongodb::error::Error as DbError;
use rocket::{
    http::{ContentType, Status},
    response::{Responder, Response},
    serde::json::json,
};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// All the ways a request can fail.
///
/// Each variant maps onto exactly one HTTP status so clients can tell the
/// failure modes apart; in particular a duplicate vote must surface as
/// `Conflict` and never as a generic error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl Error {
    /// Shorthand for a `NotFound` over the given description.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// The HTTP status this error responds with.
    pub fn status(&self) -> Status {
        match self {
            Self::Db(_) | Self::Jwt(_) => Status::InternalServerError,
            Self::BadRequest(_) | Self::InvalidState(_) => Status::BadRequest,
            Self::Unauthorized(_) => Status::Unauthorized,
            Self::Forbidden(_) => Status::Forbidden,
            Self::NotFound(_) => Status::NotFound,
            Self::Conflict(_) => Status::Conflict,
        }
    }

    /// The client-facing message. Infrastructure failures are not leaked.
    fn message(&self) -> String {
        match self {
            Self::Db(_) | Self::Jwt(_) => "Internal server error".to_string(),
            Self::BadRequest(msg)
            | Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::NotFound(msg)
            | Self::InvalidState(msg)
            | Self::Conflict(msg) => msg.clone(),
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    /// Respond with the appropriate status and a `{"message": ...}` body.
    fn respond_to(self, _: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        let status = self.status();
        if status == Status::InternalServerError {
            error!("{self}");
        } else {
            debug!("{self}");
        }

        let body = json!({ "message": self.message() }).to_string();
        Response::build()
            .status(status)
            .header(ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}
