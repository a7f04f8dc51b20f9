use spin_sdk::http::Response;
use thiserror::Error;

use crate::core::helpers::{login_redirect, redirect};
use crate::templates;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad Request: {0}")]
    BadRequest(String),
    #[error("Unauthorized")]
    Unauthorized,
    /// Anonymous access to a page that needs a signed-in user.
    #[error("Login required for {next}")]
    LoginRequired { next: String },
    /// Signed-in user may not act on the resource; send them to a read view.
    #[error("Redirect to {0}")]
    Redirect(String),
    #[error("Not Found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Internal Error: {0}")]
    InternalError(String),
}

impl From<ApiError> for Response {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::LoginRequired { next } => login_redirect(&next),
            ApiError::Redirect(location) => redirect(&location),
            ApiError::NotFound(msg) => templates::not_found_page(&msg),
            ApiError::BadRequest(msg) => plain(400, &msg),
            ApiError::Unauthorized => plain(401, "Unauthorized"),
            ApiError::Conflict(msg) => plain(409, &msg),
            ApiError::InternalError(msg) => plain(500, &msg),
        }
    }
}

// Conversion from anyhow::Error to ApiError for internal errors
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::InternalError(err.to_string())
    }
}

fn plain(status: u16, msg: &str) -> Response {
    Response::builder()
        .status(status)
        .header("content-type", "text/plain; charset=utf-8")
        .body(msg.to_string())
        .build()
}
