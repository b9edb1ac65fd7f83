//! API error type and the response envelope.
//!
//! Every collection endpoint answers with
//! `{ "success", "message", "data", "errors"? }`; failures carry
//! `success: false` and `data: null`.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::Serialize;
use tally_collect::{ItemError, Report};
use thiserror::Error;

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
  pub success: bool,
  pub message: String,
  pub data:    Option<T>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub errors:  Option<Vec<ItemError>>,
}

impl<T: Report> Envelope<T> {
  /// A completed run. Item errors make it a partial success, still 200.
  pub fn from_report(report: T) -> Self {
    let errors = report.errors();
    let errors = (!errors.is_empty()).then(|| errors.to_vec());
    Self { success: true, message: report.summary(), data: Some(report), errors }
  }
}

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("unauthorized")]
  Unauthorized,

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error(transparent)]
  Collect(#[from] tally_collect::Error),

  #[error("internal error: {0}")]
  Internal(String),
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = match &self {
      ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Collect(tally_collect::Error::InvalidRequest(_)) => StatusCode::BAD_REQUEST,
      ApiError::Collect(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
      tracing::error!(error = %self, "request failed");
    }
    let body: Envelope<()> = Envelope {
      success: false,
      message: self.to_string(),
      data:    None,
      errors:  None,
    };
    (status, Json(body)).into_response()
  }
}
