//! Route handlers.
//!
//! | Method | Path | Body |
//! |--------|------|------|
//! | `GET`  | `/health` | none; unauthenticated |
//! | `POST` | `/collect/daily-activity` | [`DailyActivityRequest`](tally_collect::activity::DailyActivityRequest) |
//! | `POST` | `/collect/homework` | [`HomeworkRequest`](tally_collect::homework::HomeworkRequest) |
//! | `POST` | `/collect/wrong-detail` | [`WrongDetailRequest`](tally_collect::wrong_detail::WrongDetailRequest) |

pub mod daily_activity;
pub mod homework;
pub mod wrong_detail;

use axum::{Json, body::Bytes};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::error::ApiError;

/// `GET /health`
pub async fn health() -> Json<Value> { Json(json!({ "status": "ok" })) }

/// Parse a JSON request body; an empty body means "all defaults".
pub(crate) fn parse_body<T>(body: &Bytes) -> Result<T, ApiError>
where
  T: DeserializeOwned + Default,
{
  if body.iter().all(u8::is_ascii_whitespace) {
    return Ok(T::default());
  }
  serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(e.to_string()))
}
