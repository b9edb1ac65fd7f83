//! Continuation of the wrong-detail pass across invocations.
//!
//! A [`ChainRequest`] names only the target date and the depth. Which
//! activities still need detail is re-derived from the store on every hop.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// The state threaded between wrong-detail invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainRequest {
  pub target_date: NaiveDate,
  pub chain_depth: u32,
}

impl ChainRequest {
  pub fn root(target_date: NaiveDate) -> Self {
    Self { target_date, chain_depth: 0 }
  }

  /// The request for the next hop.
  pub fn next(self) -> Self {
    Self { target_date: self.target_date, chain_depth: self.chain_depth + 1 }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
  Pending,
  Running,
  Done,
  Failed,
}

impl JobStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Pending => "pending",
      Self::Running => "running",
      Self::Done => "done",
      Self::Failed => "failed",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "pending" => Ok(Self::Pending),
      "running" => Ok(Self::Running),
      "done" => Ok(Self::Done),
      "failed" => Ok(Self::Failed),
      other => Err(Error::UnknownJobStatus(other.to_owned())),
    }
  }
}

/// A persisted continuation, unique per (target date, depth).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainJob {
  pub job_id:     Uuid,
  pub request:    ChainRequest,
  pub status:     JobStatus,
  pub attempts:   u32,
  pub last_error: Option<String>,
  pub run_after:  DateTime<Utc>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn next_increments_depth_by_one() {
    let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
    let req = ChainRequest::root(date).next().next();
    assert_eq!(req.chain_depth, 2);
    assert_eq!(req.target_date, date);
  }

  #[test]
  fn request_uses_camel_case_fields() {
    let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
    let json = serde_json::to_value(ChainRequest::root(date)).unwrap();
    assert_eq!(json["targetDate"], "2024-03-04");
    assert_eq!(json["chainDepth"], 0);
  }
}
