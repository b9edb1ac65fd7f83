//! Error types for `tally-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown activity kind: {0:?}")]
  UnknownActivityKind(String),

  #[error("unknown activity category: {0:?}")]
  UnknownActivityCategory(String),

  #[error("unknown problem outcome: {0:?}")]
  UnknownOutcome(String),

  #[error("unknown chain job status: {0:?}")]
  UnknownJobStatus(String),

  #[error("invalid date {0:?}: expected YYYY-MM-DD")]
  InvalidDate(String),

  #[error("invalid utc offset: {0} minutes")]
  InvalidOffset(i32),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
