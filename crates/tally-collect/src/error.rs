//! Error type for `tally-collect`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("upstream error: {0}")]
  Upstream(#[from] tally_upstream::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error(transparent)]
  Core(#[from] tally_core::Error),

  /// The request itself is malformed; nothing was attempted.
  #[error("invalid request: {0}")]
  InvalidRequest(String),

  #[error("continuation dispatch failed: {0}")]
  Dispatch(String),
}

impl Error {
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }

  /// Whether this error aborts the invocation. Everything else is recorded
  /// against the item that caused it.
  pub fn is_fatal(&self) -> bool {
    match self {
      Self::Upstream(e) => e.is_fatal(),
      Self::Dispatch(_) => false,
      Self::Store(_) | Self::Core(_) | Self::InvalidRequest(_) => true,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn upstream_status_errors_are_per_item() {
    let err = Error::from(tally_upstream::Error::Upstream { status: 503, body: String::new() });
    assert!(!err.is_fatal());
    let err = Error::from(tally_upstream::Error::Auth("rejected".into()));
    assert!(err.is_fatal());
  }
}
