//! Error type for `tally-upstream`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Credentials are missing or the login exchange was rejected.
  #[error("authentication failed: {0}")]
  Auth(String),

  /// The upstream answered with a non-2xx status.
  #[error("upstream returned {status}: {body}")]
  Upstream { status: u16, body: String },

  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("unexpected response shape: {0}")]
  Decode(#[from] serde_json::Error),

  #[error("missing configuration: {0}")]
  MissingConfig(&'static str),
}

impl Error {
  /// Whether this error must abort the whole invocation rather than be
  /// recorded against a single item.
  pub fn is_fatal(&self) -> bool {
    matches!(self, Self::Auth(_) | Self::MissingConfig(_))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
