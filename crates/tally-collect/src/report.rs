//! Collection reports.
//!
//! Every phase returns a report that serialises as the `data` member of the
//! endpoint response. Per-item failures travel separately as [`ItemError`]s
//! so a run that finished with some failures is still a (partial) success.

use std::fmt::Display;

use serde::Serialize;

/// A failure confined to one student, class or activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemError {
  pub item:    String,
  pub message: String,
}

impl ItemError {
  pub fn new(item: impl Into<String>, message: impl Display) -> Self {
    Self { item: item.into(), message: message.to_string() }
  }
}

/// Implemented by each phase's report.
pub trait Report: Serialize {
  /// One-line human readable outcome.
  fn summary(&self) -> String;

  fn errors(&self) -> &[ItemError];
}

/// Accumulates item errors, logging each one as it is recorded.
#[derive(Debug, Default)]
pub(crate) struct ErrorLog {
  errors: Vec<ItemError>,
}

impl ErrorLog {
  pub fn record(&mut self, item: impl Into<String>, message: impl Display) {
    let error = ItemError::new(item, message);
    tracing::warn!(item = %error.item, message = %error.message, "item failed");
    self.errors.push(error);
  }

  pub fn into_inner(self) -> Vec<ItemError> { self.errors }
}
