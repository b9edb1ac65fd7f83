//! Upstream connection settings.

use std::time::Duration;

use serde::Deserialize;

/// The `[upstream]` configuration section.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
  pub base_url:             String,
  #[serde(default)]
  pub login_id:             Option<String>,
  #[serde(default)]
  pub password:             Option<String>,
  /// Sent as `X-Platform-Id` on every authenticated call.
  pub platform_id:          String,
  /// Assumed token lifetime; the upstream never reports one.
  #[serde(default = "default_token_lifetime_secs")]
  pub token_lifetime_secs:  u64,
  #[serde(default = "default_request_timeout_secs")]
  pub request_timeout_secs: u64,
}

fn default_token_lifetime_secs() -> u64 { 3600 }

fn default_request_timeout_secs() -> u64 { 30 }

impl UpstreamConfig {
  pub fn token_lifetime(&self) -> Duration {
    Duration::from_secs(self.token_lifetime_secs)
  }

  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.request_timeout_secs)
  }

  pub(crate) fn url(&self, path: &str) -> String {
    format!("{}{}", self.base_url.trim_end_matches('/'), path)
  }
}
