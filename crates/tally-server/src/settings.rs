//! Runtime configuration, deserialised from `config.toml` layered with
//! `TALLY__`-prefixed environment variables.

use std::{path::PathBuf, time::Duration};

use serde::Deserialize;
use tally_collect::CollectSettings;
use tally_upstream::UpstreamConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default)]
  pub server:     ListenSettings,
  #[serde(default = "default_store_path")]
  pub store_path: PathBuf,
  pub auth:       AuthSettings,
  pub upstream:   UpstreamConfig,
  #[serde(default)]
  pub collect:    CollectSettings,
  #[serde(default)]
  pub chain:      ChainSettings,
}

fn default_store_path() -> PathBuf { PathBuf::from("tally.db") }

impl ServerConfig {
  /// Base URL this server is reachable at, for self-addressed continuation
  /// triggers.
  pub fn public_url(&self) -> String {
    match &self.server.public_url {
      Some(url) => url.trim_end_matches('/').to_owned(),
      None => format!("http://{}:{}", self.server.host, self.server.port),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListenSettings {
  pub host:       String,
  pub port:       u16,
  pub public_url: Option<String>,
}

impl Default for ListenSettings {
  fn default() -> Self {
    Self { host: "127.0.0.1".into(), port: 8080, public_url: None }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
  /// Static bearer secret used by the scheduler and by continuations.
  pub cron_secret:  String,
  /// Identity endpoint consulted for any other bearer token. Without one,
  /// only the static secret is accepted.
  #[serde(default)]
  pub identity_url: Option<String>,
}

/// How a wrong-detail continuation is handed off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainMode {
  /// Persist a chain job for the in-process worker.
  #[default]
  Queue,
  /// POST to this server's own wrong-detail endpoint without waiting.
  Http,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChainSettings {
  pub mode:               ChainMode,
  pub trigger_timeout_ms: u64,
  pub poll_interval_secs: u64,
  pub retry_delay_secs:   u64,
  pub max_attempts:       u32,
}

impl Default for ChainSettings {
  fn default() -> Self {
    Self {
      mode:               ChainMode::Queue,
      trigger_timeout_ms: 1_500,
      poll_interval_secs: 5,
      retry_delay_secs:   60,
      max_attempts:       3,
    }
  }
}

impl ChainSettings {
  pub fn trigger_timeout(&self) -> Duration { Duration::from_millis(self.trigger_timeout_ms) }

  pub fn poll_interval(&self) -> Duration { Duration::from_secs(self.poll_interval_secs.max(1)) }

  pub fn retry_delay(&self) -> chrono::Duration {
    let secs = u32::try_from(self.retry_delay_secs).unwrap_or(u32::MAX);
    chrono::Duration::seconds(i64::from(secs))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn minimal_config_fills_defaults() {
    let cfg: ServerConfig = serde_json::from_value(serde_json::json!({
      "auth": { "cron_secret": "s3cret" },
      "upstream": { "base_url": "https://up.example", "platform_id": "web" },
      "chain": { "mode": "http" }
    }))
    .unwrap();
    assert_eq!(cfg.public_url(), "http://127.0.0.1:8080");
    assert_eq!(cfg.chain.mode, ChainMode::Http);
    assert_eq!(cfg.chain.max_attempts, 3);
    assert_eq!(cfg.collect.detail_delay_ms, 200);
    assert_eq!(cfg.upstream.token_lifetime_secs, 3600);
  }
}
