//! Upstream auth session.
//!
//! The login exchange returns a bearer token but no expiry, so a token is
//! assumed valid for a fixed conservative lifetime and refreshed after that.
//! A [`Session`] is process-local: construct one and share it (behind an
//! `Arc`) with everything that talks to the upstream.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::{sync::Mutex, time::Instant};

use crate::{Error, Result, UpstreamConfig};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginBody<'a> {
  login_id: &'a str,
  password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
  #[serde(alias = "accessToken")]
  token: Option<String>,
  #[serde(default)]
  data:  Option<Box<LoginResponse>>,
}

impl LoginResponse {
  fn into_token(self) -> Option<String> {
    self.token.or_else(|| self.data.and_then(|d| d.into_token()))
  }
}

struct CachedToken {
  token:      String,
  expires_at: Instant,
}

impl CachedToken {
  fn is_fresh(&self, now: Instant) -> bool { now < self.expires_at }
}

/// Acquires and caches the upstream bearer token.
pub struct Session {
  http:      Client,
  login_url: String,
  login_id:  Option<String>,
  password:  Option<String>,
  lifetime:  Duration,
  cached:    Mutex<Option<CachedToken>>,
}

impl Session {
  pub fn new(http: Client, config: &UpstreamConfig) -> Self {
    Self {
      http,
      login_url: config.url("/auth/login"),
      login_id: config.login_id.clone(),
      password: config.password.clone(),
      lifetime: config.token_lifetime(),
      cached: Mutex::new(None),
    }
  }

  /// Return the cached token, logging in first if there is none or its
  /// assumed lifetime has elapsed.
  pub async fn ensure_token(&self) -> Result<String> {
    let mut cached = self.cached.lock().await;

    if let Some(entry) = cached.as_ref()
      && entry.is_fresh(Instant::now())
    {
      return Ok(entry.token.clone());
    }

    let token = self.login().await?;
    *cached = Some(CachedToken {
      token:      token.clone(),
      expires_at: Instant::now() + self.lifetime,
    });
    Ok(token)
  }

  /// Drop the cached token so the next call logs in again.
  pub async fn invalidate(&self) { *self.cached.lock().await = None; }

  async fn login(&self) -> Result<String> {
    let (Some(login_id), Some(password)) = (
      self.login_id.as_deref().filter(|s| !s.is_empty()),
      self.password.as_deref().filter(|s| !s.is_empty()),
    ) else {
      return Err(Error::Auth("upstream credentials are not configured".into()));
    };

    tracing::info!("logging in to upstream");
    let resp = self
      .http
      .post(&self.login_url)
      .json(&LoginBody { login_id, password })
      .send()
      .await
      .map_err(|e| Error::Auth(format!("login request failed: {e}")))?;

    let status = resp.status();
    if !status.is_success() {
      let body = resp.text().await.unwrap_or_default();
      return Err(Error::Auth(format!("login rejected with {status}: {body}")));
    }

    let parsed: LoginResponse = resp
      .json()
      .await
      .map_err(|e| Error::Auth(format!("unreadable login response: {e}")))?;

    parsed
      .into_token()
      .filter(|t| !t.is_empty())
      .ok_or_else(|| Error::Auth("login response carried no token".into()))
  }
}
