//! Bearer-token extractor for the collection endpoints.
//!
//! A token equal to the configured static secret authorises scheduled and
//! chained calls. Any other token is checked against the owning system's
//! identity endpoint; a 2xx answer authorises the request.

use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use reqwest::Client;
use sha2::{Digest, Sha256};
use tally_core::store::IngestStore;

use crate::{AppState, error::ApiError, settings::AuthSettings};

/// Who made an authorised request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
  /// The scheduler or a continuation, via the static secret.
  Scheduler,
  /// A user vouched for by the identity endpoint.
  User,
}

pub struct AuthConfig {
  /// SHA-256 of the static secret; `None` when no secret is configured.
  secret_digest: Option<[u8; 32]>,
  identity_url:  Option<String>,
  http:          Client,
}

fn digest(token: &str) -> [u8; 32] { Sha256::digest(token.as_bytes()).into() }

impl AuthConfig {
  pub fn new(settings: &AuthSettings, http: Client) -> Self {
    let secret = settings.cron_secret.trim();
    Self {
      secret_digest: (!secret.is_empty()).then(|| digest(secret)),
      identity_url: settings.identity_url.clone().filter(|u| !u.trim().is_empty()),
      http,
    }
  }

  pub fn is_static_secret(&self, token: &str) -> bool {
    self.secret_digest.is_some_and(|expected| digest(token) == expected)
  }

  /// Authorise a request from its headers.
  pub async fn verify(&self, headers: &HeaderMap) -> Result<Caller, ApiError> {
    let token = headers
      .get(AUTHORIZATION)
      .and_then(|v| v.to_str().ok())
      .and_then(|v| v.strip_prefix("Bearer "))
      .map(str::trim)
      .filter(|t| !t.is_empty())
      .ok_or(ApiError::Unauthorized)?;

    if self.is_static_secret(token) {
      return Ok(Caller::Scheduler);
    }

    let Some(url) = &self.identity_url else {
      return Err(ApiError::Unauthorized);
    };
    match self.http.get(url).bearer_auth(token).send().await {
      Ok(resp) if resp.status().is_success() => Ok(Caller::User),
      Ok(resp) => {
        tracing::debug!(status = %resp.status(), "identity endpoint rejected token");
        Err(ApiError::Unauthorized)
      }
      Err(e) => {
        tracing::warn!(error = %e, "identity endpoint unreachable");
        Err(ApiError::Unauthorized)
      }
    }
  }
}

/// Present in a handler's arguments means the request was authorised.
pub struct Authenticated(pub Caller);

impl<S> FromRequestParts<AppState<S>> for Authenticated
where
  S: IngestStore + Clone + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let caller = state.auth.verify(&parts.headers).await?;
    Ok(Authenticated(caller))
  }
}
