//! HTTP surface of the Tally ingestion pipeline.
//!
//! Exposes an axum [`Router`] with one endpoint per collection phase, backed
//! by any [`IngestStore`], plus the continuation queue worker.

pub mod auth;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod settings;
pub mod worker;

pub use error::ApiError;
pub use settings::ServerConfig;

use std::{sync::Arc, time::Duration};

use axum::{
  Router,
  routing::{get, post},
};
use tally_core::store::IngestStore;
use tally_upstream::UpstreamClient;
use tower_http::trace::TraceLayer;

use auth::AuthConfig;
use dispatch::Dispatcher;

const IDENTITY_TIMEOUT: Duration = Duration::from_secs(10);

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers and the queue worker.
#[derive(Clone)]
pub struct AppState<S> {
  pub store:      Arc<S>,
  /// Shares one upstream session across requests and chain hops.
  pub api:        UpstreamClient,
  pub config:     Arc<ServerConfig>,
  pub auth:       Arc<AuthConfig>,
  pub dispatcher: Arc<Dispatcher<S>>,
}

impl<S> AppState<S>
where
  S: IngestStore + Clone + 'static,
{
  pub fn new(store: S, config: ServerConfig) -> Result<Self, tally_upstream::Error> {
    let store = Arc::new(store);
    let api = UpstreamClient::new(config.upstream.clone())?;
    let identity = reqwest::Client::builder().timeout(IDENTITY_TIMEOUT).build()?;
    let auth = AuthConfig::new(&config.auth, identity);
    let dispatcher = Dispatcher::from_config(&config, store.clone(), reqwest::Client::new());
    Ok(Self {
      store,
      api,
      config: Arc::new(config),
      auth: Arc::new(auth),
      dispatcher: Arc::new(dispatcher),
    })
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

pub fn router<S>(state: AppState<S>) -> Router
where
  S: IngestStore + Clone + 'static,
{
  Router::new()
    .route("/health",                 get(handlers::health))
    .route("/collect/daily-activity", post(handlers::daily_activity::handler::<S>))
    .route("/collect/homework",       post(handlers::homework::handler::<S>))
    .route("/collect/wrong-detail",   post(handlers::wrong_detail::handler::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

// ─── Integration tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use chrono::NaiveDate;
  use serde_json::{Value, json};
  use tally_collect::CollectSettings;
  use tally_core::{
    chain::{ChainRequest, JobStatus},
    directory::{Directory, Student},
  };
  use tally_store_sqlite::SqliteStore;
  use tally_upstream::UpstreamConfig;
  use tower::ServiceExt as _;
  use uuid::Uuid;
  use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
  };

  use crate::settings::{AuthSettings, ChainSettings, ListenSettings};

  const SECRET: &str = "s3cret";

  fn config(upstream: &MockServer) -> ServerConfig {
    ServerConfig {
      server:     ListenSettings::default(),
      store_path: ":memory:".into(),
      auth:       AuthSettings { cron_secret: SECRET.into(), identity_url: None },
      upstream:   UpstreamConfig {
        base_url:             upstream.uri(),
        login_id:             Some("teacher".into()),
        password:             Some("pw".into()),
        platform_id:          "web".into(),
        token_lifetime_secs:  3600,
        request_timeout_secs: 5,
      },
      collect:    CollectSettings {
        activity_delay_ms: 0,
        homework_delay_ms: 0,
        detail_delay_ms: 0,
        ..Default::default()
      },
      chain:      ChainSettings::default(),
    }
  }

  async fn login_ok(upstream: &MockServer) {
    Mock::given(method("POST"))
      .and(path("/auth/login"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "tok" })))
      .mount(upstream)
      .await;
  }

  async fn make_state(config: ServerConfig) -> AppState<SqliteStore> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    AppState::new(store, config).unwrap()
  }

  async fn post(
    state: AppState<SqliteStore>,
    uri: &str,
    token: Option<&str>,
    body: &str,
  ) -> (StatusCode, Value) {
    let mut builder = Request::builder()
      .method("POST")
      .uri(uri)
      .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
      builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let req = builder.body(Body::from(body.to_string())).unwrap();
    let resp = router(state).oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
  }

  fn day() -> NaiveDate { NaiveDate::from_ymd_opt(2024, 3, 4).unwrap() }

  // ── Surface ──────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn health_needs_no_token() {
    let upstream = MockServer::start().await;
    let state = make_state(config(&upstream)).await;
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let resp = router(state).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
  }

  #[tokio::test]
  async fn missing_or_wrong_token_is_401() {
    let upstream = MockServer::start().await;
    let state = make_state(config(&upstream)).await;

    let (status, body) = post(state.clone(), "/collect/wrong-detail", None, "{}").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert!(body["data"].is_null());

    let (status, _) = post(state, "/collect/wrong-detail", Some("guess"), "{}").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn malformed_body_is_400() {
    let upstream = MockServer::start().await;
    let state = make_state(config(&upstream)).await;
    let (status, body) =
      post(state, "/collect/daily-activity", Some(SECRET), r#"{"targetDate":"04/03/2024"}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
  }

  #[tokio::test]
  async fn manual_homework_without_classes_is_400() {
    let upstream = MockServer::start().await;
    let state = make_state(config(&upstream)).await;
    let (status, _) =
      post(state, "/collect/homework", Some(SECRET), r#"{"collectionType":"manual"}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn rejected_upstream_login_is_500() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/auth/login"))
      .respond_with(ResponseTemplate::new(403))
      .mount(&upstream)
      .await;
    let state = make_state(config(&upstream)).await;

    let (status, body) = post(state, "/collect/wrong-detail", Some(SECRET), "").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
  }

  // ── Phases ───────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn wrong_detail_on_an_empty_day_completes() {
    let upstream = MockServer::start().await;
    login_ok(&upstream).await;
    let state = make_state(config(&upstream)).await;

    let (status, body) = post(
      state,
      "/collect/wrong-detail",
      Some(SECRET),
      r#"{"targetDate":"2024-03-04","chainDepth":2}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["chainDepth"], 2);
    assert_eq!(body["data"]["remaining"], 0);
    assert_eq!(body["data"]["termination"]["status"], "complete");
    assert!(body.get("errors").is_none());
  }

  #[tokio::test]
  async fn item_failures_are_a_partial_success() {
    let upstream = MockServer::start().await;
    login_ok(&upstream).await;
    Mock::given(method("GET"))
      .and(path("/students/u-1/activities"))
      .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
      .mount(&upstream)
      .await;
    let state = make_state(config(&upstream)).await;
    state
      .store
      .import_directory(Directory {
        students: vec![Student {
          student_id:  Uuid::new_v4(),
          name:        "Ada".into(),
          class_id:    None,
          upstream_id: Some("u-1".into()),
          active:      true,
        }],
        ..Default::default()
      })
      .await
      .unwrap();

    let (status, body) = post(
      state,
      "/collect/daily-activity",
      Some(SECRET),
      r#"{"targetDate":"2024-03-04"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["studentsCollected"], 0);
    assert_eq!(body["errors"][0]["item"], "Ada");
  }

  // ── Queue worker ─────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn worker_runs_due_jobs_once() {
    let upstream = MockServer::start().await;
    login_ok(&upstream).await;
    let state = make_state(config(&upstream)).await;
    let request = ChainRequest::root(day()).next();
    state.store.enqueue_chain_job(request).await.unwrap();

    assert!(worker::run_once(&state).await.unwrap());
    assert!(!worker::run_once(&state).await.unwrap());

    let job = state.store.get_chain_job(request).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.attempts, 1);
  }

  #[tokio::test]
  async fn failing_job_is_retried_later_then_given_up() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/auth/login"))
      .respond_with(ResponseTemplate::new(403))
      .mount(&upstream)
      .await;
    let mut cfg = config(&upstream);
    cfg.chain.max_attempts = 2;
    let state = make_state(cfg).await;
    let request = ChainRequest::root(day()).next();
    state.store.enqueue_chain_job(request).await.unwrap();

    assert!(worker::run_once(&state).await.unwrap());
    let job = state.store.get_chain_job(request).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert!(job.last_error.is_some());
    // Not due until the retry delay has passed.
    assert!(!worker::run_once(&state).await.unwrap());

    let mut cfg = config(&upstream);
    cfg.chain.max_attempts = 1;
    let strict = make_state(cfg).await;
    let request = ChainRequest::root(day());
    strict.store.enqueue_chain_job(request).await.unwrap();
    assert!(worker::run_once(&strict).await.unwrap());
    let job = strict.store.get_chain_job(request).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
  }
}
