//! Authenticated JSON client for the upstream platform.

use std::sync::Arc;

use reqwest::{Client, Method, header::AUTHORIZATION};
use serde_json::Value;

use crate::{Error, Result, Session, UpstreamConfig};

/// Header carrying the fixed platform identifier.
pub const PLATFORM_HEADER: &str = "X-Platform-Id";

/// Per-call request options.
#[derive(Debug, Clone)]
pub struct CallOptions {
  pub method: Method,
  pub query:  Vec<(String, String)>,
  pub body:   Option<Value>,
}

impl CallOptions {
  pub fn get() -> Self {
    Self { method: Method::GET, query: Vec::new(), body: None }
  }

  pub fn post(body: Value) -> Self {
    Self { method: Method::POST, query: Vec::new(), body: Some(body) }
  }

  pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
    self.query.push((key.to_owned(), value.into()));
    self
  }
}

/// Async HTTP client for the upstream API.
///
/// Cheap to clone: the inner [`reqwest::Client`] and the [`Session`] are
/// shared.
#[derive(Clone)]
pub struct UpstreamClient {
  http:    Client,
  config:  Arc<UpstreamConfig>,
  session: Arc<Session>,
}

impl UpstreamClient {
  pub fn new(config: UpstreamConfig) -> Result<Self> {
    if config.base_url.trim().is_empty() {
      return Err(Error::MissingConfig("upstream.base_url"));
    }
    let http = Client::builder().timeout(config.request_timeout()).build()?;
    let session = Arc::new(Session::new(http.clone(), &config));
    Ok(Self { http, config: Arc::new(config), session })
  }

  pub fn session(&self) -> &Session { &self.session }

  /// Issue one authenticated call and parse the response body as JSON.
  ///
  /// An empty 2xx body parses as `null`. A 401 drops the cached token so the
  /// next call logs in again; the failing call itself is not retried.
  pub async fn call(&self, endpoint: &str, options: CallOptions) -> Result<Value> {
    let token = self.session.ensure_token().await?;
    let url = self.config.url(endpoint);

    tracing::debug!(method = %options.method, %url, "upstream call");
    let mut req = self
      .http
      .request(options.method, &url)
      .header(AUTHORIZATION, format!("Bearer {token}"))
      .header(PLATFORM_HEADER, &self.config.platform_id);
    if !options.query.is_empty() {
      req = req.query(&options.query);
    }
    if let Some(body) = &options.body {
      req = req.json(body);
    }

    let resp = req.send().await?;
    let status = resp.status();
    let text = resp.text().await?;

    if !status.is_success() {
      if status == reqwest::StatusCode::UNAUTHORIZED {
        self.session.invalidate().await;
      }
      return Err(Error::Upstream { status: status.as_u16(), body: text });
    }

    if text.trim().is_empty() {
      return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path, query_param},
  };

  async fn server_with_login() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/auth/login"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "tok" })))
      .mount(&server)
      .await;
    server
  }

  fn client(base_url: String) -> UpstreamClient {
    UpstreamClient::new(UpstreamConfig {
      base_url,
      login_id: Some("teacher".into()),
      password: Some("pw".into()),
      platform_id: "web-7".into(),
      token_lifetime_secs: 3600,
      request_timeout_secs: 5,
    })
    .unwrap()
  }

  #[tokio::test]
  async fn call_attaches_token_and_platform_header() {
    let server = server_with_login().await;
    Mock::given(method("GET"))
      .and(path("/students"))
      .and(header("authorization", "Bearer tok"))
      .and(header("x-platform-id", "web-7"))
      .and(query_param("page", "1"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 1 }])))
      .expect(1)
      .mount(&server)
      .await;

    let value = client(server.uri())
      .call("/students", CallOptions::get().query("page", "1"))
      .await
      .unwrap();
    assert_eq!(value, json!([{ "id": 1 }]));
  }

  #[tokio::test]
  async fn non_success_status_is_translated() {
    let server = server_with_login().await;
    Mock::given(method("GET"))
      .and(path("/students"))
      .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
      .mount(&server)
      .await;

    let err = client(server.uri())
      .call("/students", CallOptions::get())
      .await
      .unwrap_err();
    match err {
      Error::Upstream { status, body } => {
        assert_eq!(status, 503);
        assert_eq!(body, "busy");
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[tokio::test]
  async fn unauthorized_drops_cached_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/auth/login"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "tok" })))
      .expect(2)
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/students"))
      .respond_with(ResponseTemplate::new(401))
      .mount(&server)
      .await;

    let c = client(server.uri());
    assert!(c.call("/students", CallOptions::get()).await.is_err());
    assert!(c.call("/students", CallOptions::get()).await.is_err());
  }

  #[tokio::test]
  async fn empty_body_is_null() {
    let server = server_with_login().await;
    Mock::given(method("POST"))
      .and(path("/noop"))
      .respond_with(ResponseTemplate::new(204))
      .mount(&server)
      .await;

    let value = client(server.uri())
      .call("/noop", CallOptions::post(json!({})))
      .await
      .unwrap();
    assert!(value.is_null());
  }

  #[test]
  fn blank_base_url_is_missing_config() {
    let result = UpstreamClient::new(UpstreamConfig {
      base_url:             " ".into(),
      login_id:             None,
      password:             None,
      platform_id:          "web".into(),
      token_lifetime_secs:  3600,
      request_timeout_secs: 5,
    });
    assert!(matches!(result, Err(Error::MissingConfig(_))));
  }
}
