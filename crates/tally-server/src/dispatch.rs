//! Continuation hand-off, selected by `chain.mode`.

use std::{sync::Arc, time::Duration};

use reqwest::Client;
use tally_collect::{ContinuationDispatcher, Error, QueueDispatcher, Result};
use tally_core::{chain::ChainRequest, store::IngestStore};

use crate::settings::{ChainMode, ServerConfig};

pub enum Dispatcher<S> {
  Queue(QueueDispatcher<S>),
  Http(HttpDispatcher),
}

impl<S> Dispatcher<S> {
  pub fn from_config(config: &ServerConfig, store: Arc<S>, http: Client) -> Self {
    match config.chain.mode {
      ChainMode::Queue => Self::Queue(QueueDispatcher::new(store)),
      ChainMode::Http => Self::Http(HttpDispatcher {
        http,
        endpoint: format!("{}/collect/wrong-detail", config.public_url()),
        secret: config.auth.cron_secret.clone(),
        timeout: config.chain.trigger_timeout(),
      }),
    }
  }
}

impl<S: IngestStore> ContinuationDispatcher for Dispatcher<S> {
  async fn dispatch(&self, request: ChainRequest) -> Result<()> {
    match self {
      Self::Queue(queue) => queue.dispatch(request).await,
      Self::Http(http) => http.dispatch(request).await,
    }
  }
}

/// Fire-and-forget POST to this server's own wrong-detail endpoint.
///
/// The request runs on a detached task; the dispatcher waits only
/// `timeout` for an answer. No answer in time means the next hop is running.
pub struct HttpDispatcher {
  http:     Client,
  endpoint: String,
  secret:   String,
  timeout:  Duration,
}

impl ContinuationDispatcher for HttpDispatcher {
  async fn dispatch(&self, request: ChainRequest) -> Result<()> {
    let send = self
      .http
      .post(&self.endpoint)
      .bearer_auth(&self.secret)
      .json(&request)
      .send();
    let pending = tokio::spawn(send);

    match tokio::time::timeout(self.timeout, pending).await {
      Err(_) => {
        tracing::info!(
          target_date = %request.target_date,
          depth = request.chain_depth,
          "continuation triggered"
        );
        Ok(())
      }
      Ok(Ok(Ok(resp))) if resp.status().is_success() => Ok(()),
      Ok(Ok(Ok(resp))) => {
        Err(Error::Dispatch(format!("continuation rejected with {}", resp.status())))
      }
      Ok(Ok(Err(e))) => Err(Error::Dispatch(e.to_string())),
      Ok(Err(e)) => Err(Error::Dispatch(e.to_string())),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::NaiveDate;
  use serde_json::json;
  use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, header, method, path},
  };

  fn dispatcher(server: &MockServer, timeout_ms: u64) -> HttpDispatcher {
    HttpDispatcher {
      http:     Client::new(),
      endpoint: format!("{}/collect/wrong-detail", server.uri()),
      secret:   "s3cret".into(),
      timeout:  Duration::from_millis(timeout_ms),
    }
  }

  fn next() -> ChainRequest {
    ChainRequest::root(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()).next()
  }

  #[tokio::test]
  async fn slow_target_counts_as_dispatched() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/collect/wrong-detail"))
      .and(header("authorization", "Bearer s3cret"))
      .and(body_json(json!({ "targetDate": "2024-03-04", "chainDepth": 1 })))
      .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
      .expect(1)
      .mount(&server)
      .await;

    dispatcher(&server, 100).dispatch(next()).await.unwrap();
  }

  #[tokio::test]
  async fn rejection_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .respond_with(ResponseTemplate::new(401))
      .mount(&server)
      .await;

    let err = dispatcher(&server, 1_000).dispatch(next()).await.unwrap_err();
    assert!(matches!(err, Error::Dispatch(_)));
  }
}
