//! Continuation of the wrong-detail pass.
//!
//! When an invocation runs out of budget with work remaining it hands a
//! [`ChainRequest`] for the next depth to a [`ContinuationDispatcher`] and
//! returns without waiting for the next hop to run.

use std::{future::Future, sync::Arc};

use tally_core::{
  chain::{ChainRequest, JobStatus},
  store::IngestStore,
};

use crate::{Error, Result};

/// Hands a continuation off for later execution.
pub trait ContinuationDispatcher: Send + Sync {
  fn dispatch(
    &self,
    request: ChainRequest,
  ) -> impl Future<Output = Result<()>> + Send + '_;
}

/// What an invocation should do about the work it left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainDecision {
  /// Nothing left.
  Done,
  Continue(ChainRequest),
  /// Work remains but the chain is already at its maximum depth.
  DepthLimit { max_depth: u32 },
}

pub fn decide(request: ChainRequest, remaining: usize, max_depth: u32) -> ChainDecision {
  if remaining == 0 {
    ChainDecision::Done
  } else if request.chain_depth < max_depth {
    ChainDecision::Continue(request.next())
  } else {
    ChainDecision::DepthLimit { max_depth }
  }
}

// ─── Durable queue ───────────────────────────────────────────────────────────

/// Persists continuations as chain jobs for the in-process worker.
pub struct QueueDispatcher<S> {
  store: Arc<S>,
}

impl<S> QueueDispatcher<S> {
  pub fn new(store: Arc<S>) -> Self { Self { store } }
}

impl<S: IngestStore> ContinuationDispatcher for QueueDispatcher<S> {
  async fn dispatch(&self, request: ChainRequest) -> Result<()> {
    let created = self
      .store
      .enqueue_chain_job(request)
      .await
      .map_err(Error::store)?;
    if created {
      tracing::info!(
        target_date = %request.target_date,
        depth = request.chain_depth,
        "continuation queued"
      );
      return Ok(());
    }

    // Not created: only fine if the existing job is still going to run.
    let existing = self
      .store
      .get_chain_job(request)
      .await
      .map_err(Error::store)?;
    match existing.map(|job| job.status) {
      Some(JobStatus::Pending | JobStatus::Running) => {
        tracing::debug!(
          target_date = %request.target_date,
          depth = request.chain_depth,
          "continuation already queued"
        );
        Ok(())
      }
      status => Err(Error::Dispatch(format!(
        "no runnable continuation for {} at depth {} (job status {status:?})",
        request.target_date, request.chain_depth
      ))),
    }
  }
}
