//! In-process consumer of the continuation queue.
//!
//! Polls for due chain jobs and runs the wrong-detail pass for each, one at
//! a time. A failed run is retried after `chain.retry_delay_secs` until
//! `chain.max_attempts` is reached, after which the job is marked failed.

use chrono::Utc;
use tally_collect::{Error, Result, wrong_detail::collect_wrong_detail};
use tally_core::store::IngestStore;
use tokio::time::{MissedTickBehavior, interval};

use crate::AppState;

/// Run forever. Jobs a previous process left `running` are re-queued first.
pub async fn run<S>(state: AppState<S>)
where
  S: IngestStore + Clone + 'static,
{
  match state.store.requeue_running_jobs().await {
    Ok(0) => {}
    Ok(n) => tracing::info!(jobs = n, "re-queued interrupted chain jobs"),
    Err(e) => tracing::error!(error = %e, "failed to re-queue interrupted chain jobs"),
  }

  let mut ticker = interval(state.config.chain.poll_interval());
  ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
  loop {
    ticker.tick().await;
    loop {
      match run_once(&state).await {
        Ok(true) => continue,
        Ok(false) => break,
        Err(e) => {
          tracing::error!(error = %e, "chain worker poll failed");
          break;
        }
      }
    }
  }
}

/// Claim and run one due job. Returns `false` when none was due.
pub async fn run_once<S>(state: &AppState<S>) -> Result<bool>
where
  S: IngestStore + Clone + 'static,
{
  let Some(job) = state
    .store
    .claim_chain_job(Utc::now())
    .await
    .map_err(Error::store)?
  else {
    return Ok(false);
  };
  tracing::info!(
    job_id = %job.job_id,
    target_date = %job.request.target_date,
    depth = job.request.chain_depth,
    attempt = job.attempts,
    "running chain job"
  );

  let outcome = collect_wrong_detail(
    &*state.store,
    &state.api,
    &*state.dispatcher,
    &state.config.collect,
    job.request,
  )
  .await;

  match outcome {
    Ok(_) => {
      state.store.complete_chain_job(job.job_id).await.map_err(Error::store)?;
    }
    Err(e) => {
      let chain = &state.config.chain;
      let retry_at = (job.attempts < chain.max_attempts).then(|| Utc::now() + chain.retry_delay());
      tracing::warn!(job_id = %job.job_id, error = %e, retry = retry_at.is_some(), "chain job failed");
      state
        .store
        .fail_chain_job(job.job_id, e.to_string(), retry_at)
        .await
        .map_err(Error::store)?;
    }
  }
  Ok(true)
}
