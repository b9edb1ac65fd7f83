//! Phase 3: wrong-answer detail.
//!
//! A time-boxed loop over the target date's activities with at least one
//! wrong answer, cheapest first. Each round selects a batch whose summed wrong
//! count stays under a soft cap, fetches the problem detail of every
//! candidate and keeps the wrong and unresolved problems.
//!
//! Progress is never carried between invocations: which activities still need
//! detail is re-derived from the store (stored results or the detail
//! watermark) on every round. When the budget runs out with work remaining,
//! the invocation dispatches a continuation one level deeper and returns.

use std::collections::HashSet;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tally_core::{
  activity::{ActivityKind, DailyActivity},
  chain::ChainRequest,
  date::CivilZone,
  problem::NewProblemResult,
  store::IngestStore,
};
use tally_upstream::{Pacer, TutoringApi};
use tokio::time::Instant;
use uuid::Uuid;

use crate::{
  CollectSettings, ContinuationDispatcher, Error, ItemError, Report, Result,
  chain::{ChainDecision, decide},
  normalize::wrong_results,
  report::ErrorLog,
};

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrongDetailRequest {
  #[serde(default)]
  pub target_date: Option<NaiveDate>,
  #[serde(default)]
  pub chain_depth: Option<u32>,
}

impl WrongDetailRequest {
  pub fn resolve(self, zone: &CivilZone) -> ChainRequest {
    ChainRequest {
      target_date: zone.resolve(self.target_date),
      chain_depth: self.chain_depth.unwrap_or(0),
    }
  }
}

/// How an invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Termination {
  /// No activity for the date still needs detail.
  Complete,
  /// Budget exhausted; a continuation was dispatched.
  Continued { next_depth: u32 },
  /// Budget exhausted at the maximum chain depth.
  DepthLimit { max_depth: u32 },
  /// Budget exhausted but the continuation could not be dispatched.
  Interrupted,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WrongDetailReport {
  pub target_date:          NaiveDate,
  pub chain_depth:          u32,
  pub batches:              u32,
  pub activities_processed: usize,
  pub results_inserted:     usize,
  pub remaining:            usize,
  pub termination:          Termination,
  #[serde(skip)]
  pub errors:               Vec<ItemError>,
}

impl Report for WrongDetailReport {
  fn summary(&self) -> String {
    let head = format!(
      "wrong-detail for {} at depth {}: {} activities, {} results in {} batches",
      self.target_date,
      self.chain_depth,
      self.activities_processed,
      self.results_inserted,
      self.batches
    );
    match self.termination {
      Termination::Complete => format!("{head}; complete"),
      Termination::Continued { next_depth } => {
        format!("{head}; {} remaining, continuing at depth {next_depth}", self.remaining)
      }
      Termination::DepthLimit { max_depth } => format!(
        "{head}; {} remaining, stopped at the maximum chain depth of {max_depth}",
        self.remaining
      ),
      Termination::Interrupted => format!(
        "{head}; {} remaining, continuation could not be dispatched",
        self.remaining
      ),
    }
  }

  fn errors(&self) -> &[ItemError] { &self.errors }
}

/// Number of leading candidates whose summed weight stays within `cap`.
/// Never less than one for a non-empty input.
pub fn batch_len(weights: impl IntoIterator<Item = u32>, cap: u32) -> usize {
  let mut sum: u64 = 0;
  let mut len = 0;
  for weight in weights {
    let next = sum + u64::from(weight);
    if len > 0 && next > u64::from(cap) {
      break;
    }
    sum = next;
    len += 1;
  }
  len
}

pub async fn collect_wrong_detail<S, A, D>(
  store: &S,
  api: &A,
  dispatcher: &D,
  settings: &CollectSettings,
  request: ChainRequest,
) -> Result<WrongDetailReport>
where
  S: IngestStore,
  A: TutoringApi,
  D: ContinuationDispatcher,
{
  let date = request.target_date;
  tracing::info!(%date, depth = request.chain_depth, "wrong-detail collection started");

  api.authenticate().await?;

  let budget = settings.time_budget();
  let started = Instant::now();
  let mut pacer = Pacer::from_millis(settings.detail_delay_ms);
  let mut processed: HashSet<Uuid> = HashSet::new();
  let mut log = ErrorLog::default();
  let mut batches = 0;
  let mut inserted = 0;
  let mut remaining;

  loop {
    let candidates = store.wrong_candidates(date).await.map_err(Error::store)?;
    let ids = candidates.iter().map(|a| a.activity_id).collect();
    let done = store.activities_with_detail(ids).await.map_err(Error::store)?;
    let mut pending: Vec<DailyActivity> = candidates
      .into_iter()
      .filter(|a| !done.contains(&a.activity_id) && !processed.contains(&a.activity_id))
      .collect();
    if pending.is_empty() {
      remaining = 0;
      break;
    }

    let len = batch_len(pending.iter().map(|a| a.wrong_count), settings.wrong_count_cap);
    let rest = pending.split_off(len);
    let batch = pending;
    remaining = rest.len();
    batches += 1;
    tracing::debug!(batch = batches, size = batch.len(), remaining, "batch selected");

    let mut fetched = Vec::with_capacity(batch.len());
    let mut exhausted = false;
    let mut fatal = None;
    for (i, activity) in batch.iter().enumerate() {
      if started.elapsed() >= budget {
        remaining += batch.len() - i;
        exhausted = true;
        break;
      }
      processed.insert(activity.activity_id);
      match fetch_detail(api, &mut pacer, activity).await {
        Ok(rows) => fetched.push((activity.activity_id, rows)),
        Err(e) if e.is_fatal() => {
          fatal = Some(e);
          break;
        }
        Err(e) => log.record(label(activity), e),
      }
    }

    inserted += persist(store, &mut log, fetched, settings.insert_chunk).await;
    if let Some(e) = fatal {
      return Err(e);
    }
    if exhausted || started.elapsed() >= budget {
      break;
    }
  }

  let termination = match decide(request, remaining, settings.max_chain_depth) {
    ChainDecision::Done => Termination::Complete,
    ChainDecision::Continue(next) => match dispatcher.dispatch(next).await {
      Ok(()) => Termination::Continued { next_depth: next.chain_depth },
      Err(e) => {
        log.record("continuation", e);
        Termination::Interrupted
      }
    },
    ChainDecision::DepthLimit { max_depth } => {
      tracing::warn!(%date, max_depth, remaining, "maximum chain depth reached");
      Termination::DepthLimit { max_depth }
    }
  };

  let report = WrongDetailReport {
    target_date: date,
    chain_depth: request.chain_depth,
    batches,
    activities_processed: processed.len(),
    results_inserted: inserted,
    remaining,
    termination,
    errors: log.into_inner(),
  };
  tracing::info!(
    %date,
    depth = request.chain_depth,
    batches,
    remaining,
    errors = report.errors.len(),
    "wrong-detail collection finished"
  );
  Ok(report)
}

fn label(activity: &DailyActivity) -> String {
  format!("{}/{}", activity.student_upstream_id, activity.book_id)
}

/// Fetch one activity's problems and keep the wrong and unresolved ones.
async fn fetch_detail<A: TutoringApi>(
  api: &A,
  pacer: &mut Pacer,
  activity: &DailyActivity,
) -> Result<Vec<NewProblemResult>> {
  let student = &activity.student_upstream_id;
  match activity.kind {
    ActivityKind::Workbook => {
      let mut rows = Vec::new();
      for progress_id in &activity.progress_ids {
        let problems = pacer.run(api.workbook_problems(student, progress_id)).await?;
        rows.extend(wrong_results(activity.activity_id, problems, Some(progress_id)));
      }
      Ok(rows)
    }
    ActivityKind::Worksheet => {
      let problems = pacer.run(api.worksheet_problems(student, &activity.book_id)).await?;
      Ok(wrong_results(activity.activity_id, problems, None))
    }
  }
}

/// Group fetched activities into insert batches of about `chunk` rows. An
/// activity's rows never straddle two batches, so a failed insert leaves that
/// activity with no rows at all and it is fetched again later.
fn insert_batches(
  fetched: Vec<(Uuid, Vec<NewProblemResult>)>,
  chunk: usize,
) -> Vec<(Vec<Uuid>, Vec<NewProblemResult>)> {
  let chunk = chunk.max(1);
  let mut batches: Vec<(Vec<Uuid>, Vec<NewProblemResult>)> = Vec::new();
  for (id, rows) in fetched {
    let fits = batches.last().is_some_and(|(_, batch)| batch.len() + rows.len() <= chunk);
    match batches.last_mut() {
      Some((ids, batch)) if fits => {
        ids.push(id);
        batch.extend(rows);
      }
      _ => batches.push((vec![id], rows)),
    }
  }
  batches
}

/// Write fetched results batch by batch, watermarking the activities of
/// every batch that landed. Failures are recorded, never raised.
async fn persist<S: IngestStore>(
  store: &S,
  log: &mut ErrorLog,
  fetched: Vec<(Uuid, Vec<NewProblemResult>)>,
  chunk: usize,
) -> usize {
  let now = Utc::now();
  let mut inserted = 0;
  for (ids, rows) in insert_batches(fetched, chunk) {
    if !rows.is_empty() {
      let len = rows.len();
      match store.insert_problem_results(rows).await {
        Ok(n) => inserted += n,
        Err(e) => {
          log.record(format!("{len} problem results"), e);
          continue;
        }
      }
    }
    for id in ids {
      if let Err(e) = store.mark_detail_collected(id, now).await {
        log.record(id.to_string(), e);
      }
    }
  }
  inserted
}
