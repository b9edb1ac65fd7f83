//! The `IngestStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `tally-store-sqlite`).
//! The collectors and the server depend on this abstraction, not on any
//! concrete backend.
//!
//! Every write that must be idempotent is expressed as an atomic
//! conflict-aware operation, so two overlapping runs for the same date cannot
//! produce duplicate rows.

use std::{collections::HashSet, future::Future};

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use uuid::Uuid;

use crate::{
  activity::{DailyActivity, NewDailyActivity},
  chain::{ChainJob, ChainRequest},
  directory::{Class, Directory, Student},
  homework::{HomeworkAssignment, NewHomework, UpsertOutcome},
  problem::{NewProblemResult, ProblemResult},
};

/// Abstraction over a Tally store backend.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait IngestStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Reference directory ───────────────────────────────────────────────

  /// Replace-or-insert every entry of `directory`. Existing rows with the
  /// same ids are overwritten; a class's schedule is replaced wholesale.
  fn import_directory(
    &self,
    directory: Directory,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// All students flagged active, ordered by name.
  fn list_active_students(
    &self,
  ) -> impl Future<Output = Result<Vec<Student>, Self::Error>> + Send + '_;

  /// Students belonging to `class_id`, active or not.
  fn students_in_class(
    &self,
    class_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Student>, Self::Error>> + Send + '_;

  /// The classes with the given ids; unknown ids are silently skipped.
  fn get_classes(
    &self,
    ids: Vec<Uuid>,
  ) -> impl Future<Output = Result<Vec<Class>, Self::Error>> + Send + '_;

  /// Classes scheduled to meet on `weekday`.
  fn classes_meeting_on(
    &self,
    weekday: Weekday,
  ) -> impl Future<Output = Result<Vec<Class>, Self::Error>> + Send + '_;

  /// The internal name→upstream-id table, keyed by
  /// [`name_key`](crate::directory::name_key).
  fn upstream_id_for_name(
    &self,
    name: String,
  ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + '_;

  // ── Daily activity ────────────────────────────────────────────────────

  /// Upsert keyed by (student, date, book id). Existing rows have their
  /// metadata and counts refreshed. Returns the number of rows written.
  fn upsert_daily_activities(
    &self,
    rows: Vec<NewDailyActivity>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Every activity recorded for `date`.
  fn list_daily_activities(
    &self,
    date: NaiveDate,
  ) -> impl Future<Output = Result<Vec<DailyActivity>, Self::Error>> + Send + '_;

  /// Activities for `date` with `wrong_count > 0`, ascending by wrong count.
  fn wrong_candidates(
    &self,
    date: NaiveDate,
  ) -> impl Future<Output = Result<Vec<DailyActivity>, Self::Error>> + Send + '_;

  /// Of `activity_ids`, those that already have detail: at least one
  /// problem result, or a detail watermark.
  fn activities_with_detail(
    &self,
    activity_ids: Vec<Uuid>,
  ) -> impl Future<Output = Result<HashSet<Uuid>, Self::Error>> + Send + '_;

  /// Set the detail watermark of an activity.
  fn mark_detail_collected(
    &self,
    activity_id: Uuid,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Problem results ───────────────────────────────────────────────────

  /// Insert results, ignoring any whose (activity, problem id) already
  /// exists. Returns the number of rows actually inserted.
  fn insert_problem_results(
    &self,
    rows: Vec<NewProblemResult>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  fn list_problem_results(
    &self,
    activity_id: Uuid,
  ) -> impl Future<Output = Result<Vec<ProblemResult>, Self::Error>> + Send + '_;

  // ── Homework ──────────────────────────────────────────────────────────

  /// Upsert keyed by (class, student upstream id, date, homework id). An
  /// existing row only has completion, score, title, page range and
  /// progress ids refreshed.
  fn upsert_homework(
    &self,
    row: NewHomework,
  ) -> impl Future<Output = Result<UpsertOutcome, Self::Error>> + Send + '_;

  fn list_homework(
    &self,
    class_id: Uuid,
    date: NaiveDate,
  ) -> impl Future<Output = Result<Vec<HomeworkAssignment>, Self::Error>>
  + Send
  + '_;

  // ── Continuation queue ────────────────────────────────────────────────

  /// Enqueue a continuation. A finished (`done` or `failed`) job for the
  /// same (date, depth) is re-armed as a fresh pending job. Returns `false`
  /// only when a pending or running job already covers the request.
  fn enqueue_chain_job(
    &self,
    request: ChainRequest,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Atomically move the oldest pending job with `run_after <= now` to
  /// `running`, incrementing its attempt count.
  fn claim_chain_job(
    &self,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<ChainJob>, Self::Error>> + Send + '_;

  fn complete_chain_job(
    &self,
    job_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Record a failed attempt. With `retry_at` the job returns to `pending`;
  /// without it the job is marked `failed` for good.
  fn fail_chain_job(
    &self,
    job_id: Uuid,
    error: String,
    retry_at: Option<DateTime<Utc>>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Return jobs stuck in `running` (e.g. after a crash) to `pending`.
  /// Returns the number of jobs reset.
  fn requeue_running_jobs(
    &self,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  fn get_chain_job(
    &self,
    request: ChainRequest,
  ) -> impl Future<Output = Result<Option<ChainJob>, Self::Error>> + Send + '_;
}
