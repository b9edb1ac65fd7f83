//! In-process fakes shared by the collector tests.

use std::{
  collections::{HashMap, HashSet},
  sync::Mutex,
  time::Duration,
};

use chrono::NaiveDate;
use serde_json::Value;
use tally_core::{chain::ChainRequest, directory::Directory, store::IngestStore};
use tally_store_sqlite::SqliteStore;
use tally_upstream::{
  Error as UpstreamError, TutoringApi,
  types::{ActivityItem, UpstreamHomework, UpstreamProblem, UpstreamStudent},
};
use tokio::time::{Instant, sleep};

use crate::{ContinuationDispatcher, Error, Result};

pub async fn store_with(directory: Directory) -> SqliteStore {
  let store = SqliteStore::open_in_memory().await.unwrap();
  store.import_directory(directory).await.unwrap();
  store
}

// ─── Upstream ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Call {
  pub key:  String,
  pub date: Option<NaiveDate>,
  pub at:   Instant,
  pub done: Instant,
}

/// Scripted upstream. Unscripted lookups return an empty list.
#[derive(Default)]
pub struct FakeApi {
  reject_login: bool,
  latency:      Duration,
  failing:      HashSet<String>,
  students:     Vec<UpstreamStudent>,
  activities:   HashMap<String, Vec<ActivityItem>>,
  homework:     HashMap<String, Vec<UpstreamHomework>>,
  problems:     HashMap<String, Vec<UpstreamProblem>>,
  calls:        Mutex<Vec<Call>>,
}

impl FakeApi {
  pub fn reject_login(mut self) -> Self {
    self.reject_login = true;
    self
  }

  /// Make every call take `latency` to answer.
  pub fn with_latency(mut self, latency: Duration) -> Self {
    self.latency = latency;
    self
  }

  /// Make the call with this key fail with a 503.
  pub fn failing(mut self, key: impl Into<String>) -> Self {
    self.failing.insert(key.into());
    self
  }

  pub fn with_student(mut self, id: &str, name: &str) -> Self {
    self.students.push(UpstreamStudent { student_id: id.into(), name: name.into() });
    self
  }

  pub fn with_activities(mut self, student_id: &str, items: Value) -> Self {
    self
      .activities
      .insert(student_id.into(), serde_json::from_value(items).unwrap());
    self
  }

  pub fn with_homework(mut self, class_id: &str, items: Value) -> Self {
    self
      .homework
      .insert(class_id.into(), serde_json::from_value(items).unwrap());
    self
  }

  pub fn with_workbook(mut self, student_id: &str, progress_id: &str, problems: Value) -> Self {
    self.problems.insert(
      format!("workbook:{student_id}:{progress_id}"),
      serde_json::from_value(problems).unwrap(),
    );
    self
  }

  pub fn with_worksheet(mut self, student_id: &str, book_id: &str, problems: Value) -> Self {
    self.problems.insert(
      format!("worksheet:{student_id}:{book_id}"),
      serde_json::from_value(problems).unwrap(),
    );
    self
  }

  pub fn calls(&self) -> Vec<Call> { self.calls.lock().unwrap().clone() }

  pub fn call_keys(&self) -> Vec<String> {
    self.calls().into_iter().map(|c| c.key).collect()
  }

  pub fn call_count(&self, key: &str) -> usize {
    self.calls().iter().filter(|c| c.key == key).count()
  }

  async fn record(&self, key: String, date: Option<NaiveDate>) -> Result<(), UpstreamError> {
    let at = Instant::now();
    if !self.latency.is_zero() {
      sleep(self.latency).await;
    }
    let fail = self.failing.contains(&key);
    self.calls.lock().unwrap().push(Call { key, date, at, done: Instant::now() });
    if fail {
      return Err(UpstreamError::Upstream { status: 503, body: "busy".into() });
    }
    Ok(())
  }
}

impl TutoringApi for FakeApi {
  async fn authenticate(&self) -> Result<(), UpstreamError> {
    if self.reject_login {
      return Err(UpstreamError::Auth("login rejected".into()));
    }
    Ok(())
  }

  async fn list_students(&self) -> Result<Vec<UpstreamStudent>, UpstreamError> {
    self.record("students".into(), None).await?;
    Ok(self.students.clone())
  }

  async fn student_activities(
    &self,
    student_id: &str,
    date: NaiveDate,
  ) -> Result<Vec<ActivityItem>, UpstreamError> {
    self.record(format!("activities:{student_id}"), Some(date)).await?;
    Ok(self.activities.get(student_id).cloned().unwrap_or_default())
  }

  async fn class_homework(
    &self,
    class_id: &str,
    date: NaiveDate,
  ) -> Result<Vec<UpstreamHomework>, UpstreamError> {
    self.record(format!("homework:{class_id}"), Some(date)).await?;
    Ok(self.homework.get(class_id).cloned().unwrap_or_default())
  }

  async fn workbook_problems(
    &self,
    student_id: &str,
    progress_id: &str,
  ) -> Result<Vec<UpstreamProblem>, UpstreamError> {
    let key = format!("workbook:{student_id}:{progress_id}");
    self.record(key.clone(), None).await?;
    Ok(self.problems.get(&key).cloned().unwrap_or_default())
  }

  async fn worksheet_problems(
    &self,
    student_id: &str,
    book_id: &str,
  ) -> Result<Vec<UpstreamProblem>, UpstreamError> {
    let key = format!("worksheet:{student_id}:{book_id}");
    self.record(key.clone(), None).await?;
    Ok(self.problems.get(&key).cloned().unwrap_or_default())
  }
}

// ─── Continuation ────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingDispatcher {
  fail:     bool,
  sent:     Mutex<Vec<ChainRequest>>,
}

impl RecordingDispatcher {
  /// A dispatcher whose every hand-off fails.
  pub fn failing() -> Self { Self { fail: true, ..Default::default() } }

  pub fn sent(&self) -> Vec<ChainRequest> { self.sent.lock().unwrap().clone() }
}

impl ContinuationDispatcher for RecordingDispatcher {
  async fn dispatch(&self, request: ChainRequest) -> Result<()> {
    if self.fail {
      return Err(Error::Dispatch("trigger timed out".into()));
    }
    self.sent.lock().unwrap().push(request);
    Ok(())
  }
}
