//! Phase 1: daily activity.
//!
//! One pass over the active students. Each student's activity for the target
//! date is fetched, flattened and upserted. The pass does not chain: on a very
//! large population it can be cut short by the host's execution ceiling, and a
//! re-run simply refreshes what is already stored.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tally_core::store::IngestStore;
use tally_upstream::{Pacer, TutoringApi};
use uuid::Uuid;

use crate::{
  CollectSettings, Error, ItemError, Report, Result,
  normalize::{StudentRef, activity_rows},
  report::ErrorLog,
  resolver::Resolver,
};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyActivityRequest {
  #[serde(default)]
  pub target_date: Option<NaiveDate>,
  /// Restrict the pass to these local student ids.
  #[serde(default)]
  pub student_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyActivityReport {
  pub target_date:         NaiveDate,
  pub students_total:      usize,
  pub students_collected:  usize,
  pub activities_upserted: usize,
  #[serde(skip)]
  pub errors:              Vec<ItemError>,
}

impl Report for DailyActivityReport {
  fn summary(&self) -> String {
    format!(
      "collected {} activities for {}/{} students on {}",
      self.activities_upserted, self.students_collected, self.students_total, self.target_date
    )
  }

  fn errors(&self) -> &[ItemError] { &self.errors }
}

pub async fn collect_daily_activity<S, A>(
  store: &S,
  api: &A,
  settings: &CollectSettings,
  request: DailyActivityRequest,
) -> Result<DailyActivityReport>
where
  S: IngestStore,
  A: TutoringApi,
{
  let date = settings.zone()?.resolve(request.target_date);
  tracing::info!(%date, "daily-activity collection started");

  api.authenticate().await?;

  let mut students = store.list_active_students().await.map_err(Error::store)?;
  if let Some(allow) = &request.student_ids {
    students.retain(|s| allow.contains(&s.student_id));
  }

  let mut pacer = Pacer::from_millis(settings.activity_delay_ms);
  let mut resolver = Resolver::new(store, api);
  let mut log = ErrorLog::default();
  let mut collected = 0;
  let mut upserted = 0;

  for student in &students {
    let upstream_id = match resolver.student(student, &mut pacer).await {
      Ok(Some(id)) => id,
      Ok(None) => {
        log.record(&student.name, "no upstream id");
        continue;
      }
      Err(e) if e.is_fatal() => return Err(e),
      Err(e) => {
        log.record(&student.name, e);
        continue;
      }
    };

    let items = match pacer.run(api.student_activities(&upstream_id, date)).await {
      Ok(items) => items,
      Err(e) if e.is_fatal() => return Err(e.into()),
      Err(e) => {
        log.record(&student.name, e);
        continue;
      }
    };

    let owner = StudentRef { student_id: student.student_id, upstream_id };
    let rows = activity_rows(&owner, date, &items);
    if !rows.is_empty() {
      upserted += store
        .upsert_daily_activities(rows)
        .await
        .map_err(Error::store)?;
    }
    collected += 1;
  }

  let report = DailyActivityReport {
    target_date:         date,
    students_total:      students.len(),
    students_collected:  collected,
    activities_upserted: upserted,
    errors:              log.into_inner(),
  };
  tracing::info!(
    %date,
    students = report.students_collected,
    activities = report.activities_upserted,
    errors = report.errors.len(),
    "daily-activity collection finished"
  );
  Ok(report)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::{FakeApi, store_with};
  use serde_json::json;
  use std::time::Duration;
  use tally_core::directory::{Directory, NameMapping, Student};

  fn day() -> NaiveDate { NaiveDate::from_ymd_opt(2024, 3, 4).unwrap() }

  fn student(name: &str, upstream_id: Option<&str>) -> Student {
    Student {
      student_id:  Uuid::new_v4(),
      name:        name.into(),
      class_id:    None,
      upstream_id: upstream_id.map(str::to_owned),
      active:      true,
    }
  }

  fn settings() -> CollectSettings {
    CollectSettings { activity_delay_ms: 300, ..Default::default() }
  }

  fn request() -> DailyActivityRequest {
    DailyActivityRequest { target_date: Some(day()), student_ids: None }
  }

  fn one_book(book: &str, wrong: u32) -> serde_json::Value {
    json!([{
      "bookId": book,
      "title": "Unit",
      "components": [{ "assignedCount": 10, "correctCount": 10 - wrong, "wrongCount": wrong }]
    }])
  }

  #[tokio::test(start_paused = true)]
  async fn rerun_leaves_row_count_unchanged() {
    let store = store_with(Directory {
      students: vec![student("Ada", Some("u-1")), student("Bo", Some("u-2"))],
      ..Default::default()
    })
    .await;
    let api = FakeApi::default()
      .with_activities("u-1", one_book("b1", 2))
      .with_activities("u-2", one_book("b2", 0));

    let first = collect_daily_activity(&store, &api, &settings(), request()).await.unwrap();
    let second = collect_daily_activity(&store, &api, &settings(), request()).await.unwrap();

    assert_eq!(first.activities_upserted, 2);
    assert_eq!(second.students_collected, 2);
    assert_eq!(store.list_daily_activities(day()).await.unwrap().len(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn consecutive_calls_respect_the_delay() {
    let store = store_with(Directory {
      students: (0..4).map(|i| student(&format!("S{i}"), Some(&format!("u-{i}")))).collect(),
      ..Default::default()
    })
    .await;
    let api = FakeApi::default();

    collect_daily_activity(&store, &api, &settings(), request()).await.unwrap();

    let calls = api.calls();
    assert_eq!(calls.len(), 4);
    for pair in calls.windows(2) {
      assert!(pair[1].at - pair[0].at >= Duration::from_millis(300));
    }
    assert!(calls.iter().all(|c| c.date == Some(day())));
  }

  #[tokio::test(start_paused = true)]
  async fn slow_responses_still_get_the_full_pause() {
    let store = store_with(Directory {
      students: (0..3).map(|i| student(&format!("S{i}"), Some(&format!("u-{i}")))).collect(),
      ..Default::default()
    })
    .await;
    let api = FakeApi::default().with_latency(Duration::from_millis(800));

    collect_daily_activity(&store, &api, &settings(), request()).await.unwrap();

    let calls = api.calls();
    assert_eq!(calls.len(), 3);
    for pair in calls.windows(2) {
      assert!(pair[1].at - pair[0].done >= Duration::from_millis(300));
    }
  }

  #[tokio::test(start_paused = true)]
  async fn student_failure_is_recorded_and_skipped() {
    let store = store_with(Directory {
      students: vec![student("Ada", Some("u-1")), student("Bo", Some("u-2"))],
      ..Default::default()
    })
    .await;
    let api = FakeApi::default()
      .failing("activities:u-1")
      .with_activities("u-2", one_book("b2", 1));

    let report = collect_daily_activity(&store, &api, &settings(), request()).await.unwrap();

    assert_eq!(report.students_collected, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].item, "Ada");
  }

  #[tokio::test(start_paused = true)]
  async fn missing_upstream_ids_fall_back_to_name_table_then_directory() {
    let store = store_with(Directory {
      students: vec![student("Ada", None), student("Bo", None), student("Cy", None)],
      name_table: vec![NameMapping { name: "Ada".into(), upstream_id: "u-a".into() }],
      ..Default::default()
    })
    .await;
    let api = FakeApi::default().with_student("u-b", "Bo");

    let report = collect_daily_activity(&store, &api, &settings(), request()).await.unwrap();

    assert_eq!(
      api.call_keys(),
      ["activities:u-a", "students", "activities:u-b"]
    );
    assert_eq!(report.errors, [ItemError::new("Cy", "no upstream id")]);
  }

  #[tokio::test(start_paused = true)]
  async fn allowlist_restricts_students() {
    let ada = student("Ada", Some("u-1"));
    let store = store_with(Directory {
      students: vec![ada.clone(), student("Bo", Some("u-2"))],
      ..Default::default()
    })
    .await;
    let api = FakeApi::default();
    let req = DailyActivityRequest { target_date: Some(day()), student_ids: Some(vec![ada.student_id]) };

    let report = collect_daily_activity(&store, &api, &settings(), req).await.unwrap();

    assert_eq!(report.students_total, 1);
    assert_eq!(api.call_keys(), ["activities:u-1"]);
  }

  #[tokio::test]
  async fn rejected_login_aborts() {
    let store = store_with(Directory {
      students: vec![student("Ada", Some("u-1"))],
      ..Default::default()
    })
    .await;
    let api = FakeApi::default().reject_login();

    let err = collect_daily_activity(&store, &api, &settings(), request()).await.unwrap_err();
    assert!(err.is_fatal());
    assert!(api.calls().is_empty());
  }
}
