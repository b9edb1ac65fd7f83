//! Mapping of upstream payloads onto store records.

use chrono::NaiveDate;
use tally_core::{
  activity::{ActivityCategory, ActivityKind, NewDailyActivity},
  problem::{NewProblemResult, Outcome, ProblemDetail, UsageStats},
};
use tally_upstream::types::{ActivityComponent, ActivityItem, UpstreamProblem};
use uuid::Uuid;

// ─── Markers ─────────────────────────────────────────────────────────────────

/// Map an upstream layout marker onto an [`ActivityKind`]. Without a
/// recognisable marker, an item that carries step ids is a workbook.
pub fn activity_kind(marker: Option<&str>, has_progress_ids: bool) -> ActivityKind {
  let marker = marker.map(|m| m.trim().to_ascii_lowercase());
  match marker.as_deref() {
    Some("workbook" | "book" | "wb") => ActivityKind::Workbook,
    Some("worksheet" | "sheet" | "ws") => ActivityKind::Worksheet,
    _ if has_progress_ids => ActivityKind::Workbook,
    _ => ActivityKind::Worksheet,
  }
}

pub fn activity_category(marker: Option<&str>) -> ActivityCategory {
  let marker = marker.map(|m| m.trim().to_ascii_lowercase().replace('-', "_"));
  match marker.as_deref() {
    Some("wrong_redo" | "wrong" | "redo" | "review") => ActivityCategory::WrongRedo,
    Some("custom" | "teacher") => ActivityCategory::Custom,
    _ => ActivityCategory::Initial,
  }
}

// ─── Daily activity ──────────────────────────────────────────────────────────

/// The student a batch of activity rows belongs to.
#[derive(Debug, Clone)]
pub struct StudentRef {
  pub student_id:  Uuid,
  pub upstream_id: String,
}

/// Flatten a student's activity items, self-learning sub-items included,
/// into one row per (book id).
///
/// Components with nothing assigned are skipped, as are components without a
/// book id on either the component or its item. Components sharing a book id
/// are merged: counts summed and step ids concatenated.
pub fn activity_rows(
  student: &StudentRef,
  date: NaiveDate,
  items: &[ActivityItem],
) -> Vec<NewDailyActivity> {
  let mut rows: Vec<NewDailyActivity> = Vec::new();
  for item in items {
    push_item(&mut rows, student, date, item);
  }
  rows
}

fn push_item(
  rows: &mut Vec<NewDailyActivity>,
  student: &StudentRef,
  date: NaiveDate,
  item: &ActivityItem,
) {
  for component in &item.components {
    if component.assigned_count == 0 {
      continue;
    }
    let Some(row) = component_row(student, date, item, component) else {
      tracing::debug!(title = %item.title, "component without book id skipped");
      continue;
    };
    match rows.iter_mut().find(|r| r.book_id == row.book_id) {
      Some(existing) => merge(existing, row),
      None => rows.push(row),
    }
  }
  for sub in &item.self_learning {
    push_item(rows, student, date, sub);
  }
}

fn component_row(
  student: &StudentRef,
  date: NaiveDate,
  item: &ActivityItem,
  component: &ActivityComponent,
) -> Option<NewDailyActivity> {
  let book_id = component.book_id.clone().or_else(|| item.book_id.clone())?;
  let progress_ids = component.progress_ids.clone();
  let kind = activity_kind(item.kind.as_deref(), !progress_ids.is_empty());
  Some(NewDailyActivity {
    student_id: student.student_id,
    student_upstream_id: student.upstream_id.clone(),
    date,
    book_id,
    kind,
    category: activity_category(item.category.as_deref()),
    title: component.title.clone().unwrap_or_else(|| item.title.clone()),
    chapter: component.chapter.clone(),
    page: component.page.clone(),
    progress_ids: if kind == ActivityKind::Workbook { progress_ids } else { Vec::new() },
    assigned_count: component.assigned_count,
    correct_count: component.correct_count,
    wrong_count: component.wrong_count,
  })
}

fn merge(into: &mut NewDailyActivity, row: NewDailyActivity) {
  into.assigned_count += row.assigned_count;
  into.correct_count += row.correct_count;
  into.wrong_count += row.wrong_count;
  for id in row.progress_ids {
    if !into.progress_ids.contains(&id) {
      into.progress_ids.push(id);
    }
  }
}

// ─── Problem detail ──────────────────────────────────────────────────────────

pub fn problem_detail(problem: UpstreamProblem, progress_id: Option<&str>) -> ProblemDetail {
  let outcome = Outcome::from_marker(problem.result.as_deref());
  ProblemDetail {
    problem_id: problem.problem_id,
    progress_id: problem.progress_id.or_else(|| progress_id.map(str::to_owned)),
    concept_id: problem.concept_id,
    topic_id: problem.topic_id,
    sub_topic_id: problem.sub_topic_id,
    level: problem.level,
    problem_type: problem.problem_type,
    correct_answer: problem.answer,
    student_answer: problem.student_answer,
    outcome,
    usage: UsageStats {
      attempts:     problem.usage_count,
      correct_rate: problem.usage_correct_rate,
    },
    media: problem.media,
  }
}

/// Keep the wrong and unresolved problems of one fetch as result rows.
/// `progress_id` tags problems whose payload omits their step.
pub fn wrong_results(
  activity_id: Uuid,
  problems: Vec<UpstreamProblem>,
  progress_id: Option<&str>,
) -> Vec<NewProblemResult> {
  problems
    .into_iter()
    .map(|p| problem_detail(p, progress_id))
    .filter(|d| d.outcome.needs_detail())
    .map(|detail| NewProblemResult { activity_id, detail })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn student() -> StudentRef {
    StudentRef { student_id: Uuid::new_v4(), upstream_id: "u-1".into() }
  }

  fn day() -> NaiveDate { NaiveDate::from_ymd_opt(2024, 3, 4).unwrap() }

  fn items(value: serde_json::Value) -> Vec<ActivityItem> {
    serde_json::from_value(value).unwrap()
  }

  #[test]
  fn markers_fall_back_sensibly() {
    assert_eq!(activity_kind(Some("WORKBOOK"), false), ActivityKind::Workbook);
    assert_eq!(activity_kind(None, true), ActivityKind::Workbook);
    assert_eq!(activity_kind(Some("odd"), false), ActivityKind::Worksheet);
    assert_eq!(activity_category(Some("WRONG-REDO")), ActivityCategory::WrongRedo);
    assert_eq!(activity_category(None), ActivityCategory::Initial);
  }

  #[test]
  fn self_learning_is_flattened_and_empty_components_skipped() {
    let rows = activity_rows(
      &student(),
      day(),
      &items(json!([{
        "bookId": "b1",
        "title": "Fractions",
        "components": [
          { "assignedCount": 10, "correctCount": 7, "wrongCount": 3 },
          { "bookId": "b2", "assignedCount": 0 }
        ],
        "selfLearning": [{
          "title": "Extra",
          "category": "custom",
          "components": [{ "bookId": "b3", "assignedCount": 4, "correctCount": 4 }]
        }]
      }])),
    );
    let books: Vec<_> = rows.iter().map(|r| r.book_id.as_str()).collect();
    assert_eq!(books, ["b1", "b3"]);
    assert_eq!(rows[0].title, "Fractions");
    assert_eq!(rows[0].correct_rate(), 70.0);
    assert_eq!(rows[1].category, ActivityCategory::Custom);
  }

  #[test]
  fn components_sharing_a_book_are_merged() {
    let rows = activity_rows(
      &student(),
      day(),
      &items(json!([{
        "bookId": "b1",
        "kind": "workbook",
        "components": [
          { "progressIds": ["p1"], "assignedCount": 5, "wrongCount": 1 },
          { "progressIds": ["p2", "p1"], "assignedCount": 5, "wrongCount": 2 }
        ]
      }])),
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].assigned_count, 10);
    assert_eq!(rows[0].wrong_count, 3);
    assert_eq!(rows[0].progress_ids, ["p1", "p2"]);
  }

  #[test]
  fn worksheets_drop_progress_ids() {
    let rows = activity_rows(
      &student(),
      day(),
      &items(json!([{
        "bookId": "b1",
        "kind": "worksheet",
        "components": [{ "progressIds": ["p1"], "assignedCount": 5 }]
      }])),
    );
    assert!(rows[0].progress_ids.is_empty());
  }

  #[test]
  fn only_wrong_and_unknown_problems_are_kept() {
    let problems: Vec<UpstreamProblem> = serde_json::from_value(json!([
      { "problemId": "1", "result": "O" },
      { "problemId": "2", "result": "X" },
      { "problemId": "3" },
      { "problemId": "4", "result": "X", "progressId": "own" }
    ]))
    .unwrap();
    let id = Uuid::new_v4();
    let rows = wrong_results(id, problems, Some("p9"));

    let ids: Vec<_> = rows.iter().map(|r| r.detail.problem_id.as_str()).collect();
    assert_eq!(ids, ["2", "3", "4"]);
    assert_eq!(rows[0].detail.progress_id.as_deref(), Some("p9"));
    assert_eq!(rows[1].detail.outcome, Outcome::Unknown);
    assert_eq!(rows[2].detail.progress_id.as_deref(), Some("own"));
    assert!(rows.iter().all(|r| r.activity_id == id));
  }
}
