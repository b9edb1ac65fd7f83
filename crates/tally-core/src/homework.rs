//! Homework assignments: class-scoped work collected per student and date.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::activity::ActivityKind;

/// A stored homework row, unique per
/// (class, student upstream id, date, upstream homework id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomeworkAssignment {
  pub homework_row_id:     Uuid,
  pub class_id:            Uuid,
  pub student_upstream_id: String,
  pub student_name:        String,
  pub date:                NaiveDate,
  pub homework_id:         String,
  pub kind:                ActivityKind,
  pub title:               String,
  pub page_range:          Option<String>,
  pub progress_ids:        Vec<String>,
  /// Total problems in the assignment; only known for worksheets.
  pub total_problems:      Option<u32>,
  pub completed:           bool,
  pub score:               Option<f64>,
  pub updated_at:          DateTime<Utc>,
}

/// Input to [`crate::store::IngestStore::upsert_homework`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewHomework {
  pub class_id:            Uuid,
  pub student_upstream_id: String,
  pub student_name:        String,
  pub date:                NaiveDate,
  pub homework_id:         String,
  pub kind:                ActivityKind,
  pub title:               String,
  pub page_range:          Option<String>,
  pub progress_ids:        Vec<String>,
  pub total_problems:      Option<u32>,
  pub completed:           bool,
  pub score:               Option<f64>,
}

/// Whether an upsert created a row or refreshed an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
  Inserted,
  Updated,
}
