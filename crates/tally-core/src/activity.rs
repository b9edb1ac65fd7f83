//! Daily activity: one student's per-day summary for one upstream book.
//!
//! Rows are keyed by (student, civil date, upstream book id). Re-collection
//! overwrites the counts of an existing row; it never adds a second one.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Kind & category ─────────────────────────────────────────────────────────

/// How the problems of an assignment are laid out upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
  /// Structured assignment; each step has its own progress id and its detail
  /// must be fetched step by step.
  Workbook,
  /// Flat assignment; the full problem set comes back from one call.
  Worksheet,
}

impl ActivityKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Workbook => "workbook",
      Self::Worksheet => "worksheet",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "workbook" => Ok(Self::Workbook),
      "worksheet" => Ok(Self::Worksheet),
      other => Err(Error::UnknownActivityKind(other.to_owned())),
    }
  }
}

/// Why the assignment was handed out.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ActivityCategory {
  /// First assignment of the material.
  #[default]
  Initial,
  /// Supplementary redo of previously wrong answers.
  WrongRedo,
  /// Assignment composed by the teacher.
  Custom,
}

impl ActivityCategory {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Initial => "initial",
      Self::WrongRedo => "wrong_redo",
      Self::Custom => "custom",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "initial" => Ok(Self::Initial),
      "wrong_redo" => Ok(Self::WrongRedo),
      "custom" => Ok(Self::Custom),
      other => Err(Error::UnknownActivityCategory(other.to_owned())),
    }
  }
}

// ─── Counts ──────────────────────────────────────────────────────────────────

/// Percentage of correct answers, rounded to one decimal. Zero when nothing
/// was assigned.
pub fn correct_rate(assigned: u32, correct: u32) -> f64 {
  if assigned == 0 {
    return 0.0;
  }
  let rate = f64::from(correct) / f64::from(assigned) * 100.0;
  (rate * 10.0).round() / 10.0
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// A stored daily activity row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyActivity {
  pub activity_id:         Uuid,
  pub student_id:          Uuid,
  /// The student's id on the upstream platform, captured at collection time
  /// so the detail pass does not need to resolve it again.
  pub student_upstream_id: String,
  pub date:                NaiveDate,
  pub book_id:             String,
  pub kind:                ActivityKind,
  pub category:            ActivityCategory,
  pub title:               String,
  pub chapter:             Option<String>,
  pub page:                Option<String>,
  /// Workbook step ids, in upstream order. Empty for worksheets.
  pub progress_ids:        Vec<String>,
  pub assigned_count:      u32,
  pub correct_count:       u32,
  pub wrong_count:         u32,
  pub correct_rate:        f64,
  pub updated_at:          DateTime<Utc>,
  /// Set once wrong-answer detail has been fetched for this row, whether or
  /// not any wrong/unknown problems came back.
  pub detail_collected_at: Option<DateTime<Utc>>,
}

/// Input to [`crate::store::IngestStore::upsert_daily_activities`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewDailyActivity {
  pub student_id:          Uuid,
  pub student_upstream_id: String,
  pub date:                NaiveDate,
  pub book_id:             String,
  pub kind:                ActivityKind,
  pub category:            ActivityCategory,
  pub title:               String,
  pub chapter:             Option<String>,
  pub page:                Option<String>,
  pub progress_ids:        Vec<String>,
  pub assigned_count:      u32,
  pub correct_count:       u32,
  pub wrong_count:         u32,
}

impl NewDailyActivity {
  pub fn correct_rate(&self) -> f64 {
    correct_rate(self.assigned_count, self.correct_count)
  }
}
