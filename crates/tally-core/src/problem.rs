//! Problem results: per-problem answer detail for wrong or unresolved
//! answers inside a daily activity.
//!
//! Results are immutable once written. Correctly answered problems are never
//! stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// How the student fared on a single problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
  Correct,
  Wrong,
  Unknown,
}

impl Outcome {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Correct => "correct",
      Self::Wrong => "wrong",
      Self::Unknown => "unknown",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "correct" => Ok(Self::Correct),
      "wrong" => Ok(Self::Wrong),
      "unknown" => Ok(Self::Unknown),
      other => Err(Error::UnknownOutcome(other.to_owned())),
    }
  }

  /// Map an upstream result marker onto an outcome. The upstream uses several
  /// spellings; anything unrecognised (including an absent marker) is
  /// `Unknown`.
  pub fn from_marker(marker: Option<&str>) -> Self {
    let Some(marker) = marker else {
      return Self::Unknown;
    };
    match marker.trim().to_ascii_lowercase().as_str() {
      "o" | "correct" | "right" | "true" | "1" => Self::Correct,
      "x" | "wrong" | "incorrect" | "false" | "0" => Self::Wrong,
      _ => Self::Unknown,
    }
  }

  /// Whether a problem with this outcome gets a stored result.
  pub fn needs_detail(self) -> bool { !matches!(self, Self::Correct) }
}

/// Historical usage statistics for a problem across all students.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
  pub attempts:     Option<u32>,
  pub correct_rate: Option<f64>,
}

/// A stored problem result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemResult {
  pub result_id:   Uuid,
  pub activity_id: Uuid,
  #[serde(flatten)]
  pub detail:      ProblemDetail,
  pub recorded_at: DateTime<Utc>,
}

/// The per-problem payload shared by stored results and insert candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemDetail {
  pub problem_id:     String,
  pub progress_id:    Option<String>,
  pub concept_id:     Option<String>,
  pub topic_id:       Option<String>,
  pub sub_topic_id:   Option<String>,
  pub level:          Option<i32>,
  pub problem_type:   Option<String>,
  pub correct_answer: Option<String>,
  pub student_answer: Option<String>,
  pub outcome:        Outcome,
  pub usage:          UsageStats,
  pub media:          Vec<String>,
}

/// Input to [`crate::store::IngestStore::insert_problem_results`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewProblemResult {
  pub activity_id: Uuid,
  pub detail:      ProblemDetail,
}
