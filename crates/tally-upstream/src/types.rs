//! Response shapes of the upstream API.
//!
//! The upstream is inconsistent about id types (numbers in some listings,
//! strings in others) and omits empty fields freely, so ids are read as
//! strings whatever their JSON type and every optional field defaults.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::Result;

/// Read a JSON string or number as a `String`.
fn id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
  match Value::deserialize(d)? {
    Value::String(s) => Ok(s),
    Value::Number(n) => Ok(n.to_string()),
    other => Err(serde::de::Error::custom(format!("expected id, got {other}"))),
  }
}

fn opt_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
  match Option::<Value>::deserialize(d)? {
    None | Some(Value::Null) => Ok(None),
    Some(Value::String(s)) if s.is_empty() => Ok(None),
    Some(Value::String(s)) => Ok(Some(s)),
    Some(Value::Number(n)) => Ok(Some(n.to_string())),
    Some(other) => Err(serde::de::Error::custom(format!("expected id, got {other}"))),
  }
}

fn id_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
  let values = Option::<Vec<Value>>::deserialize(d)?.unwrap_or_default();
  values
    .into_iter()
    .map(|v| match v {
      Value::String(s) => Ok(s),
      Value::Number(n) => Ok(n.to_string()),
      other => Err(serde::de::Error::custom(format!("expected id, got {other}"))),
    })
    .collect()
}

/// Unwrap a list response that may be bare or wrapped as `{"data": [...]}`.
pub fn parse_list<T: for<'de> Deserialize<'de>>(value: Value) -> Result<Vec<T>> {
  let inner = match value {
    Value::Null => return Ok(Vec::new()),
    Value::Object(mut obj) => obj.remove("data").unwrap_or(Value::Null),
    other => other,
  };
  if inner.is_null() {
    return Ok(Vec::new());
  }
  Ok(serde_json::from_value(inner)?)
}

// ─── Directory ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamStudent {
  #[serde(alias = "id", deserialize_with = "id")]
  pub student_id: String,
  #[serde(alias = "studentName")]
  pub name:       String,
}

// ─── Daily activity ──────────────────────────────────────────────────────────

/// One assignment in a student's daily activity listing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActivityItem {
  #[serde(deserialize_with = "opt_id")]
  pub book_id:       Option<String>,
  /// Free-form layout marker, e.g. `"WORKBOOK"` or `"worksheet"`.
  pub kind:          Option<String>,
  /// Free-form category marker, e.g. `"INITIAL"` or `"WRONG_REDO"`.
  pub category:      Option<String>,
  pub title:         String,
  pub components:    Vec<ActivityComponent>,
  /// Self-directed work nested under the assignment.
  pub self_learning: Vec<ActivityItem>,
}

/// A countable unit within an assignment; each becomes one activity row.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActivityComponent {
  #[serde(deserialize_with = "opt_id")]
  pub book_id:        Option<String>,
  pub title:          Option<String>,
  pub chapter:        Option<String>,
  pub page:           Option<String>,
  #[serde(deserialize_with = "id_list")]
  pub progress_ids:   Vec<String>,
  pub assigned_count: u32,
  pub correct_count:  u32,
  pub wrong_count:    u32,
}

// ─── Homework ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpstreamHomework {
  #[serde(deserialize_with = "id")]
  pub homework_id:  String,
  /// Embedded upstream student id; not always present.
  #[serde(deserialize_with = "opt_id")]
  pub student_id:   Option<String>,
  pub student_name: String,
  pub kind:         Option<String>,
  #[serde(deserialize_with = "opt_id")]
  pub book_id:      Option<String>,
  pub title:        String,
  pub page_range:   Option<String>,
  #[serde(deserialize_with = "id_list")]
  pub progress_ids: Vec<String>,
  pub completed:    bool,
  pub score:        Option<f64>,
}

// ─── Problem detail ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpstreamProblem {
  #[serde(deserialize_with = "id")]
  pub problem_id:         String,
  #[serde(deserialize_with = "opt_id")]
  pub progress_id:        Option<String>,
  #[serde(deserialize_with = "opt_id")]
  pub concept_id:         Option<String>,
  #[serde(deserialize_with = "opt_id")]
  pub topic_id:           Option<String>,
  #[serde(deserialize_with = "opt_id")]
  pub sub_topic_id:       Option<String>,
  pub level:              Option<i32>,
  pub problem_type:       Option<String>,
  #[serde(alias = "correctAnswer")]
  pub answer:             Option<String>,
  pub student_answer:     Option<String>,
  /// Result marker; spelling varies (`"O"`, `"X"`, `"wrong"`, ...).
  pub result:             Option<String>,
  pub usage_count:        Option<u32>,
  pub usage_correct_rate: Option<f64>,
  #[serde(alias = "mediaUrls")]
  pub media:              Vec<String>,
}
