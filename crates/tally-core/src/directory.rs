//! Reference data: students, classes and the weekly class schedule.
//!
//! The collectors only read these. They are written by the directory import.

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
  pub student_id:  Uuid,
  pub name:        String,
  pub class_id:    Option<Uuid>,
  /// Id on the upstream platform, when already known locally.
  pub upstream_id: Option<String>,
  pub active:      bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Class {
  pub class_id:          Uuid,
  pub name:              String,
  pub upstream_class_id: String,
}

/// One weekday on which a class meets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSlot {
  pub class_id: Uuid,
  pub weekday:  Weekday,
}

/// A directory snapshot as loaded by the import path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Directory {
  #[serde(default)]
  pub classes:    Vec<Class>,
  #[serde(default)]
  pub schedule:   Vec<ScheduleSlot>,
  #[serde(default)]
  pub students:   Vec<Student>,
  /// Student name → upstream id, for students whose own record lacks one.
  #[serde(default)]
  pub name_table: Vec<NameMapping>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameMapping {
  pub name:        String,
  pub upstream_id: String,
}

/// Normalise a student name for name-keyed lookups: trimmed, inner
/// whitespace collapsed.
pub fn name_key(name: &str) -> String {
  name.split_whitespace().collect::<Vec<_>>().join(" ")
}
