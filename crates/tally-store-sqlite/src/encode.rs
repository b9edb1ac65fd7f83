//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 UTC strings with fixed microsecond
//! precision, so they sort lexically. Civil dates are `YYYY-MM-DD`. Lists are
//! compact JSON arrays. UUIDs are hyphenated lowercase strings.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc, Weekday};
use tally_core::{
  activity::{ActivityCategory, ActivityKind, DailyActivity},
  chain::{ChainJob, ChainRequest, JobStatus},
  date,
  directory::{Class, Student},
  homework::HomeworkAssignment,
  problem::{Outcome, ProblemDetail, ProblemResult, UsageStats},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── NaiveDate ───────────────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { date::format_date(d) }

pub fn decode_date(s: &str) -> Result<NaiveDate> { Ok(date::parse_date(s)?) }

// ─── Weekday ─────────────────────────────────────────────────────────────────

pub fn encode_weekday(w: Weekday) -> i64 { i64::from(w.num_days_from_monday()) }

// ─── Lists ───────────────────────────────────────────────────────────────────

pub fn encode_list(items: &[String]) -> Result<String> {
  Ok(serde_json::to_string(items)?)
}

pub fn decode_list(s: &str) -> Result<Vec<String>> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawActivity::from_row`].
pub const ACTIVITY_COLUMNS: &str = "activity_id, student_id, student_upstream_id, date, book_id,
   kind, category, title, chapter, page, progress_ids,
   assigned_count, correct_count, wrong_count, correct_rate,
   updated_at, detail_collected_at";

/// Raw values read directly from a `daily_activities` row.
pub struct RawActivity {
  pub activity_id:         String,
  pub student_id:          String,
  pub student_upstream_id: String,
  pub date:                String,
  pub book_id:             String,
  pub kind:                String,
  pub category:            String,
  pub title:               String,
  pub chapter:             Option<String>,
  pub page:                Option<String>,
  pub progress_ids:        String,
  pub assigned_count:      u32,
  pub correct_count:       u32,
  pub wrong_count:         u32,
  pub correct_rate:        f64,
  pub updated_at:          String,
  pub detail_collected_at: Option<String>,
}

impl RawActivity {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      activity_id:         row.get(0)?,
      student_id:          row.get(1)?,
      student_upstream_id: row.get(2)?,
      date:                row.get(3)?,
      book_id:             row.get(4)?,
      kind:                row.get(5)?,
      category:            row.get(6)?,
      title:               row.get(7)?,
      chapter:             row.get(8)?,
      page:                row.get(9)?,
      progress_ids:        row.get(10)?,
      assigned_count:      row.get(11)?,
      correct_count:       row.get(12)?,
      wrong_count:         row.get(13)?,
      correct_rate:        row.get(14)?,
      updated_at:          row.get(15)?,
      detail_collected_at: row.get(16)?,
    })
  }

  pub fn into_activity(self) -> Result<DailyActivity> {
    Ok(DailyActivity {
      activity_id:         decode_uuid(&self.activity_id)?,
      student_id:          decode_uuid(&self.student_id)?,
      student_upstream_id: self.student_upstream_id,
      date:                decode_date(&self.date)?,
      book_id:             self.book_id,
      kind:                ActivityKind::parse(&self.kind)?,
      category:            ActivityCategory::parse(&self.category)?,
      title:               self.title,
      chapter:             self.chapter,
      page:                self.page,
      progress_ids:        decode_list(&self.progress_ids)?,
      assigned_count:      self.assigned_count,
      correct_count:       self.correct_count,
      wrong_count:         self.wrong_count,
      correct_rate:        self.correct_rate,
      updated_at:          decode_dt(&self.updated_at)?,
      detail_collected_at: self
        .detail_collected_at
        .as_deref()
        .map(decode_dt)
        .transpose()?,
    })
  }
}

/// Raw values read directly from a `problem_results` row.
pub struct RawProblem {
  pub result_id:          String,
  pub activity_id:        String,
  pub problem_id:         String,
  pub progress_id:        Option<String>,
  pub concept_id:         Option<String>,
  pub topic_id:           Option<String>,
  pub sub_topic_id:       Option<String>,
  pub level:              Option<i32>,
  pub problem_type:       Option<String>,
  pub correct_answer:     Option<String>,
  pub student_answer:     Option<String>,
  pub outcome:            String,
  pub usage_attempts:     Option<u32>,
  pub usage_correct_rate: Option<f64>,
  pub media:              String,
  pub recorded_at:        String,
}

impl RawProblem {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      result_id:          row.get(0)?,
      activity_id:        row.get(1)?,
      problem_id:         row.get(2)?,
      progress_id:        row.get(3)?,
      concept_id:         row.get(4)?,
      topic_id:           row.get(5)?,
      sub_topic_id:       row.get(6)?,
      level:              row.get(7)?,
      problem_type:       row.get(8)?,
      correct_answer:     row.get(9)?,
      student_answer:     row.get(10)?,
      outcome:            row.get(11)?,
      usage_attempts:     row.get(12)?,
      usage_correct_rate: row.get(13)?,
      media:              row.get(14)?,
      recorded_at:        row.get(15)?,
    })
  }

  pub fn into_result(self) -> Result<ProblemResult> {
    Ok(ProblemResult {
      result_id:   decode_uuid(&self.result_id)?,
      activity_id: decode_uuid(&self.activity_id)?,
      detail:      ProblemDetail {
        problem_id:     self.problem_id,
        progress_id:    self.progress_id,
        concept_id:     self.concept_id,
        topic_id:       self.topic_id,
        sub_topic_id:   self.sub_topic_id,
        level:          self.level,
        problem_type:   self.problem_type,
        correct_answer: self.correct_answer,
        student_answer: self.student_answer,
        outcome:        Outcome::parse(&self.outcome)?,
        usage:          UsageStats {
          attempts:     self.usage_attempts,
          correct_rate: self.usage_correct_rate,
        },
        media:          decode_list(&self.media)?,
      },
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}

/// Raw values read directly from a `homework` row.
pub struct RawHomework {
  pub homework_row_id:     String,
  pub class_id:            String,
  pub student_upstream_id: String,
  pub student_name:        String,
  pub date:                String,
  pub homework_id:         String,
  pub kind:                String,
  pub title:               String,
  pub page_range:          Option<String>,
  pub progress_ids:        String,
  pub total_problems:      Option<u32>,
  pub completed:           bool,
  pub score:               Option<f64>,
  pub updated_at:          String,
}

impl RawHomework {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      homework_row_id:     row.get(0)?,
      class_id:            row.get(1)?,
      student_upstream_id: row.get(2)?,
      student_name:        row.get(3)?,
      date:                row.get(4)?,
      homework_id:         row.get(5)?,
      kind:                row.get(6)?,
      title:               row.get(7)?,
      page_range:          row.get(8)?,
      progress_ids:        row.get(9)?,
      total_problems:      row.get(10)?,
      completed:           row.get(11)?,
      score:               row.get(12)?,
      updated_at:          row.get(13)?,
    })
  }

  pub fn into_homework(self) -> Result<HomeworkAssignment> {
    Ok(HomeworkAssignment {
      homework_row_id:     decode_uuid(&self.homework_row_id)?,
      class_id:            decode_uuid(&self.class_id)?,
      student_upstream_id: self.student_upstream_id,
      student_name:        self.student_name,
      date:                decode_date(&self.date)?,
      homework_id:         self.homework_id,
      kind:                ActivityKind::parse(&self.kind)?,
      title:               self.title,
      page_range:          self.page_range,
      progress_ids:        decode_list(&self.progress_ids)?,
      total_problems:      self.total_problems,
      completed:           self.completed,
      score:               self.score,
      updated_at:          decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw values read directly from a `students` row.
pub struct RawStudent {
  pub student_id:  String,
  pub name:        String,
  pub class_id:    Option<String>,
  pub upstream_id: Option<String>,
  pub active:      bool,
}

impl RawStudent {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      student_id:  row.get(0)?,
      name:        row.get(1)?,
      class_id:    row.get(2)?,
      upstream_id: row.get(3)?,
      active:      row.get(4)?,
    })
  }

  pub fn into_student(self) -> Result<Student> {
    Ok(Student {
      student_id:  decode_uuid(&self.student_id)?,
      name:        self.name,
      class_id:    self.class_id.as_deref().map(decode_uuid).transpose()?,
      upstream_id: self.upstream_id,
      active:      self.active,
    })
  }
}

/// Raw values read directly from a `classes` row.
pub struct RawClass {
  pub class_id:          String,
  pub name:              String,
  pub upstream_class_id: String,
}

impl RawClass {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      class_id:          row.get(0)?,
      name:              row.get(1)?,
      upstream_class_id: row.get(2)?,
    })
  }

  pub fn into_class(self) -> Result<Class> {
    Ok(Class {
      class_id:          decode_uuid(&self.class_id)?,
      name:              self.name,
      upstream_class_id: self.upstream_class_id,
    })
  }
}

/// Raw values read directly from a `chain_jobs` row.
pub struct RawJob {
  pub job_id:      String,
  pub target_date: String,
  pub depth:       u32,
  pub status:      String,
  pub attempts:    u32,
  pub last_error:  Option<String>,
  pub run_after:   String,
  pub created_at:  String,
  pub updated_at:  String,
}

impl RawJob {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      job_id:      row.get(0)?,
      target_date: row.get(1)?,
      depth:       row.get(2)?,
      status:      row.get(3)?,
      attempts:    row.get(4)?,
      last_error:  row.get(5)?,
      run_after:   row.get(6)?,
      created_at:  row.get(7)?,
      updated_at:  row.get(8)?,
    })
  }

  pub fn into_job(self) -> Result<ChainJob> {
    Ok(ChainJob {
      job_id:     decode_uuid(&self.job_id)?,
      request:    ChainRequest {
        target_date: decode_date(&self.target_date)?,
        chain_depth: self.depth,
      },
      status:     JobStatus::parse(&self.status)?,
      attempts:   self.attempts,
      last_error: self.last_error,
      run_after:  decode_dt(&self.run_after)?,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone as _;

  #[test]
  fn timestamps_sort_lexically() {
    let a = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
    let b = a + chrono::Duration::milliseconds(1500);
    assert!(encode_dt(a) < encode_dt(b));
    assert_eq!(decode_dt(&encode_dt(b)).unwrap(), b);
  }

  #[test]
  fn weekday_numbers_start_at_monday() {
    assert_eq!(encode_weekday(Weekday::Mon), 0);
    assert_eq!(encode_weekday(Weekday::Sun), 6);
  }
}
