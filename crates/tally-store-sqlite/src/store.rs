//! [`SqliteStore`], the SQLite implementation of [`IngestStore`].

use std::{collections::HashSet, path::Path};

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use tally_core::{
  activity::{DailyActivity, NewDailyActivity},
  chain::{ChainJob, ChainRequest, JobStatus},
  directory::{Class, Directory, Student, name_key},
  homework::{HomeworkAssignment, NewHomework, UpsertOutcome},
  problem::{NewProblemResult, ProblemResult},
  store::IngestStore,
};

use crate::{
  Error, Result,
  encode::{
    ACTIVITY_COLUMNS, RawActivity, RawClass, RawHomework, RawJob, RawProblem,
    RawStudent, decode_uuid, encode_date, encode_dt, encode_list, encode_uuid,
    encode_weekday,
  },
  schema::SCHEMA,
};

/// Largest number of ids bound into a single `IN (...)` list.
const IN_CHUNK: usize = 500;

const JOB_COLUMNS: &str = "job_id, target_date, depth, status, attempts, last_error,
   run_after, created_at, updated_at";

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Tally store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. All calls
/// are serialised on the connection's thread, so each closure passed to
/// `call` runs atomically with respect to other store calls.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn query_students(
    &self,
    sql: &'static str,
    param: Option<String>,
  ) -> Result<Vec<Student>> {
    let raws: Vec<RawStudent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(sql)?;
        let rows = match param {
          Some(p) => stmt
            .query_map(rusqlite::params![p], RawStudent::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?,
          None => stmt
            .query_map([], RawStudent::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?,
        };
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawStudent::into_student).collect()
  }

  async fn query_activities(
    &self,
    sql: String,
    date: NaiveDate,
  ) -> Result<Vec<DailyActivity>> {
    let date_str = encode_date(date);

    let raws: Vec<RawActivity> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![date_str], RawActivity::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawActivity::into_activity).collect()
  }
}

fn placeholders(n: usize) -> String {
  (1..=n).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ")
}

// ─── IngestStore impl ────────────────────────────────────────────────────────

impl IngestStore for SqliteStore {
  type Error = Error;

  // ── Reference directory ───────────────────────────────────────────────────

  async fn import_directory(&self, directory: Directory) -> Result<()> {
    let classes: Vec<(String, String, String)> = directory
      .classes
      .iter()
      .map(|c| (encode_uuid(c.class_id), c.name.clone(), c.upstream_class_id.clone()))
      .collect();

    let schedule: Vec<(String, i64)> = directory
      .schedule
      .iter()
      .map(|s| (encode_uuid(s.class_id), encode_weekday(s.weekday)))
      .collect();

    let students: Vec<(String, String, Option<String>, Option<String>, bool)> =
      directory
        .students
        .iter()
        .map(|s| {
          (
            encode_uuid(s.student_id),
            s.name.clone(),
            s.class_id.map(encode_uuid),
            s.upstream_id.clone(),
            s.active,
          )
        })
        .collect();

    let names: Vec<(String, String)> = directory
      .name_table
      .iter()
      .map(|m| (name_key(&m.name), m.upstream_id.clone()))
      .collect();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        for (id, name, upstream) in &classes {
          tx.execute(
            "INSERT INTO classes (class_id, name, upstream_class_id) VALUES (?1, ?2, ?3)
             ON CONFLICT(class_id) DO UPDATE SET
               name = excluded.name,
               upstream_class_id = excluded.upstream_class_id",
            rusqlite::params![id, name, upstream],
          )?;
        }

        let scheduled: HashSet<&String> = schedule.iter().map(|(id, _)| id).collect();
        for id in scheduled {
          tx.execute(
            "DELETE FROM class_schedule WHERE class_id = ?1",
            rusqlite::params![id],
          )?;
        }
        for (id, weekday) in &schedule {
          tx.execute(
            "INSERT OR IGNORE INTO class_schedule (class_id, weekday) VALUES (?1, ?2)",
            rusqlite::params![id, weekday],
          )?;
        }

        for (id, name, class_id, upstream_id, active) in &students {
          tx.execute(
            "INSERT INTO students (student_id, name, class_id, upstream_id, active)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(student_id) DO UPDATE SET
               name = excluded.name,
               class_id = excluded.class_id,
               upstream_id = excluded.upstream_id,
               active = excluded.active",
            rusqlite::params![id, name, class_id, upstream_id, active],
          )?;
        }

        for (key, upstream_id) in &names {
          tx.execute(
            "INSERT INTO student_names (name_key, upstream_id) VALUES (?1, ?2)
             ON CONFLICT(name_key) DO UPDATE SET upstream_id = excluded.upstream_id",
            rusqlite::params![key, upstream_id],
          )?;
        }

        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok(())
  }

  async fn list_active_students(&self) -> Result<Vec<Student>> {
    self
      .query_students(
        "SELECT student_id, name, class_id, upstream_id, active
         FROM students WHERE active = 1 ORDER BY name, student_id",
        None,
      )
      .await
  }

  async fn students_in_class(&self, class_id: Uuid) -> Result<Vec<Student>> {
    self
      .query_students(
        "SELECT student_id, name, class_id, upstream_id, active
         FROM students WHERE class_id = ?1 ORDER BY name, student_id",
        Some(encode_uuid(class_id)),
      )
      .await
  }

  async fn get_classes(&self, ids: Vec<Uuid>) -> Result<Vec<Class>> {
    let id_strs: Vec<String> = ids.into_iter().map(encode_uuid).collect();

    let raws: Vec<RawClass> = self
      .conn
      .call(move |conn| {
        let mut out = Vec::new();
        for chunk in id_strs.chunks(IN_CHUNK) {
          let sql = format!(
            "SELECT class_id, name, upstream_class_id FROM classes
             WHERE class_id IN ({}) ORDER BY name",
            placeholders(chunk.len())
          );
          let mut stmt = conn.prepare(&sql)?;
          let rows = stmt
            .query_map(rusqlite::params_from_iter(chunk.iter()), RawClass::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          out.extend(rows);
        }
        Ok(out)
      })
      .await?;

    raws.into_iter().map(RawClass::into_class).collect()
  }

  async fn classes_meeting_on(&self, weekday: Weekday) -> Result<Vec<Class>> {
    let day = encode_weekday(weekday);

    let raws: Vec<RawClass> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT c.class_id, c.name, c.upstream_class_id
           FROM classes c
           JOIN class_schedule s ON s.class_id = c.class_id
           WHERE s.weekday = ?1
           ORDER BY c.name",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![day], RawClass::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawClass::into_class).collect()
  }

  async fn upstream_id_for_name(&self, name: String) -> Result<Option<String>> {
    let key = name_key(&name);

    let found = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT upstream_id FROM student_names WHERE name_key = ?1",
            rusqlite::params![key],
            |r| r.get(0),
          )
          .optional()?)
      })
      .await?;

    Ok(found)
  }

  // ── Daily activity ────────────────────────────────────────────────────────

  async fn upsert_daily_activities(&self, rows: Vec<NewDailyActivity>) -> Result<usize> {
    let now = encode_dt(Utc::now());

    let mut encoded = Vec::with_capacity(rows.len());
    for row in &rows {
      encoded.push((
        encode_uuid(Uuid::new_v4()),
        encode_uuid(row.student_id),
        row.student_upstream_id.clone(),
        encode_date(row.date),
        row.book_id.clone(),
        row.kind.as_str(),
        row.category.as_str(),
        row.title.clone(),
        row.chapter.clone(),
        row.page.clone(),
        encode_list(&row.progress_ids)?,
        (row.assigned_count, row.correct_count, row.wrong_count, row.correct_rate()),
      ));
    }

    let written = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut written = 0;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO daily_activities (
               activity_id, student_id, student_upstream_id, date, book_id,
               kind, category, title, chapter, page, progress_ids,
               assigned_count, correct_count, wrong_count, correct_rate, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
             ON CONFLICT(student_id, date, book_id) DO UPDATE SET
               student_upstream_id = excluded.student_upstream_id,
               kind           = excluded.kind,
               category       = excluded.category,
               title          = excluded.title,
               chapter        = excluded.chapter,
               page           = excluded.page,
               progress_ids   = excluded.progress_ids,
               assigned_count = excluded.assigned_count,
               correct_count  = excluded.correct_count,
               wrong_count    = excluded.wrong_count,
               correct_rate   = excluded.correct_rate,
               updated_at     = excluded.updated_at",
          )?;
          for (id, student, upstream, date, book, kind, category, title, chapter, page, progress, counts) in &encoded {
            let (assigned, correct, wrong, rate) = counts;
            written += stmt.execute(rusqlite::params![
              id, student, upstream, date, book, kind, category, title, chapter,
              page, progress, assigned, correct, wrong, rate, now,
            ])?;
          }
        }
        tx.commit()?;
        Ok(written)
      })
      .await?;

    Ok(written)
  }

  async fn list_daily_activities(&self, date: NaiveDate) -> Result<Vec<DailyActivity>> {
    let sql = format!(
      "SELECT {ACTIVITY_COLUMNS} FROM daily_activities
       WHERE date = ?1 ORDER BY student_id, book_id"
    );
    self.query_activities(sql, date).await
  }

  async fn wrong_candidates(&self, date: NaiveDate) -> Result<Vec<DailyActivity>> {
    // Ties are broken by rowid so the order is stable across hops.
    let sql = format!(
      "SELECT {ACTIVITY_COLUMNS} FROM daily_activities
       WHERE date = ?1 AND wrong_count > 0
       ORDER BY wrong_count ASC, rowid ASC"
    );
    self.query_activities(sql, date).await
  }

  async fn activities_with_detail(&self, activity_ids: Vec<Uuid>) -> Result<HashSet<Uuid>> {
    let id_strs: Vec<String> = activity_ids.into_iter().map(encode_uuid).collect();

    let found: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut out = Vec::new();
        for chunk in id_strs.chunks(IN_CHUNK) {
          let marks = placeholders(chunk.len());
          let sql = format!(
            "SELECT activity_id FROM daily_activities
             WHERE detail_collected_at IS NOT NULL AND activity_id IN ({marks})
             UNION
             SELECT DISTINCT activity_id FROM problem_results
             WHERE activity_id IN ({marks})"
          );
          let mut stmt = conn.prepare(&sql)?;
          let rows = stmt
            .query_map(rusqlite::params_from_iter(chunk.iter()), |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
          out.extend(rows);
        }
        Ok(out)
      })
      .await?;

    found.iter().map(|s| decode_uuid(s)).collect()
  }

  async fn mark_detail_collected(&self, activity_id: Uuid, at: DateTime<Utc>) -> Result<()> {
    let id_str = encode_uuid(activity_id);
    let at_str = encode_dt(at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE daily_activities SET detail_collected_at = ?2 WHERE activity_id = ?1",
          rusqlite::params![id_str, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Problem results ───────────────────────────────────────────────────────

  async fn insert_problem_results(&self, rows: Vec<NewProblemResult>) -> Result<usize> {
    let now = encode_dt(Utc::now());

    let mut encoded = Vec::with_capacity(rows.len());
    for row in rows {
      let media = encode_list(&row.detail.media)?;
      encoded.push((encode_uuid(Uuid::new_v4()), encode_uuid(row.activity_id), row.detail, media));
    }

    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO problem_results (
               result_id, activity_id, problem_id, progress_id, concept_id,
               topic_id, sub_topic_id, level, problem_type, correct_answer,
               student_answer, outcome, usage_attempts, usage_correct_rate,
               media, recorded_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
             ON CONFLICT(activity_id, problem_id) DO NOTHING",
          )?;
          for (id, activity, d, media) in &encoded {
            inserted += stmt.execute(rusqlite::params![
              id,
              activity,
              d.problem_id,
              d.progress_id,
              d.concept_id,
              d.topic_id,
              d.sub_topic_id,
              d.level,
              d.problem_type,
              d.correct_answer,
              d.student_answer,
              d.outcome.as_str(),
              d.usage.attempts,
              d.usage.correct_rate,
              media,
              now,
            ])?;
          }
        }
        tx.commit()?;
        Ok(inserted)
      })
      .await?;

    Ok(inserted)
  }

  async fn list_problem_results(&self, activity_id: Uuid) -> Result<Vec<ProblemResult>> {
    let id_str = encode_uuid(activity_id);

    let raws: Vec<RawProblem> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT result_id, activity_id, problem_id, progress_id, concept_id,
                  topic_id, sub_topic_id, level, problem_type, correct_answer,
                  student_answer, outcome, usage_attempts, usage_correct_rate,
                  media, recorded_at
           FROM problem_results WHERE activity_id = ?1
           ORDER BY rowid",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawProblem::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawProblem::into_result).collect()
  }

  // ── Homework ──────────────────────────────────────────────────────────────

  async fn upsert_homework(&self, row: NewHomework) -> Result<UpsertOutcome> {
    let id_str       = encode_uuid(Uuid::new_v4());
    let class_str    = encode_uuid(row.class_id);
    let date_str     = encode_date(row.date);
    let progress_str = encode_list(&row.progress_ids)?;
    let now          = encode_dt(Utc::now());

    let existed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let existed = tx
          .query_row(
            "SELECT 1 FROM homework
             WHERE class_id = ?1 AND student_upstream_id = ?2 AND date = ?3 AND homework_id = ?4",
            rusqlite::params![class_str, row.student_upstream_id, date_str, row.homework_id],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);

        tx.execute(
          "INSERT INTO homework (
             homework_row_id, class_id, student_upstream_id, student_name, date,
             homework_id, kind, title, page_range, progress_ids, total_problems,
             completed, score, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
           ON CONFLICT(class_id, student_upstream_id, date, homework_id) DO UPDATE SET
             completed    = excluded.completed,
             score        = excluded.score,
             title        = excluded.title,
             page_range   = excluded.page_range,
             progress_ids = excluded.progress_ids,
             updated_at   = excluded.updated_at",
          rusqlite::params![
            id_str,
            class_str,
            row.student_upstream_id,
            row.student_name,
            date_str,
            row.homework_id,
            row.kind.as_str(),
            row.title,
            row.page_range,
            progress_str,
            row.total_problems,
            row.completed,
            row.score,
            now,
          ],
        )?;
        tx.commit()?;
        Ok(existed)
      })
      .await?;

    Ok(if existed { UpsertOutcome::Updated } else { UpsertOutcome::Inserted })
  }

  async fn list_homework(
    &self,
    class_id: Uuid,
    date: NaiveDate,
  ) -> Result<Vec<HomeworkAssignment>> {
    let class_str = encode_uuid(class_id);
    let date_str  = encode_date(date);

    let raws: Vec<RawHomework> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT homework_row_id, class_id, student_upstream_id, student_name, date,
                  homework_id, kind, title, page_range, progress_ids, total_problems,
                  completed, score, updated_at
           FROM homework WHERE class_id = ?1 AND date = ?2
           ORDER BY student_name, homework_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![class_str, date_str], RawHomework::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawHomework::into_homework).collect()
  }

  // ── Continuation queue ────────────────────────────────────────────────────

  async fn enqueue_chain_job(&self, request: ChainRequest) -> Result<bool> {
    let id_str   = encode_uuid(Uuid::new_v4());
    let date_str = encode_date(request.target_date);
    let now      = encode_dt(Utc::now());

    let inserted = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "INSERT INTO chain_jobs (
             job_id, target_date, depth, status, attempts, run_after, created_at, updated_at
           ) VALUES (?1, ?2, ?3, 'pending', 0, ?4, ?4, ?4)
           ON CONFLICT(target_date, depth) DO UPDATE SET
             status     = 'pending',
             attempts   = 0,
             last_error = NULL,
             run_after  = excluded.run_after,
             updated_at = excluded.updated_at
           WHERE chain_jobs.status IN ('done', 'failed')",
          rusqlite::params![id_str, date_str, request.chain_depth, now],
        )?;
        Ok(n == 1)
      })
      .await?;

    Ok(inserted)
  }

  async fn claim_chain_job(&self, now: DateTime<Utc>) -> Result<Option<ChainJob>> {
    let now_str = encode_dt(now);

    let raw: Option<RawJob> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let job_id: Option<String> = tx
          .query_row(
            "SELECT job_id FROM chain_jobs
             WHERE status = 'pending' AND run_after <= ?1
             ORDER BY run_after, created_at
             LIMIT 1",
            rusqlite::params![now_str],
            |r| r.get(0),
          )
          .optional()?;

        let Some(job_id) = job_id else {
          return Ok(None);
        };

        tx.execute(
          "UPDATE chain_jobs
           SET status = 'running', attempts = attempts + 1, updated_at = ?2
           WHERE job_id = ?1",
          rusqlite::params![job_id, now_str],
        )?;

        let raw = tx.query_row(
          &format!("SELECT {JOB_COLUMNS} FROM chain_jobs WHERE job_id = ?1"),
          rusqlite::params![job_id],
          RawJob::from_row,
        )?;
        tx.commit()?;
        Ok(Some(raw))
      })
      .await?;

    raw.map(RawJob::into_job).transpose()
  }

  async fn complete_chain_job(&self, job_id: Uuid) -> Result<()> {
    let id_str = encode_uuid(job_id);
    let now    = encode_dt(Utc::now());

    let n = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE chain_jobs SET status = ?2, updated_at = ?3 WHERE job_id = ?1",
          rusqlite::params![id_str, JobStatus::Done.as_str(), now],
        )?)
      })
      .await?;

    if n == 0 {
      return Err(Error::JobNotFound(job_id));
    }
    Ok(())
  }

  async fn fail_chain_job(
    &self,
    job_id: Uuid,
    error: String,
    retry_at: Option<DateTime<Utc>>,
  ) -> Result<()> {
    let id_str = encode_uuid(job_id);
    let now    = Utc::now();
    let status = if retry_at.is_some() { JobStatus::Pending } else { JobStatus::Failed };
    let run_after = encode_dt(retry_at.unwrap_or(now));
    let now_str   = encode_dt(now);

    let n = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE chain_jobs
           SET status = ?2, last_error = ?3, run_after = ?4, updated_at = ?5
           WHERE job_id = ?1",
          rusqlite::params![id_str, status.as_str(), error, run_after, now_str],
        )?)
      })
      .await?;

    if n == 0 {
      return Err(Error::JobNotFound(job_id));
    }
    Ok(())
  }

  async fn requeue_running_jobs(&self) -> Result<usize> {
    let now = encode_dt(Utc::now());

    let n = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE chain_jobs SET status = 'pending', updated_at = ?1 WHERE status = 'running'",
          rusqlite::params![now],
        )?)
      })
      .await?;

    Ok(n)
  }

  async fn get_chain_job(&self, request: ChainRequest) -> Result<Option<ChainJob>> {
    let date_str = encode_date(request.target_date);

    let raw: Option<RawJob> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {JOB_COLUMNS} FROM chain_jobs WHERE target_date = ?1 AND depth = ?2"),
            rusqlite::params![date_str, request.chain_depth],
            RawJob::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawJob::into_job).transpose()
  }
}
