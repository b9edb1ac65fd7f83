//! Phase 2: homework.
//!
//! Per class: fetch the class's homework for the target date, attribute each
//! item to a student, look up the problem count of worksheets and upsert.
//! A failing class is recorded and the next class is attempted.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tally_core::{
  activity::ActivityKind,
  directory::{Class, name_key},
  homework::{NewHomework, UpsertOutcome},
  store::IngestStore,
};
use tally_upstream::{Pacer, TutoringApi, types::UpstreamHomework};
use uuid::Uuid;

use crate::{
  CollectSettings, Error, ItemError, Report, Result,
  normalize::activity_kind,
  report::ErrorLog,
  resolver::Resolver,
};

/// How the classes to collect are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionType {
  /// Classes scheduled to meet on the target date's weekday.
  #[default]
  Today,
  /// Exactly the classes named in the request.
  Manual,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeworkRequest {
  #[serde(default)]
  pub collection_type: CollectionType,
  #[serde(default)]
  pub class_ids:       Option<Vec<Uuid>>,
  #[serde(default)]
  pub target_date:     Option<NaiveDate>,
  /// Date the stored rows are attributed to; defaults to the target date.
  #[serde(default)]
  pub homework_date:   Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeworkReport {
  pub target_date:       NaiveDate,
  pub homework_date:     NaiveDate,
  pub classes_total:     usize,
  pub classes_collected: usize,
  pub inserted:          usize,
  pub updated:           usize,
  #[serde(skip)]
  pub errors:            Vec<ItemError>,
}

impl Report for HomeworkReport {
  fn summary(&self) -> String {
    format!(
      "collected homework for {}/{} classes on {}: {} new, {} updated",
      self.classes_collected, self.classes_total, self.target_date, self.inserted, self.updated
    )
  }

  fn errors(&self) -> &[ItemError] { &self.errors }
}

#[derive(Default)]
struct Tally {
  inserted: usize,
  updated:  usize,
}

pub async fn collect_homework<S, A>(
  store: &S,
  api: &A,
  settings: &CollectSettings,
  request: HomeworkRequest,
) -> Result<HomeworkReport>
where
  S: IngestStore,
  A: TutoringApi,
{
  let date = settings.zone()?.resolve(request.target_date);
  let attribution = request.homework_date.unwrap_or(date);

  let classes = match (&request.class_ids, request.collection_type) {
    (Some(ids), _) if !ids.is_empty() => {
      store.get_classes(ids.clone()).await.map_err(Error::store)?
    }
    (_, CollectionType::Manual) => {
      return Err(Error::InvalidRequest("manual collection requires classIds".into()));
    }
    (_, CollectionType::Today) => store
      .classes_meeting_on(date.weekday())
      .await
      .map_err(Error::store)?,
  };
  tracing::info!(%date, %attribution, classes = classes.len(), "homework collection started");

  api.authenticate().await?;

  let mut pacer = Pacer::from_millis(settings.homework_delay_ms);
  let mut resolver = Resolver::new(store, api);
  let mut log = ErrorLog::default();
  let mut total = Tally::default();
  let mut collected = 0;

  for class in &classes {
    let result = collect_class(
      store,
      api,
      &mut resolver,
      &mut pacer,
      &mut log,
      class,
      date,
      attribution,
    )
    .await;
    match result {
      Ok(tally) => {
        total.inserted += tally.inserted;
        total.updated += tally.updated;
        collected += 1;
      }
      Err(e) if e.is_fatal() => return Err(e),
      Err(e) => log.record(&class.name, e),
    }
  }

  let report = HomeworkReport {
    target_date:       date,
    homework_date:     attribution,
    classes_total:     classes.len(),
    classes_collected: collected,
    inserted:          total.inserted,
    updated:           total.updated,
    errors:            log.into_inner(),
  };
  tracing::info!(
    %date,
    classes = report.classes_collected,
    inserted = report.inserted,
    updated = report.updated,
    errors = report.errors.len(),
    "homework collection finished"
  );
  Ok(report)
}

#[allow(clippy::too_many_arguments)]
async fn collect_class<S, A>(
  store: &S,
  api: &A,
  resolver: &mut Resolver<'_, S, A>,
  pacer: &mut Pacer,
  log: &mut ErrorLog,
  class: &Class,
  date: NaiveDate,
  attribution: NaiveDate,
) -> Result<Tally>
where
  S: IngestStore,
  A: TutoringApi,
{
  let roster = class_roster(store, resolver, class.class_id).await?;

  let items = pacer.run(api.class_homework(&class.upstream_class_id, date)).await?;

  let mut tally = Tally::default();
  for item in items {
    let label = format!("{}/{}", class.name, item.homework_id);

    let upstream_id = match roster.get(&name_key(&item.student_name)) {
      Some(id) => Some(id.clone()),
      None => match item.student_id.clone() {
        Some(id) => Some(id),
        None => match resolver.directory_name(&item.student_name, pacer).await {
          Ok(id) => id,
          Err(e) if e.is_fatal() => return Err(e),
          Err(e) => {
            log.record(&label, e);
            None
          }
        },
      },
    };
    let Some(upstream_id) = upstream_id else {
      log.record(&label, format!("no upstream id for {}", item.student_name));
      continue;
    };

    let kind = activity_kind(item.kind.as_deref(), !item.progress_ids.is_empty());
    let total_problems = match (kind, item.book_id.as_deref()) {
      (ActivityKind::Worksheet, Some(book_id)) => {
        match pacer.run(api.worksheet_problems(&upstream_id, book_id)).await {
          Ok(problems) => u32::try_from(problems.len()).ok(),
          Err(e) if e.is_fatal() => return Err(e.into()),
          Err(e) => {
            log.record(&label, format!("problem count unavailable: {e}"));
            None
          }
        }
      }
      _ => None,
    };

    let row = homework_row(class.class_id, upstream_id, attribution, kind, total_problems, item);
    match store.upsert_homework(row).await.map_err(Error::store)? {
      UpsertOutcome::Inserted => tally.inserted += 1,
      UpsertOutcome::Updated => tally.updated += 1,
    }
  }
  Ok(tally)
}

/// `name_key` → upstream id for the students of one class, from their own
/// records or the internal name table.
async fn class_roster<S, A>(
  store: &S,
  resolver: &Resolver<'_, S, A>,
  class_id: Uuid,
) -> Result<HashMap<String, String>>
where
  S: IngestStore,
  A: TutoringApi,
{
  let students = store.students_in_class(class_id).await.map_err(Error::store)?;
  let mut roster = HashMap::with_capacity(students.len());
  for student in students {
    let id = match student.upstream_id.filter(|id| !id.is_empty()) {
      Some(id) => Some(id),
      None => resolver.local_name(&student.name).await?,
    };
    if let Some(id) = id {
      roster.insert(name_key(&student.name), id);
    }
  }
  Ok(roster)
}

fn homework_row(
  class_id: Uuid,
  student_upstream_id: String,
  date: NaiveDate,
  kind: ActivityKind,
  total_problems: Option<u32>,
  item: UpstreamHomework,
) -> NewHomework {
  NewHomework {
    class_id,
    student_upstream_id,
    student_name: item.student_name,
    date,
    homework_id: item.homework_id,
    kind,
    title: item.title,
    page_range: item.page_range,
    progress_ids: item.progress_ids,
    total_problems,
    completed: item.completed,
    score: item.score,
  }
}
