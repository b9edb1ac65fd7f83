use axum::{Json, body::Bytes, extract::State};
use tally_collect::homework::{HomeworkReport, HomeworkRequest, collect_homework};
use tally_core::store::IngestStore;

use super::parse_body;
use crate::{AppState, auth::Authenticated, error::{ApiError, Envelope}};

/// `POST /collect/homework`
pub async fn handler<S>(
  Authenticated(caller): Authenticated,
  State(state): State<AppState<S>>,
  body: Bytes,
) -> Result<Json<Envelope<HomeworkReport>>, ApiError>
where
  S: IngestStore + Clone + 'static,
{
  let request: HomeworkRequest = parse_body(&body)?;
  tracing::debug!(?caller, collection_type = ?request.collection_type, "homework requested");
  let report = collect_homework(&*state.store, &state.api, &state.config.collect, request).await?;
  Ok(Json(Envelope::from_report(report)))
}
