use axum::{Json, body::Bytes, extract::State};
use tally_collect::activity::{DailyActivityReport, DailyActivityRequest, collect_daily_activity};
use tally_core::store::IngestStore;

use super::parse_body;
use crate::{AppState, auth::Authenticated, error::{ApiError, Envelope}};

/// `POST /collect/daily-activity`
pub async fn handler<S>(
  Authenticated(caller): Authenticated,
  State(state): State<AppState<S>>,
  body: Bytes,
) -> Result<Json<Envelope<DailyActivityReport>>, ApiError>
where
  S: IngestStore + Clone + 'static,
{
  let request: DailyActivityRequest = parse_body(&body)?;
  tracing::debug!(?caller, "daily-activity requested");
  let report =
    collect_daily_activity(&*state.store, &state.api, &state.config.collect, request).await?;
  Ok(Json(Envelope::from_report(report)))
}
