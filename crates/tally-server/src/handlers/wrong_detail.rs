use axum::{Json, body::Bytes, extract::State};
use tally_collect::wrong_detail::{WrongDetailReport, WrongDetailRequest, collect_wrong_detail};
use tally_core::store::IngestStore;

use super::parse_body;
use crate::{AppState, auth::Authenticated, error::{ApiError, Envelope}};

/// `POST /collect/wrong-detail`
///
/// The pass runs on its own task, so it is not cancelled when a caller
/// stops waiting for the response (as the HTTP continuation trigger does).
pub async fn handler<S>(
  Authenticated(caller): Authenticated,
  State(state): State<AppState<S>>,
  body: Bytes,
) -> Result<Json<Envelope<WrongDetailReport>>, ApiError>
where
  S: IngestStore + Clone + 'static,
{
  let request: WrongDetailRequest = parse_body(&body)?;
  let zone = state.config.collect.zone()?;
  let chain = request.resolve(&zone);
  tracing::debug!(?caller, depth = chain.chain_depth, "wrong-detail requested");

  let task = tokio::spawn(async move {
    collect_wrong_detail(
      &*state.store,
      &state.api,
      &*state.dispatcher,
      &state.config.collect,
      chain,
    )
    .await
  });
  let report = task.await.map_err(|e| ApiError::Internal(e.to_string()))??;
  Ok(Json(Envelope::from_report(report)))
}
