use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use crate::api::dryrun_dto::ValidateGraphDto;
use crate::api::response_dto::ApiResponseDto;
use crate::api::vdag_dto::VdagDto;
use crate::domain::processor::processor::{assignment_to_wire, end_to_end_dto};
use crate::domain::vdag::vdag::VdagObject;
use crate::server::helpers::into_api_response;
use crate::server::state::AppState;

type ApiReply = (StatusCode, Json<ApiResponseDto>);

/// `POST /submitTask`
pub async fn submit_task(State(state): State<AppState>, Json(body): Json<VdagDto>) -> ApiReply {
    into_api_response(state.submitter.submit(body).await)
}

/// `POST /dryrun/assignment-policy`
pub async fn dry_run_assignment(State(state): State<AppState>, Json(body): Json<VdagDto>) -> ApiReply {
    let result = match VdagObject::try_from(body) {
        Ok(vdag) => state.processor.dry_run_assignment(&vdag).await.map(|a| assignment_to_wire(&a)),
        Err(e) => Err(e),
    };
    into_api_response(result)
}

/// `POST /dryrun/end-to-end`
pub async fn dry_run_end_to_end(State(state): State<AppState>, Json(body): Json<VdagDto>) -> ApiReply {
    let result = match VdagObject::try_from(body) {
        Ok(vdag) => state.processor.dry_run_end_to_end(&vdag).await.map(|(a, c)| end_to_end_dto(&a, &c)),
        Err(e) => Err(e),
    };
    into_api_response(result)
}

/// `POST /dryrun/validate-graph`
pub async fn dry_run_validate_graph(State(state): State<AppState>, Json(body): Json<VdagDto>) -> ApiReply {
    let result = match VdagObject::try_from(body) {
        Ok(vdag) => state.processor.validate_graph(&vdag).await.map(|g| ValidateGraphDto::from(&g)),
        Err(e) => Err(e),
    };
    into_api_response(result)
}
