use axum::Json;
use axum::http::StatusCode;
use serde::Serialize;

use crate::api::response_dto::ApiResponseDto;
use crate::error::{Error, Result};

pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::Validation(_) | Error::DeserializationError(_) => StatusCode::BAD_REQUEST,
        Error::Conflict { .. } => StatusCode::CONFLICT,
        Error::Assignment { .. } | Error::Composition(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Transport(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Converts a handler result into the `{success, data}` envelope.
///
/// Errors are logged and mapped onto a status code by class, with the
/// error kind in the body.
pub fn into_api_response<T: Serialize>(result: Result<T>) -> (StatusCode, Json<ApiResponseDto>) {
    let result = result.and_then(|value| Ok(serde_json::to_value(value)?));

    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponseDto::ok(data))),
        Err(err) => {
            log::error!("API error: {}", err);
            (status_for(&err), Json(ApiResponseDto::failure(&err)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn conflict_maps_to_409() {
        let (status, Json(body)) =
            into_api_response::<()>(Err(Error::Conflict { vdag: "p:1-a".into(), status: "assigned".into() }));

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body.kind.as_deref(), Some("conflict_error"));
    }

    #[test]
    fn success_wraps_data() {
        let (status, Json(body)) = into_api_response(Ok(json!({"task_id": "t-1"})));

        assert_eq!(status, StatusCode::OK);
        assert!(body.success);
        assert_eq!(body.data, Some(json!({"task_id": "t-1"})));
    }
}
