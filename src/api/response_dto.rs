use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// `{success, data | message}` envelope used by this service and by the
/// registries it talks to. Discovery answers with `graph` instead of `data`,
/// the vDAG registry reports failures under `error`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ApiResponseDto {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl ApiResponseDto {
    pub fn ok(data: Value) -> Self {
        ApiResponseDto { success: true, data: Some(data), ..Default::default() }
    }

    pub fn failure(err: &Error) -> Self {
        ApiResponseDto { success: false, message: Some(err.to_string()), kind: Some(err.kind().to_string()), ..Default::default() }
    }

    pub fn error_message(&self) -> String {
        self.message.clone().or_else(|| self.error.clone()).unwrap_or_else(|| "Unknown error occurred".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failure_carries_error_kind() {
        let response = ApiResponseDto::failure(&Error::Validation("duplicate node label A".to_string()));
        let body = serde_json::to_value(&response).unwrap();

        assert_eq!(body["success"], json!(false));
        assert_eq!(body["kind"], json!("validation_error"));
        assert!(body.get("data").is_none());
    }

    #[test]
    fn registry_error_field_is_used_as_message() {
        let response: ApiResponseDto = serde_json::from_str(r#"{"success": false, "error": "vDAG not found"}"#).unwrap();
        assert_eq!(response.error_message(), "vDAG not found");
    }
}
