use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Row of the global tasks store.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GlobalTaskDto {
    pub task_id: String,
    #[serde(default)]
    pub task_type: String,
    #[serde(default)]
    pub task_data: Value,
    #[serde(default = "default_status")]
    pub task_status: String,
    #[serde(default)]
    pub task_status_data: Value,
    #[serde(default)]
    pub task_create_timestamp: i64,
    #[serde(default)]
    pub task_update_timestamp: i64,
}

fn default_status() -> String {
    "pending".to_string()
}

/// Message placed on the submission queue by `POST /submitTask`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SubmissionMessageDto {
    pub task_id: String,
    pub task_data: Value,
}

/// Status callback for the tasks store.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TaskUpdateDto {
    pub task_id: String,
    pub status: String,
    #[serde(default)]
    pub task_status_data: Value,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SubmitTaskResponseDto {
    #[serde(rename = "vdagURI")]
    pub vdag_uri: String,
    pub task_id: String,
}
