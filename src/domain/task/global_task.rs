use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::api::task_dto::{GlobalTaskDto, TaskUpdateDto};
use crate::domain::utils::id::TaskId;
use crate::error::{Error, Result};

/// Task type recorded for vDAG submissions.
pub const VDAG_PROCESSING: &str = "vdag_processing";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(Error::Validation(format!("unknown task status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalTask {
    pub task_id: TaskId,
    pub task_type: String,
    pub task_data: Value,
    pub status: TaskStatus,
    pub status_data: Value,
    pub created_at: i64,
    pub updated_at: i64,
}

impl GlobalTask {
    pub fn pending(task_id: TaskId, task_type: &str, task_data: Value, now: i64) -> Self {
        GlobalTask {
            task_id,
            task_type: task_type.to_string(),
            task_data,
            status: TaskStatus::Pending,
            status_data: Value::Object(Default::default()),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, update: &TaskUpdate, now: i64) {
        self.status = update.status;
        self.status_data = update.status_data.clone();
        self.updated_at = now;
    }
}

impl TryFrom<GlobalTaskDto> for GlobalTask {
    type Error = Error;

    fn try_from(dto: GlobalTaskDto) -> Result<Self> {
        Ok(GlobalTask {
            task_id: TaskId::new(dto.task_id),
            task_type: dto.task_type,
            task_data: dto.task_data,
            status: dto.task_status.parse()?,
            status_data: dto.task_status_data,
            created_at: dto.task_create_timestamp,
            updated_at: dto.task_update_timestamp,
        })
    }
}

impl From<&GlobalTask> for GlobalTaskDto {
    fn from(task: &GlobalTask) -> Self {
        GlobalTaskDto {
            task_id: task.task_id.to_string(),
            task_type: task.task_type.clone(),
            task_data: task.task_data.clone(),
            task_status: task.status.as_str().to_string(),
            task_status_data: task.status_data.clone(),
            task_create_timestamp: task.created_at,
            task_update_timestamp: task.updated_at,
        }
    }
}

/// A status transition reported by the compile worker.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskUpdate {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub status_data: Value,
}

impl TaskUpdate {
    pub fn completed(task_id: TaskId, status_data: Value) -> Self {
        TaskUpdate { task_id, status: TaskStatus::Completed, status_data }
    }

    /// Failure carrying `{error, kind}` so callers can tell error classes apart.
    pub fn failed(task_id: TaskId, err: &Error) -> Self {
        TaskUpdate {
            task_id,
            status: TaskStatus::Failed,
            status_data: serde_json::json!({"error": err.to_string(), "kind": err.kind()}),
        }
    }
}

impl From<&TaskUpdate> for TaskUpdateDto {
    fn from(update: &TaskUpdate) -> Self {
        TaskUpdateDto {
            task_id: update.task_id.to_string(),
            status: update.status.as_str().to_string(),
            task_status_data: update.status_data.clone(),
        }
    }
}

impl TryFrom<TaskUpdateDto> for TaskUpdate {
    type Error = Error;

    fn try_from(dto: TaskUpdateDto) -> Result<Self> {
        Ok(TaskUpdate { task_id: TaskId::new(dto.task_id), status: dto.status.parse()?, status_data: dto.task_status_data })
    }
}
