use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::api::task_dto::TaskUpdateDto;
use crate::collaborators::TaskStore;
use crate::domain::task::global_task::{GlobalTask, TaskUpdate};
use crate::domain::utils::id::TaskId;
use crate::error::Result;
use crate::transport::queue::QueueClient;

/// Task store whose updates travel through the task-update callback queue;
/// creation and reads go to the wrapped store.
pub struct CallbackTaskStore {
    inner: Arc<dyn TaskStore>,
    queue: Arc<dyn QueueClient>,
    queue_name: String,
}

impl CallbackTaskStore {
    pub fn new(inner: Arc<dyn TaskStore>, queue: Arc<dyn QueueClient>, queue_name: &str) -> Self {
        CallbackTaskStore { inner, queue, queue_name: queue_name.to_string() }
    }
}

#[async_trait]
impl TaskStore for CallbackTaskStore {
    async fn create_task(&self, task_type: &str, task_data: &Value) -> Result<TaskId> {
        self.inner.create_task(task_type, task_data).await
    }

    async fn update_task(&self, update: &TaskUpdate) -> Result<()> {
        let payload = serde_json::to_vec(&TaskUpdateDto::from(update))?;
        self.queue.push(&self.queue_name, payload).await
    }

    async fn get_task(&self, task_id: &TaskId) -> Result<Option<GlobalTask>> {
        self.inner.get_task(task_id).await
    }
}
