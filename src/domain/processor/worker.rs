use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::api::task_dto::{SubmissionMessageDto, SubmitTaskResponseDto};
use crate::api::vdag_dto::VdagDto;
use crate::collaborators::TaskStore;
use crate::domain::processor::processor::{VdagProcessor, assignment_to_wire};
use crate::domain::task::global_task::{TaskUpdate, VDAG_PROCESSING};
use crate::domain::utils::id::TaskId;
use crate::domain::vdag::vdag::VdagObject;
use crate::error::Result;
use crate::loader::parser::parse_json_str;
use crate::transport::queue::QueueClient;

const POP_TIMEOUT: Duration = Duration::from_secs(5);
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Front half of `POST /submitTask`: records a pending task and enqueues it.
pub struct Submitter {
    tasks: Arc<dyn TaskStore>,
    queue: Arc<dyn QueueClient>,
    queue_name: String,
}

impl Submitter {
    pub fn new(tasks: Arc<dyn TaskStore>, queue: Arc<dyn QueueClient>, queue_name: &str) -> Self {
        Submitter { tasks, queue, queue_name: queue_name.to_string() }
    }

    pub async fn submit(&self, dto: VdagDto) -> Result<SubmitTaskResponseDto> {
        let uri = VdagObject::try_from(dto.clone())?.require_uri()?;

        let task_data = serde_json::to_value(&dto)?;
        let task_id = self.tasks.create_task(VDAG_PROCESSING, &task_data).await?;

        let message = SubmissionMessageDto { task_id: task_id.to_string(), task_data };
        self.queue.push(&self.queue_name, serde_json::to_vec(&message)?).await?;

        log::info!("Queued vDAG {} as task {}.", uri, task_id);
        Ok(SubmitTaskResponseDto { vdag_uri: uri.to_string(), task_id: task_id.to_string() })
    }
}

/// Moves submissions from the queue onto an in-process channel.
pub struct InputsListener {
    queue: Arc<dyn QueueClient>,
    queue_name: String,
    sender: mpsc::Sender<SubmissionMessageDto>,
}

impl InputsListener {
    pub fn new(queue: Arc<dyn QueueClient>, queue_name: &str, sender: mpsc::Sender<SubmissionMessageDto>) -> Self {
        InputsListener { queue, queue_name: queue_name.to_string(), sender }
    }

    /// Runs until the worker side of the channel is gone.
    pub async fn run(self) {
        log::info!("Listening for submissions on '{}'.", self.queue_name);

        loop {
            let payload = match self.queue.pop(&self.queue_name, POP_TIMEOUT).await {
                Ok(Some(payload)) => payload,
                Ok(None) => continue,
                Err(e) => {
                    log::error!("Failed to read '{}': {}", self.queue_name, e);
                    tokio::time::sleep(RETRY_DELAY).await;
                    continue;
                }
            };

            let message = match std::str::from_utf8(&payload)
                .map_err(|e| e.to_string())
                .and_then(|raw| parse_json_str::<SubmissionMessageDto>(raw).map_err(|e| e.to_string()))
            {
                Ok(message) => message,
                Err(e) => {
                    log::error!("Discarding malformed submission: {}", e);
                    continue;
                }
            };

            if self.sender.send(message).await.is_err() {
                log::warn!("Task worker has stopped, listener exits.");
                return;
            }
        }
    }
}

/// Back half: compiles each submission and reports the task outcome.
pub struct TaskWorker {
    processor: Arc<VdagProcessor>,
    tasks: Arc<dyn TaskStore>,
}

impl TaskWorker {
    pub fn new(processor: Arc<VdagProcessor>, tasks: Arc<dyn TaskStore>) -> Self {
        TaskWorker { processor, tasks }
    }

    /// Handles one submission and returns the update that was reported.
    pub async fn process(&self, message: SubmissionMessageDto) -> TaskUpdate {
        let task_id = TaskId::new(message.task_id);

        let update = match self.compile(message.task_data).await {
            Ok(status_data) => TaskUpdate::completed(task_id, status_data),
            Err(e) => {
                log::error!("Task {} failed: {}", task_id, e);
                TaskUpdate::failed(task_id, &e)
            }
        };

        if let Err(e) = self.tasks.update_task(&update).await {
            log::error!("Could not record status {} for task {}: {}", update.status, update.task_id, e);
        }
        update
    }

    async fn compile(&self, task_data: Value) -> Result<Value> {
        let dto: VdagDto = serde_json::from_value(task_data)?;
        let vdag = self.processor.map_vdag_to_blocks(VdagObject::try_from(dto)?).await?;

        Ok(json!({
            "vdagURI": vdag.uri_string(),
            "assignment_info": assignment_to_wire(&vdag.assignment_info),
        }))
    }

    pub async fn run(self, mut receiver: mpsc::Receiver<SubmissionMessageDto>) {
        while let Some(message) = receiver.recv().await {
            let update = self.process(message).await;
            log::info!("Task {} finished with status {}.", update.task_id, update.status);
        }
        log::info!("Submission channel closed, task worker exits.");
    }
}
