use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use vdag_system::api::task_dto::{SubmissionMessageDto, TaskUpdateDto};
use vdag_system::api::vdag_dto::VdagDto;
use vdag_system::collaborators::callback::CallbackTaskStore;
use vdag_system::collaborators::in_memory::{MemoryTaskStore, MemoryVdagRegistry, StaticDiscovery, StaticSearchPolicy};
use vdag_system::domain::processor::processor::VdagProcessor;
use vdag_system::domain::processor::worker::{InputsListener, Submitter, TaskWorker};
use vdag_system::domain::task::global_task::{TaskStatus, VDAG_PROCESSING};
use vdag_system::domain::vdag::graph::{Connection, LogicalGraph};
use vdag_system::domain::vdag::node::{NodeObject, PolicyRule};
use vdag_system::domain::vdag::vdag::{VdagObject, VdagStatus};
use vdag_system::error::Error;
use vdag_system::transport::queue::{MemoryQueue, QueueClient};

fn searched_vdag(rule: &str) -> VdagObject {
    VdagObject::new(
        "detector",
        "1.0",
        "stable",
        vec![
            NodeObject::manual("camera", "blk-cam"),
            NodeObject::block("model", Some(PolicyRule::new(rule, json!({"accuracy": 0.9})))),
        ],
        LogicalGraph::new(vec![Connection::new("model", &["camera"])]),
    )
}

struct Harness {
    registry: Arc<MemoryVdagRegistry>,
    tasks: Arc<MemoryTaskStore>,
    queue: Arc<MemoryQueue>,
    submitter: Submitter,
    worker: TaskWorker,
}

fn harness() -> Harness {
    let registry = Arc::new(MemoryVdagRegistry::new());
    let search = Arc::new(StaticSearchPolicy::new().with_matches("rank:detector", &["blk-yolo"]));
    let processor = Arc::new(VdagProcessor::new(
        registry.clone(),
        search,
        Arc::new(StaticDiscovery::uniform("10.0.0.5", 6379)),
    ));
    let tasks = Arc::new(MemoryTaskStore::new());
    let queue = Arc::new(MemoryQueue::new());

    Harness {
        submitter: Submitter::new(tasks.clone(), queue.clone(), "INPUTS"),
        worker: TaskWorker::new(processor, tasks.clone()),
        registry,
        tasks,
        queue,
    }
}

async fn next_submission(queue: &MemoryQueue) -> SubmissionMessageDto {
    let payload = queue.pop("INPUTS", Duration::from_millis(100)).await.unwrap().unwrap();
    serde_json::from_slice(&payload).unwrap()
}

#[tokio::test]
async fn submission_creates_pending_task_and_queues_it() {
    let h = harness();

    let response = h.submitter.submit(VdagDto::from(&searched_vdag("rank:detector"))).await.unwrap();

    assert_eq!(response.vdag_uri, "detector:1.0-stable");
    let task = h.tasks.task(&response.task_id).unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.task_type, VDAG_PROCESSING);

    let message = next_submission(&h.queue).await;
    assert_eq!(message.task_id, response.task_id);
    assert_eq!(message.task_data["vdag_name"], json!("detector"));
}

#[tokio::test]
async fn submission_without_uri_is_rejected_up_front() {
    let h = harness();
    let mut dto = VdagDto::from(&searched_vdag("rank:detector"));
    dto.vdag_name = String::new();

    let result = h.submitter.submit(dto).await;

    assert!(matches!(result, Err(Error::Validation(_))));
    assert_eq!(h.queue.len("INPUTS"), 0);
}

#[tokio::test]
async fn worker_completes_the_task_and_stores_the_vdag() {
    let h = harness();
    let response = h.submitter.submit(VdagDto::from(&searched_vdag("rank:detector"))).await.unwrap();

    let update = h.worker.process(next_submission(&h.queue).await).await;

    assert_eq!(update.status, TaskStatus::Completed);
    let task = h.tasks.task(&response.task_id).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.status_data["vdagURI"], json!("detector:1.0-stable"));
    assert_eq!(task.status_data["assignment_info"]["model"], json!("blk-yolo"));

    assert_eq!(h.registry.stored("detector:1.0-stable").unwrap().status, VdagStatus::Assigned);
}

#[tokio::test]
async fn worker_records_assignment_failure_on_the_task() {
    let h = harness();
    let response = h.submitter.submit(VdagDto::from(&searched_vdag("rank:unknown"))).await.unwrap();

    let update = h.worker.process(next_submission(&h.queue).await).await;

    assert_eq!(update.status, TaskStatus::Failed);
    let task = h.tasks.task(&response.task_id).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.status_data["kind"], json!("assignment_error"));
    assert_eq!(h.registry.stored("detector:1.0-stable").unwrap().status, VdagStatus::Failed);
}

#[tokio::test]
async fn resubmitting_an_assigned_vdag_fails_the_second_task() {
    let h = harness();
    let dto = VdagDto::from(&searched_vdag("rank:detector"));

    h.submitter.submit(dto.clone()).await.unwrap();
    h.worker.process(next_submission(&h.queue).await).await;

    let second = h.submitter.submit(dto).await.unwrap();
    let update = h.worker.process(next_submission(&h.queue).await).await;

    assert_eq!(update.status, TaskStatus::Failed);
    assert_eq!(h.tasks.task(&second.task_id).unwrap().status_data["kind"], json!("conflict_error"));
    assert_eq!(h.registry.stored("detector:1.0-stable").unwrap().status, VdagStatus::Assigned);
}

#[tokio::test]
async fn listener_feeds_the_worker_and_updates_go_to_the_callback_queue() {
    let h = harness();
    let updates = Arc::new(MemoryQueue::new());
    let callback = Arc::new(CallbackTaskStore::new(h.tasks.clone(), updates.clone(), "TASK_UPDATES"));

    let registry = Arc::new(MemoryVdagRegistry::new());
    let processor = Arc::new(VdagProcessor::new(
        registry.clone(),
        Arc::new(StaticSearchPolicy::new().with_matches("rank:detector", &["blk-yolo"])),
        Arc::new(StaticDiscovery::uniform("10.0.0.5", 6379)),
    ));

    let (sender, receiver) = mpsc::channel(8);
    tokio::spawn(InputsListener::new(h.queue.clone(), "INPUTS", sender).run());
    tokio::spawn(TaskWorker::new(processor, callback.clone()).run(receiver));

    let submitter = Submitter::new(callback, h.queue.clone(), "INPUTS");
    let response = submitter.submit(VdagDto::from(&searched_vdag("rank:detector"))).await.unwrap();

    let payload = updates.pop("TASK_UPDATES", Duration::from_secs(5)).await.unwrap().unwrap();
    let update: TaskUpdateDto = serde_json::from_slice(&payload).unwrap();

    assert_eq!(update.task_id, response.task_id);
    assert_eq!(update.status, "completed");
    assert_eq!(registry.stored("detector:1.0-stable").unwrap().status, VdagStatus::Assigned);
    // the callback store leaves the wrapped row untouched
    assert_eq!(h.tasks.task(&response.task_id).unwrap().status, TaskStatus::Pending);
}
