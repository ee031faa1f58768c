use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde_json::json;
use std::sync::Arc;

use vdag_system::api::vdag_dto::VdagDto;
use vdag_system::collaborators::in_memory::{MemoryTaskStore, MemoryVdagRegistry, StaticDiscovery, StaticSearchPolicy};
use vdag_system::domain::processor::processor::VdagProcessor;
use vdag_system::domain::processor::worker::Submitter;
use vdag_system::domain::vdag::graph::{Connection, LogicalGraph};
use vdag_system::domain::vdag::node::{NodeObject, PolicyRule};
use vdag_system::domain::vdag::vdag::{VdagObject, VdagStatus};
use vdag_system::server::handlers;
use vdag_system::server::state::AppState;
use vdag_system::transport::queue::MemoryQueue;

fn pipeline() -> VdagObject {
    VdagObject::new(
        "pipeline",
        "1.0",
        "stable",
        vec![NodeObject::manual("A", "blk-1"), NodeObject::manual("B", "blk-2")],
        LogicalGraph::new(vec![Connection::new("B", &["A"])]),
    )
}

fn state(registry: MemoryVdagRegistry) -> (AppState, Arc<MemoryVdagRegistry>, Arc<MemoryQueue>) {
    let registry = Arc::new(registry);
    let queue = Arc::new(MemoryQueue::new());
    let processor = VdagProcessor::new(
        registry.clone(),
        Arc::new(StaticSearchPolicy::new().with_matches("rank:a", &["blk-1"])),
        Arc::new(StaticDiscovery::uniform("10.0.0.5", 6379)),
    );
    let submitter = Submitter::new(Arc::new(MemoryTaskStore::new()), queue.clone(), "INPUTS");

    (AppState { processor: Arc::new(processor), submitter: Arc::new(submitter) }, registry, queue)
}

#[tokio::test]
async fn validate_graph_returns_head_tail_and_adjacency() {
    let (state, _, _) = state(MemoryVdagRegistry::new());

    let (status, Json(body)) = handlers::dry_run_validate_graph(State(state), Json(VdagDto::from(&pipeline()))).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.success);
    let data = body.data.unwrap();
    assert_eq!(data["head"], json!("blk-1"));
    assert_eq!(data["tail"], json!(["blk-2"]));
    assert_eq!(data["graph"], json!({"blk-1": ["blk-2"], "blk-2": []}));
}

#[tokio::test]
async fn end_to_end_dry_run_reports_the_full_plan() {
    let (state, registry, _) = state(MemoryVdagRegistry::new());

    let (status, Json(body)) = handlers::dry_run_end_to_end(State(state), Json(VdagDto::from(&pipeline()))).await;

    assert_eq!(status, StatusCode::OK);
    let data = body.data.unwrap();
    assert_eq!(data["nodesAssignmentInfo"], json!({"A": "blk-1", "B": "blk-2"}));
    assert_eq!(data["graph"]["rev_mapping"], json!({"blk-1": "A", "blk-2": "B"}));
    assert_eq!(data["graph"]["connections_graph"]["blk-1"]["outputs"][0]["queue_name"], json!("blk-2_inputs"));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn end_to_end_dry_run_on_assigned_vdag_is_a_conflict() {
    let mut existing = pipeline();
    existing.status = VdagStatus::Assigned;
    let (state, _, _) = state(MemoryVdagRegistry::new().with_vdag(existing));

    let (status, Json(body)) = handlers::dry_run_end_to_end(State(state), Json(VdagDto::from(&pipeline()))).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(!body.success);
    assert_eq!(body.kind.as_deref(), Some("conflict_error"));
}

#[tokio::test]
async fn assignment_dry_run_maps_labels_to_blocks() {
    let vdag = VdagObject::new(
        "searched",
        "1.0",
        "stable",
        vec![NodeObject::block("A", Some(PolicyRule::new("rank:a", json!({})))), NodeObject::manual("B", "blk-2")],
        LogicalGraph::new(vec![Connection::new("B", &["A"])]),
    );
    let (state, _, _) = state(MemoryVdagRegistry::new());

    let (status, Json(body)) = handlers::dry_run_assignment(State(state), Json(VdagDto::from(&vdag))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.data.unwrap(), json!({"A": "blk-1", "B": "blk-2"}));
}

#[tokio::test]
async fn unmatched_policy_is_unprocessable() {
    let vdag = VdagObject::new(
        "searched",
        "1.0",
        "stable",
        vec![NodeObject::block("A", Some(PolicyRule::new("rank:none", json!({}))))],
        LogicalGraph::new(vec![]),
    );
    let (state, _, _) = state(MemoryVdagRegistry::new());

    let (status, Json(body)) = handlers::dry_run_assignment(State(state), Json(VdagDto::from(&vdag))).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body.kind.as_deref(), Some("assignment_error"));
}

#[tokio::test]
async fn submit_task_returns_uri_and_task_id() {
    let (state, _, queue) = state(MemoryVdagRegistry::new());

    let (status, Json(body)) = handlers::submit_task(State(state), Json(VdagDto::from(&pipeline()))).await;

    assert_eq!(status, StatusCode::OK);
    let data = body.data.unwrap();
    assert_eq!(data["vdagURI"], json!("pipeline:1.0-stable"));
    assert!(data["task_id"].as_str().is_some_and(|id| !id.is_empty()));
    assert_eq!(queue.len("INPUTS"), 1);
}

#[tokio::test]
async fn submit_task_without_name_is_a_bad_request() {
    let (state, _, queue) = state(MemoryVdagRegistry::new());
    let mut dto = VdagDto::from(&pipeline());
    dto.vdag_name = String::new();

    let (status, Json(body)) = handlers::submit_task(State(state), Json(dto)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.kind.as_deref(), Some("validation_error"));
    assert_eq!(queue.len("INPUTS"), 0);
}
