//! In-process collaborators for tests, dry runs and single-process setups.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::collaborators::{
    DiscoveryService, PolicyEvaluator, PolicyLoader, SearchMatch, SearchPolicy, TaskStore, VdagRegistry,
};
use crate::domain::compiler::block_graph::Adjacency;
use crate::domain::compiler::physical_graph::{Destination, PhysicalGraph};
use crate::domain::task::global_task::{GlobalTask, TaskUpdate};
use crate::domain::utils::id::{TaskId, VdagUri};
use crate::domain::vdag::node::PolicyRule;
use crate::domain::vdag::vdag::VdagObject;
use crate::error::{Error, Result};

fn poisoned<T>(_: T) -> Error {
    Error::Transport("in-memory store lock poisoned".to_string())
}

#[derive(Default)]
struct RegistryState {
    vdags: HashMap<VdagUri, VdagObject>,
    claimed: HashSet<VdagUri>,
}

/// vDAG registry whose claim is a real compare-and-set: the status check,
/// the delete and the in-flight mark happen under one lock.
#[derive(Default)]
pub struct MemoryVdagRegistry {
    state: Mutex<RegistryState>,
    deletes: AtomicUsize,
    lookups: AtomicUsize,
}

impl MemoryVdagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vdag(self, vdag: VdagObject) -> Self {
        if let (Some(uri), Ok(mut state)) = (vdag.uri(), self.state.lock()) {
            state.vdags.insert(uri, vdag);
        }
        self
    }

    pub fn stored(&self, uri: &str) -> Option<VdagObject> {
        self.state.lock().ok().and_then(|state| state.vdags.get(uri).cloned())
    }

    pub fn len(&self) -> usize {
        self.state.lock().map(|state| state.vdags.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Number of `get_vdag` calls served.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VdagRegistry for MemoryVdagRegistry {
    async fn get_vdag(&self, uri: &VdagUri) -> Result<Option<VdagObject>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().map_err(poisoned)?;
        Ok(state.vdags.get(uri).cloned())
    }

    async fn create_vdag(&self, vdag: &VdagObject) -> Result<()> {
        let uri = vdag.require_uri()?;
        let mut state = self.state.lock().map_err(poisoned)?;
        if state.vdags.contains_key(&uri) {
            return Err(Error::Conflict { vdag: uri.to_string(), status: vdag.status.to_string() });
        }
        state.claimed.remove(&uri);
        state.vdags.insert(uri, vdag.clone());
        Ok(())
    }

    async fn update_vdag(&self, uri: &VdagUri, vdag: &VdagObject) -> Result<()> {
        let mut state = self.state.lock().map_err(poisoned)?;
        match state.vdags.get_mut(uri) {
            Some(stored) => {
                *stored = vdag.clone();
                Ok(())
            }
            None => Err(Error::NotFound(format!("vDAG {}", uri))),
        }
    }

    async fn delete_vdag(&self, uri: &VdagUri) -> Result<()> {
        let mut state = self.state.lock().map_err(poisoned)?;
        state.vdags.remove(uri).map(|_| ()).ok_or_else(|| Error::NotFound(format!("vDAG {}", uri)))?;
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Supports `{"status": "..."}` and `{"vdag_name": "..."}`; an empty query matches all.
    async fn query_vdags(&self, query: &Value) -> Result<Vec<VdagObject>> {
        let state = self.state.lock().map_err(poisoned)?;
        let status = query.get("status").and_then(Value::as_str);
        let name = query.get("vdag_name").and_then(Value::as_str);

        Ok(state
            .vdags
            .values()
            .filter(|v| status.is_none_or(|s| v.status.as_str() == s))
            .filter(|v| name.is_none_or(|n| v.name == n))
            .cloned()
            .collect())
    }

    async fn claim_for_compilation(&self, uri: &VdagUri) -> Result<()> {
        let mut state = self.state.lock().map_err(poisoned)?;

        if state.claimed.contains(uri) {
            return Err(Error::Conflict { vdag: uri.to_string(), status: "compiling".to_string() });
        }
        if let Some(existing) = state.vdags.get(uri) {
            if !existing.status.allows_resubmission() {
                return Err(Error::Conflict { vdag: uri.to_string(), status: existing.status.to_string() });
            }
            state.vdags.remove(uri);
            self.deletes.fetch_add(1, Ordering::SeqCst);
        }
        state.claimed.insert(uri.clone());
        Ok(())
    }

    async fn release_claim(&self, uri: &VdagUri) {
        if let Ok(mut state) = self.state.lock() {
            state.claimed.remove(uri);
        }
    }
}

/// Answers searches from a fixed table keyed by policy rule URI. Unknown
/// rules match nothing.
#[derive(Default)]
pub struct StaticSearchPolicy {
    results: HashMap<String, Vec<SearchMatch>>,
    calls: AtomicUsize,
}

impl StaticSearchPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_matches(mut self, rule_uri: &str, block_ids: &[&str]) -> Self {
        self.results.insert(rule_uri.to_string(), block_ids.iter().map(|id| SearchMatch::new(id)).collect());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchPolicy for StaticSearchPolicy {
    async fn similarity_search(&self, rule: &PolicyRule) -> Result<Vec<SearchMatch>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.results.get(&rule.policy_rule_uri).cloned().unwrap_or_default())
    }
}

/// Discovery over a fixed block -> `(host, port)` table. Each successor is
/// addressed at its `<block>_inputs` queue. Blocks without an address are
/// left out of the result.
#[derive(Default)]
pub struct StaticDiscovery {
    addresses: HashMap<String, (String, u16)>,
    fallback: Option<(String, u16)>,
}

impl StaticDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every block is served from `host:port`.
    pub fn uniform(host: &str, port: u16) -> Self {
        StaticDiscovery { addresses: HashMap::new(), fallback: Some((host.to_string(), port)) }
    }

    pub fn with_block(mut self, block_id: &str, host: &str, port: u16) -> Self {
        self.addresses.insert(block_id.to_string(), (host.to_string(), port));
        self
    }

    fn address(&self, block_id: &str) -> Option<&(String, u16)> {
        self.addresses.get(block_id).or(self.fallback.as_ref())
    }
}

#[async_trait]
impl DiscoveryService for StaticDiscovery {
    async fn resolve_graph(&self, block_graph: &Adjacency) -> Result<PhysicalGraph> {
        let mut graph = PhysicalGraph::new();

        for (block, successors) in block_graph {
            if self.address(block.as_str()).is_none() {
                continue;
            }

            let mut outputs = Vec::with_capacity(successors.len());
            for next in successors {
                let (host, port) = self
                    .address(next.as_str())
                    .ok_or_else(|| Error::NotFound(format!("no running instance of block {}", next)))?;
                outputs.push(Destination {
                    block_id: Some(next.to_string()),
                    ..Destination::new(host, *port, &format!("{}_inputs", next))
                });
            }
            graph.insert(block, outputs);
        }

        Ok(graph)
    }
}

/// Task store backed by a map; ids are random UUIDs.
#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: Mutex<HashMap<TaskId, GlobalTask>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task(&self, task_id: &str) -> Option<GlobalTask> {
        self.tasks.lock().ok().and_then(|tasks| tasks.get(task_id).cloned())
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn create_task(&self, task_type: &str, task_data: &Value) -> Result<TaskId> {
        let task_id = TaskId::new(uuid::Uuid::new_v4().to_string());
        let task = GlobalTask::pending(task_id.clone(), task_type, task_data.clone(), chrono::Utc::now().timestamp());

        self.tasks.lock().map_err(poisoned)?.insert(task_id.clone(), task);
        Ok(task_id)
    }

    async fn update_task(&self, update: &TaskUpdate) -> Result<()> {
        let mut tasks = self.tasks.lock().map_err(poisoned)?;
        let task = tasks.get_mut(&update.task_id).ok_or_else(|| Error::NotFound(format!("task {}", update.task_id)))?;
        task.apply(update, chrono::Utc::now().timestamp());
        Ok(())
    }

    async fn get_task(&self, task_id: &TaskId) -> Result<Option<GlobalTask>> {
        Ok(self.tasks.lock().map_err(poisoned)?.get(task_id).cloned())
    }
}

type PolicyFn = dyn Fn(Value) -> Result<Value> + Send + Sync;

/// A policy implemented by a plain closure.
pub struct FnPolicy {
    func: Box<PolicyFn>,
}

impl FnPolicy {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        FnPolicy { func: Box::new(func) }
    }
}

#[async_trait]
impl PolicyEvaluator for FnPolicy {
    async fn evaluate(&self, input: Value) -> Result<Value> {
        (self.func)(input)
    }
}

/// Hands out registered policies by rule URI and counts loads.
#[derive(Default)]
pub struct FnPolicyLoader {
    policies: HashMap<String, Arc<dyn PolicyEvaluator>>,
    loads: AtomicUsize,
}

impl FnPolicyLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy<F>(mut self, rule_uri: &str, func: F) -> Self
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.policies.insert(rule_uri.to_string(), Arc::new(FnPolicy::new(func)));
        self
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PolicyLoader for FnPolicyLoader {
    async fn load(&self, rule: &PolicyRule) -> Result<Arc<dyn PolicyEvaluator>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.policies
            .get(&rule.policy_rule_uri)
            .cloned()
            .ok_or_else(|| Error::Policy(format!("unknown policy rule {}", rule.policy_rule_uri)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::utils::id::BlockId;
    use crate::domain::vdag::graph::LogicalGraph;
    use crate::domain::vdag::vdag::VdagStatus;

    fn stored(status: VdagStatus) -> VdagObject {
        let mut vdag = VdagObject::new("p", "1", "a", vec![], LogicalGraph::default());
        vdag.status = status;
        vdag
    }

    #[tokio::test]
    async fn claim_is_exclusive_until_the_vdag_is_persisted() {
        let registry = MemoryVdagRegistry::new().with_vdag(stored(VdagStatus::Failed));
        let uri = VdagUri::new("p:1-a");

        registry.claim_for_compilation(&uri).await.unwrap();
        assert!(registry.is_empty());
        assert!(matches!(registry.claim_for_compilation(&uri).await, Err(Error::Conflict { .. })));

        registry.create_vdag(&stored(VdagStatus::Assigned)).await.unwrap();
        assert!(matches!(
            registry.claim_for_compilation(&uri).await,
            Err(Error::Conflict { ref status, .. }) if status == "assigned"
        ));
    }

    #[tokio::test]
    async fn discovery_addresses_successor_input_queues() {
        let discovery = StaticDiscovery::new().with_block("blk-1", "10.0.0.1", 6379).with_block("blk-2", "10.0.0.2", 6380);
        let mut adjacency = Adjacency::new();
        adjacency.insert(BlockId::new("blk-1"), vec![BlockId::new("blk-2")]);
        adjacency.insert(BlockId::new("blk-2"), vec![]);

        let graph = discovery.resolve_graph(&adjacency).await.unwrap();

        let out = &graph.get("blk-1").unwrap().outputs[0];
        assert_eq!((out.host.as_str(), out.port, out.queue_name.as_str()), ("10.0.0.2", 6380, "blk-2_inputs"));
        assert!(graph.get("blk-2").unwrap().outputs.is_empty());
    }
}
