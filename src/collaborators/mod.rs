//! Seams to the services the compiler and the blocks talk to. Every trait
//! has an HTTP client in [`http`] and an in-process implementation in
//! [`in_memory`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::domain::compiler::block_graph::Adjacency;
use crate::domain::compiler::physical_graph::PhysicalGraph;
use crate::domain::task::global_task::{GlobalTask, TaskUpdate};
use crate::domain::utils::id::{BlockId, TaskId, VdagUri};
use crate::domain::vdag::node::PolicyRule;
use crate::domain::vdag::vdag::VdagObject;
use crate::error::{Error, Result};

pub mod callback;
pub mod http;
pub mod in_memory;

/// A ranked match returned by the search server.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SearchMatch {
    pub id: BlockId,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SearchMatch {
    pub fn new(id: &str) -> Self {
        SearchMatch { id: BlockId::new(id), extra: Map::new() }
    }
}

#[async_trait]
pub trait SearchPolicy: Send + Sync {
    async fn similarity_search(&self, rule: &PolicyRule) -> Result<Vec<SearchMatch>>;
}

#[async_trait]
pub trait VdagRegistry: Send + Sync {
    async fn get_vdag(&self, uri: &VdagUri) -> Result<Option<VdagObject>>;

    async fn create_vdag(&self, vdag: &VdagObject) -> Result<()>;

    async fn update_vdag(&self, uri: &VdagUri, vdag: &VdagObject) -> Result<()>;

    async fn delete_vdag(&self, uri: &VdagUri) -> Result<()>;

    async fn query_vdags(&self, query: &Value) -> Result<Vec<VdagObject>>;

    /// Clears the way for compiling `uri`: fails with `Conflict` while a
    /// stored copy is `assigned`/`active`, otherwise drops the stored copy.
    ///
    /// The default is a plain read followed by a delete. Two submitters can
    /// both pass the read; stores with a conditional update override this.
    async fn claim_for_compilation(&self, uri: &VdagUri) -> Result<()> {
        if let Some(existing) = self.get_vdag(uri).await? {
            if !existing.status.allows_resubmission() {
                return Err(Error::Conflict { vdag: uri.to_string(), status: existing.status.to_string() });
            }
            self.delete_vdag(uri).await?;
        }
        Ok(())
    }

    /// Gives up a claim without persisting anything.
    async fn release_claim(&self, _uri: &VdagUri) {}
}

#[async_trait]
pub trait DiscoveryService: Send + Sync {
    /// Resolves every block of the graph to its running instance's address.
    async fn resolve_graph(&self, block_graph: &Adjacency) -> Result<PhysicalGraph>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create_task(&self, task_type: &str, task_data: &Value) -> Result<TaskId>;

    async fn update_task(&self, update: &TaskUpdate) -> Result<()>;

    async fn get_task(&self, task_id: &TaskId) -> Result<Option<GlobalTask>>;
}

/// An executable policy rule: JSON in, JSON out.
#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    async fn evaluate(&self, input: Value) -> Result<Value>;
}

/// Turns a policy rule reference into something that can be evaluated.
#[async_trait]
pub trait PolicyLoader: Send + Sync {
    async fn load(&self, rule: &PolicyRule) -> Result<Arc<dyn PolicyEvaluator>>;
}
