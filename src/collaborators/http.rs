//! reqwest clients for the registries, the search server, discovery and the
//! policy executor. All of them speak the `{success, data | error}` envelope.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

use crate::api::response_dto::ApiResponseDto;
use crate::api::task_dto::{GlobalTaskDto, TaskUpdateDto};
use crate::api::vdag_dto::VdagDto;
use crate::collaborators::{
    DiscoveryService, PolicyEvaluator, PolicyLoader, SearchMatch, SearchPolicy, TaskStore, VdagRegistry,
};
use crate::domain::compiler::block_graph::Adjacency;
use crate::domain::compiler::physical_graph::PhysicalGraph;
use crate::domain::task::global_task::{GlobalTask, TaskUpdate};
use crate::domain::utils::id::{TaskId, VdagUri};
use crate::domain::vdag::node::PolicyRule;
use crate::domain::vdag::vdag::VdagObject;
use crate::error::{Error, Result};

pub fn build_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder().timeout(timeout).build()?)
}

async fn read_envelope(response: Response) -> Result<ApiResponseDto> {
    let status = response.status();
    let body = response.text().await?;

    serde_json::from_str::<ApiResponseDto>(&body)
        .map_err(|_| Error::Transport(format!("unexpected response (HTTP {}): {}", status, body)))
}

/// `data` of a successful envelope, the remote error message otherwise.
async fn read_data(response: Response) -> Result<Value> {
    let envelope = read_envelope(response).await?;
    if envelope.success {
        Ok(envelope.data.unwrap_or(Value::Null))
    } else {
        Err(Error::Transport(envelope.error_message()))
    }
}

async fn read_typed<T: DeserializeOwned>(response: Response) -> Result<T> {
    let data = read_data(response).await?;
    Ok(serde_json::from_value(data)?)
}

pub struct HttpVdagRegistry {
    client: Client,
    base_url: String,
}

impl HttpVdagRegistry {
    pub fn new(client: Client, base_url: &str) -> Self {
        HttpVdagRegistry { client, base_url: base_url.trim_end_matches('/').to_string() }
    }

    fn vdag_url(&self, uri: &VdagUri) -> String {
        format!("{}/vdag/{}", self.base_url, uri)
    }
}

#[async_trait]
impl VdagRegistry for HttpVdagRegistry {
    async fn get_vdag(&self, uri: &VdagUri) -> Result<Option<VdagObject>> {
        let response = self.client.get(self.vdag_url(uri)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let dto: VdagDto = read_typed(response).await?;
        Ok(Some(VdagObject::try_from(dto)?))
    }

    async fn create_vdag(&self, vdag: &VdagObject) -> Result<()> {
        let url = format!("{}/vdag", self.base_url);
        let response = self.client.post(url).json(&VdagDto::from(vdag)).send().await?;
        read_data(response).await.map(|_| ())
    }

    async fn update_vdag(&self, uri: &VdagUri, vdag: &VdagObject) -> Result<()> {
        let response = self.client.put(self.vdag_url(uri)).json(&VdagDto::from(vdag)).send().await?;
        read_data(response).await.map(|_| ())
    }

    async fn delete_vdag(&self, uri: &VdagUri) -> Result<()> {
        let response = self.client.delete(self.vdag_url(uri)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("vDAG {}", uri)));
        }
        read_data(response).await.map(|_| ())
    }

    async fn query_vdags(&self, query: &Value) -> Result<Vec<VdagObject>> {
        let url = format!("{}/vdags", self.base_url);
        let response = self.client.post(url).json(query).send().await?;

        let dtos: Vec<VdagDto> = read_typed(response).await?;
        dtos.into_iter().map(VdagObject::try_from).collect()
    }
}

pub struct HttpSearchPolicy {
    client: Client,
    base_url: String,
}

impl HttpSearchPolicy {
    pub fn new(client: Client, base_url: &str) -> Self {
        HttpSearchPolicy { client, base_url: base_url.trim_end_matches('/').to_string() }
    }
}

#[async_trait]
impl SearchPolicy for HttpSearchPolicy {
    async fn similarity_search(&self, rule: &PolicyRule) -> Result<Vec<SearchMatch>> {
        let url = format!("{}/api/no-ir/similarity-search", self.base_url);
        let body = json!({"rankingPolicyRule": rule});

        let response = self.client.post(url).json(&body).send().await?;
        let data = read_data(response).await?;

        // the search server answers with a bare list or a single match
        let matches = match data {
            Value::Array(_) => serde_json::from_value(data)?,
            Value::Null => Vec::new(),
            single => vec![serde_json::from_value(single)?],
        };
        Ok(matches)
    }
}

pub struct HttpDiscovery {
    client: Client,
    base_url: String,
}

impl HttpDiscovery {
    pub fn new(client: Client, base_url: &str) -> Self {
        HttpDiscovery { client, base_url: base_url.trim_end_matches('/').to_string() }
    }
}

#[async_trait]
impl DiscoveryService for HttpDiscovery {
    async fn resolve_graph(&self, block_graph: &Adjacency) -> Result<PhysicalGraph> {
        let url = format!("{}/discovery/resolve_graph", self.base_url);
        let response = self.client.post(url).json(block_graph).send().await?;

        let envelope = read_envelope(response).await?;
        if !envelope.success {
            return Err(Error::Transport(format!("graph resolution failed: {}", envelope.error_message())));
        }

        let graph = envelope.graph.or(envelope.data).unwrap_or(Value::Null);
        if graph.is_null() {
            return Err(Error::Transport("discovery returned no graph".to_string()));
        }
        Ok(serde_json::from_value(graph)?)
    }
}

pub struct HttpTaskStore {
    client: Client,
    base_url: String,
}

impl HttpTaskStore {
    pub fn new(client: Client, base_url: &str) -> Self {
        HttpTaskStore { client, base_url: base_url.trim_end_matches('/').to_string() }
    }
}

#[async_trait]
impl TaskStore for HttpTaskStore {
    async fn create_task(&self, task_type: &str, task_data: &Value) -> Result<TaskId> {
        let url = format!("{}/task", self.base_url);
        let body = json!({"task_type": task_type, "task_data": task_data, "task_status": "pending"});

        let response = self.client.post(url).json(&body).send().await?;
        let data = read_data(response).await?;

        data.get("task_id")
            .and_then(Value::as_str)
            .map(TaskId::new)
            .ok_or_else(|| Error::Transport("task store did not return a task_id".to_string()))
    }

    async fn update_task(&self, update: &TaskUpdate) -> Result<()> {
        let url = format!("{}/task_update", self.base_url);
        let response = self.client.post(url).json(&TaskUpdateDto::from(update)).send().await?;
        read_data(response).await.map(|_| ())
    }

    async fn get_task(&self, task_id: &TaskId) -> Result<Option<GlobalTask>> {
        let url = format!("{}/task/{}", self.base_url, task_id);
        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let dto: GlobalTaskDto = read_typed(response).await?;
        Ok(Some(GlobalTask::try_from(dto)?))
    }
}

/// A policy rule evaluated by the remote policy executor.
pub struct RemotePolicy {
    client: Client,
    base_url: String,
    rule: PolicyRule,
}

#[async_trait]
impl PolicyEvaluator for RemotePolicy {
    async fn evaluate(&self, input: Value) -> Result<Value> {
        let url = format!("{}/evaluatePolicyRule", self.base_url);
        let body = json!({
            "policy_rule_id": self.rule.policy_rule_uri,
            "policy_rule_inputs": input,
            "policy_rule_parameters": self.rule.parameters,
        });

        let response = self.client.post(url).json(&body).send().await?;
        read_data(response).await.map_err(|e| match e {
            Error::Transport(msg) => Error::Policy(format!("{}: {}", self.rule.policy_rule_uri, msg)),
            other => other,
        })
    }
}

pub struct RemotePolicyLoader {
    client: Client,
    base_url: String,
}

impl RemotePolicyLoader {
    pub fn new(client: Client, base_url: &str) -> Self {
        RemotePolicyLoader { client, base_url: base_url.trim_end_matches('/').to_string() }
    }
}

#[async_trait]
impl PolicyLoader for RemotePolicyLoader {
    async fn load(&self, rule: &PolicyRule) -> Result<Arc<dyn PolicyEvaluator>> {
        if rule.policy_rule_uri.is_empty() {
            return Err(Error::Policy("policy rule without policyRuleURI".to_string()));
        }
        Ok(Arc::new(RemotePolicy { client: self.client.clone(), base_url: self.base_url.clone(), rule: rule.clone() }))
    }
}
