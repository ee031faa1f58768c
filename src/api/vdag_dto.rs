use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::domain::compiler::physical_graph::PhysicalGraph;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct VdagVersionDto {
    #[serde(default)]
    pub version: String,
    #[serde(rename = "release-tag", default)]
    pub release_tag: String,
}

/// A vDAG document as exchanged with the API and stored in the vDAG registry.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct VdagDto {
    #[serde(default)]
    pub vdag_name: String,
    #[serde(default)]
    pub vdag_version: VdagVersionDto,
    /// Derived from name and version; ignored on input.
    #[serde(rename = "vdagURI", default)]
    pub vdag_uri: String,
    #[serde(rename = "discoveryTags", default)]
    pub discovery_tags: Vec<String>,
    #[serde(default)]
    pub controller: Value,
    #[serde(default)]
    pub nodes: Vec<NodeDto>,
    #[serde(default)]
    pub graph: GraphDto,
    /// nodeLabel -> block id, or `vdag:::<uri>` for a sub-vDAG.
    #[serde(default)]
    pub assignment_info: BTreeMap<String, String>,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub compiled_graph_data: Option<CompiledGraphDataDto>,
}

fn default_status() -> String {
    "pending".to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct NodeDto {
    #[serde(rename = "nodeLabel", default)]
    pub node_label: String,
    #[serde(rename = "nodeType", default)]
    pub node_type: String,
    #[serde(rename = "vdagURI", default)]
    pub vdag_uri: String,
    #[serde(rename = "assignmentPolicyRule", default)]
    pub assignment_policy_rule: Map<String, Value>,
    #[serde(rename = "preprocessingPolicyRule", default)]
    pub preprocessing_policy_rule: Map<String, Value>,
    #[serde(rename = "postprocessingPolicyRule", default)]
    pub postprocessing_policy_rule: Map<String, Value>,
    #[serde(rename = "modelParameters", default)]
    pub model_parameters: Map<String, Value>,
    #[serde(rename = "outputProtocol", default)]
    pub output_protocol: Map<String, Value>,
    #[serde(rename = "inputProtocol", default)]
    pub input_protocol: Map<String, Value>,
    #[serde(rename = "IOMap", default)]
    pub io_map: Vec<Value>,
    #[serde(rename = "manualBlockId", default)]
    pub manual_block_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct GraphDto {
    #[serde(default)]
    pub connections: Vec<ConnectionDto>,
    /// Any further graph keys are carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ConnectionDto {
    #[serde(rename = "nodeLabel")]
    pub node_label: String,
    #[serde(default)]
    pub inputs: Vec<InputRefDto>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct InputRefDto {
    #[serde(rename = "nodeLabel")]
    pub node_label: String,
}

/// Persisted compiler output. `t2_graph` is the block graph, `t3_graph` the
/// host/port/queue addressed graph.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct CompiledGraphDataDto {
    pub head: String,
    #[serde(default)]
    pub tail: Vec<String>,
    #[serde(default)]
    pub t2_graph: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub t3_graph: Option<PhysicalGraph>,
    #[serde(default)]
    pub rev_mapping: BTreeMap<String, String>,
}
