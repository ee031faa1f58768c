use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::compiler::physical_graph::PhysicalGraph;

/// Result of `/dryrun/end-to-end`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EndToEndDto {
    #[serde(rename = "nodesAssignmentInfo")]
    pub nodes_assignment_info: BTreeMap<String, String>,
    pub graph: DryRunGraphDto,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DryRunGraphDto {
    pub head: String,
    pub tail: Vec<String>,
    /// Block graph.
    pub flat_graph: BTreeMap<String, Vec<String>>,
    /// Physical graph.
    pub connections_graph: PhysicalGraph,
    pub rev_mapping: BTreeMap<String, String>,
}

/// Result of `/dryrun/validate-graph`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ValidateGraphDto {
    pub head: String,
    pub tail: Vec<String>,
    pub graph: BTreeMap<String, Vec<String>>,
}
