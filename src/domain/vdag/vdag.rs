use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::api::vdag_dto::{VdagDto, VdagVersionDto};
use crate::domain::compiler::compiled::CompiledGraph;
use crate::domain::utils::id::{NodeLabel, VdagUri};
use crate::domain::vdag::graph::LogicalGraph;
use crate::domain::vdag::node::{NodeObject, NodeTarget, NodeType};
use crate::error::{Error, Result};

/// Resolved target for every node label of a vDAG.
pub type AssignmentInfo = BTreeMap<NodeLabel, NodeTarget>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VdagStatus {
    Pending,
    Assigned,
    Failed,
    Active,
}

impl VdagStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VdagStatus::Pending => "pending",
            VdagStatus::Assigned => "assigned",
            VdagStatus::Failed => "failed",
            VdagStatus::Active => "active",
        }
    }

    /// Only `pending` and `failed` vDAGs may be replaced by a new submission.
    pub fn allows_resubmission(&self) -> bool {
        matches!(self, VdagStatus::Pending | VdagStatus::Failed)
    }
}

impl fmt::Display for VdagStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VdagStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(VdagStatus::Pending),
            "assigned" => Ok(VdagStatus::Assigned),
            "failed" => Ok(VdagStatus::Failed),
            "active" => Ok(VdagStatus::Active),
            other => Err(Error::Validation(format!("unknown vDAG status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct VdagVersion {
    pub version: String,
    pub release_tag: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VdagObject {
    pub name: String,
    pub version: VdagVersion,
    pub discovery_tags: Vec<String>,
    pub controller: Value,
    pub nodes: Vec<NodeObject>,
    pub graph: LogicalGraph,
    pub status: VdagStatus,
    pub assignment_info: AssignmentInfo,
    pub compiled_graph: Option<CompiledGraph>,
}

impl VdagObject {
    pub fn new(name: &str, version: &str, release_tag: &str, nodes: Vec<NodeObject>, graph: LogicalGraph) -> Self {
        VdagObject {
            name: name.to_string(),
            version: VdagVersion { version: version.to_string(), release_tag: release_tag.to_string() },
            discovery_tags: Vec::new(),
            controller: Value::Object(Default::default()),
            nodes,
            graph,
            status: VdagStatus::Pending,
            assignment_info: AssignmentInfo::new(),
            compiled_graph: None,
        }
    }

    /// `name:version-release_tag`, or an empty string when any part is missing.
    pub fn derive_uri(name: &str, version: &str, release_tag: &str) -> String {
        if name.is_empty() || version.is_empty() || release_tag.is_empty() {
            return String::new();
        }
        format!("{}:{}-{}", name, version, release_tag)
    }

    pub fn uri_string(&self) -> String {
        Self::derive_uri(&self.name, &self.version.version, &self.version.release_tag)
    }

    pub fn uri(&self) -> Option<VdagUri> {
        let uri = self.uri_string();
        (!uri.is_empty()).then(|| VdagUri::new(uri))
    }

    /// The URI or a validation error; persisting a vDAG needs one.
    pub fn require_uri(&self) -> Result<VdagUri> {
        self.uri().ok_or_else(|| {
            Error::Validation("vdag_name, vdag_version.version and vdag_version.release-tag are required".to_string())
        })
    }

    pub fn node(&self, label: &str) -> Option<&NodeObject> {
        self.nodes.iter().find(|n| n.label.as_str() == label)
    }

    /// Structural checks that need no collaborator.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(Error::Validation("vDAG declares no nodes".to_string()));
        }

        let mut labels: HashSet<&str> = HashSet::new();
        for node in &self.nodes {
            if node.label.is_empty() {
                return Err(Error::Validation("node with empty nodeLabel".to_string()));
            }
            if !labels.insert(node.label.as_str()) {
                return Err(Error::Validation(format!("duplicate node label '{}'", node.label)));
            }

            let is_manual = node.manual_block_id.is_some();
            match node.node_type {
                NodeType::Vdag if !is_manual && node.vdag_uri.is_none() => {
                    return Err(Error::Validation(format!("node '{}' is of type vdag but has no vdagURI", node.label)));
                }
                t if t.is_block() && !is_manual => {
                    let has_rule = node.assignment_policy.as_ref().is_some_and(|p| !p.policy_rule_uri.is_empty());
                    if !has_rule {
                        return Err(Error::Validation(format!(
                            "node '{}' has neither manualBlockId nor an assignmentPolicyRule",
                            node.label
                        )));
                    }
                }
                _ => {}
            }
        }

        self.graph.validate_labels(&labels)
    }
}

impl TryFrom<VdagDto> for VdagObject {
    type Error = Error;

    fn try_from(dto: VdagDto) -> Result<Self> {
        let nodes = dto.nodes.into_iter().map(NodeObject::try_from).collect::<Result<Vec<_>>>()?;

        let assignment_info = dto
            .assignment_info
            .iter()
            .map(|(label, target)| (NodeLabel::new(label.as_str()), NodeTarget::from(target.as_str())))
            .collect();

        let compiled_graph = dto.compiled_graph_data.map(CompiledGraph::try_from).transpose()?;

        Ok(VdagObject {
            name: dto.vdag_name,
            version: VdagVersion { version: dto.vdag_version.version, release_tag: dto.vdag_version.release_tag },
            discovery_tags: dto.discovery_tags,
            controller: dto.controller,
            nodes,
            graph: LogicalGraph::from(dto.graph),
            status: dto.status.parse()?,
            assignment_info,
            compiled_graph,
        })
    }
}

impl From<&VdagObject> for VdagDto {
    fn from(vdag: &VdagObject) -> Self {
        VdagDto {
            vdag_name: vdag.name.clone(),
            vdag_version: VdagVersionDto {
                version: vdag.version.version.clone(),
                release_tag: vdag.version.release_tag.clone(),
            },
            vdag_uri: vdag.uri_string(),
            discovery_tags: vdag.discovery_tags.clone(),
            controller: vdag.controller.clone(),
            nodes: vdag.nodes.iter().map(Into::into).collect(),
            graph: (&vdag.graph).into(),
            assignment_info: vdag.assignment_info.iter().map(|(l, t)| (l.to_string(), t.to_string())).collect(),
            status: vdag.status.as_str().to_string(),
            compiled_graph_data: vdag.compiled_graph.as_ref().map(Into::into),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::vdag::graph::Connection;
    use serde_json::json;

    fn two_node_vdag() -> VdagObject {
        VdagObject::new(
            "pipeline",
            "1.0",
            "stable",
            vec![NodeObject::manual("A", "blk-1"), NodeObject::manual("B", "blk-2")],
            LogicalGraph::new(vec![Connection::new("B", &["A"])]),
        )
    }

    #[test]
    fn uri_is_derived_from_name_and_version() {
        assert_eq!(VdagObject::derive_uri("pipeline", "1.0", "stable"), "pipeline:1.0-stable");
        assert_eq!(VdagObject::derive_uri("pipeline", "", "stable"), "");

        let mut vdag = two_node_vdag();
        assert_eq!(vdag.uri().map(|u| u.to_string()), Some("pipeline:1.0-stable".to_string()));
        vdag.version.release_tag.clear();
        assert!(vdag.uri().is_none());
        assert!(matches!(vdag.require_uri(), Err(Error::Validation(_))));
    }

    #[test]
    fn duplicate_labels_fail_validation() {
        let mut vdag = two_node_vdag();
        vdag.nodes.push(NodeObject::manual("A", "blk-3"));

        assert!(matches!(vdag.validate(), Err(Error::Validation(msg)) if msg.contains("duplicate")));
    }

    #[test]
    fn block_node_without_policy_or_manual_id_fails_validation() {
        let mut vdag = two_node_vdag();
        vdag.nodes[1] = NodeObject::block("B", None);

        assert!(matches!(vdag.validate(), Err(Error::Validation(_))));
        assert!(two_node_vdag().validate().is_ok());
    }

    #[test]
    fn dto_round_trip_is_lossless() {
        let raw = json!({
            "vdag_name": "pipeline",
            "vdag_version": {"version": "1.0", "release-tag": "stable"},
            "vdagURI": "pipeline:1.0-stable",
            "discoveryTags": ["vision"],
            "controller": {"inputSources": [], "initParameters": {}, "initSettings": {}, "policies": []},
            "nodes": [
                {"nodeLabel": "A", "nodeType": "block", "vdagURI": "", "assignmentPolicyRule": {},
                 "preprocessingPolicyRule": {}, "postprocessingPolicyRule": {}, "modelParameters": {},
                 "outputProtocol": {}, "inputProtocol": {}, "IOMap": [], "manualBlockId": "blk-1"},
                {"nodeLabel": "S", "nodeType": "vdag", "vdagURI": "sub:1.0-stable", "assignmentPolicyRule": {},
                 "preprocessingPolicyRule": {}, "postprocessingPolicyRule": {}, "modelParameters": {},
                 "outputProtocol": {}, "inputProtocol": {}, "IOMap": [], "manualBlockId": ""}
            ],
            "graph": {"connections": [{"nodeLabel": "S", "inputs": [{"nodeLabel": "A"}]}]},
            "assignment_info": {"A": "blk-1", "S": "vdag:::sub:1.0-stable"},
            "status": "assigned",
            "compiled_graph_data": null
        });

        let dto: VdagDto = serde_json::from_value(raw.clone()).unwrap();
        let vdag = VdagObject::try_from(dto).unwrap();

        assert_eq!(vdag.status, VdagStatus::Assigned);
        assert_eq!(
            vdag.assignment_info.get("S"),
            Some(&NodeTarget::SubVdag(VdagUri::new("sub:1.0-stable")))
        );

        let back = serde_json::to_value(VdagDto::from(&vdag)).unwrap();
        assert_eq!(back, raw);
    }
}
