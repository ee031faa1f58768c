use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::api::vdag_dto::NodeDto;
use crate::domain::utils::id::{BlockId, Id, NodeLabel, VdagUri};
use crate::error::{Error, Result};

/// Wire prefix marking a sub-vDAG reference in `assignment_info`.
pub const SUB_VDAG_PREFIX: &str = "vdag:::";

/// `Unspecified` and `Block` both denote a block node; the distinction is
/// kept so documents round-trip unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Unspecified,
    Block,
    Vdag,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Unspecified => "",
            NodeType::Block => "block",
            NodeType::Vdag => "vdag",
        }
    }

    pub fn is_block(&self) -> bool {
        matches!(self, NodeType::Unspecified | NodeType::Block)
    }
}

impl FromStr for NodeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" => Ok(NodeType::Unspecified),
            "block" => Ok(NodeType::Block),
            "vdag" => Ok(NodeType::Vdag),
            other => Err(Error::Validation(format!("unknown nodeType '{}'", other))),
        }
    }
}

/// Reference to a policy rule plus the parameters it is evaluated with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    #[serde(rename = "policyRuleURI", default)]
    pub policy_rule_uri: String,
    #[serde(default)]
    pub parameters: Value,
}

impl PolicyRule {
    pub fn new(policy_rule_uri: impl Into<String>, parameters: Value) -> Self {
        PolicyRule { policy_rule_uri: policy_rule_uri.into(), parameters }
    }

    /// An empty object means "no policy".
    fn from_map(map: &Map<String, Value>) -> Result<Option<Self>> {
        if map.is_empty() {
            return Ok(None);
        }
        let rule: PolicyRule = serde_json::from_value(Value::Object(map.clone()))?;
        Ok(Some(rule))
    }

    fn to_map(rule: &Option<PolicyRule>) -> Map<String, Value> {
        let mut map = Map::new();
        if let Some(rule) = rule {
            map.insert("policyRuleURI".to_string(), Value::String(rule.policy_rule_uri.clone()));
            map.insert("parameters".to_string(), rule.parameters.clone());
        }
        map
    }
}

/// What a node label resolves to after assignment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeTarget {
    Block(BlockId),
    SubVdag(VdagUri),
}

impl NodeTarget {
    pub fn as_block(&self) -> Option<&BlockId> {
        match self {
            NodeTarget::Block(id) => Some(id),
            NodeTarget::SubVdag(_) => None,
        }
    }
}

impl fmt::Display for NodeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeTarget::Block(id) => write!(f, "{}", id),
            NodeTarget::SubVdag(uri) => write!(f, "{}{}", SUB_VDAG_PREFIX, uri),
        }
    }
}

impl From<&str> for NodeTarget {
    fn from(raw: &str) -> Self {
        match raw.strip_prefix(SUB_VDAG_PREFIX) {
            Some(uri) => NodeTarget::SubVdag(VdagUri::new(uri)),
            None => NodeTarget::Block(BlockId::new(raw)),
        }
    }
}

impl Serialize for NodeTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for NodeTarget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(NodeTarget::from(raw.as_str()))
    }
}

/// Node fields the compiler never looks at; carried for the blocks and the registry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeExtras {
    pub model_parameters: Map<String, Value>,
    pub output_protocol: Map<String, Value>,
    pub input_protocol: Map<String, Value>,
    pub io_map: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeObject {
    pub label: NodeLabel,
    pub node_type: NodeType,
    pub vdag_uri: Option<VdagUri>,
    pub assignment_policy: Option<PolicyRule>,
    pub preprocessing_policy: Option<PolicyRule>,
    pub postprocessing_policy: Option<PolicyRule>,
    /// Overrides assignment when set.
    pub manual_block_id: Option<BlockId>,
    pub extras: NodeExtras,
}

impl NodeObject {
    /// A block node with a manually pinned block id.
    pub fn manual(label: &str, block_id: &str) -> Self {
        NodeObject { manual_block_id: Some(BlockId::new(block_id)), ..NodeObject::block(label, None) }
    }

    /// A block node resolved through the given ranking policy.
    pub fn block(label: &str, assignment_policy: Option<PolicyRule>) -> Self {
        NodeObject {
            label: NodeLabel::new(label),
            node_type: NodeType::Block,
            vdag_uri: None,
            assignment_policy,
            preprocessing_policy: None,
            postprocessing_policy: None,
            manual_block_id: None,
            extras: NodeExtras::default(),
        }
    }

    /// A node standing for another, already assigned vDAG.
    pub fn sub_vdag(label: &str, vdag_uri: &str) -> Self {
        NodeObject { node_type: NodeType::Vdag, vdag_uri: Some(VdagUri::new(vdag_uri)), ..NodeObject::block(label, None) }
    }
}

fn non_empty<T>(raw: &str) -> Option<Id<T>> {
    (!raw.is_empty()).then(|| Id::new(raw))
}

impl TryFrom<NodeDto> for NodeObject {
    type Error = Error;

    fn try_from(dto: NodeDto) -> Result<Self> {
        Ok(NodeObject {
            label: NodeLabel::new(dto.node_label.as_str()),
            node_type: dto.node_type.parse()?,
            vdag_uri: non_empty(&dto.vdag_uri),
            assignment_policy: PolicyRule::from_map(&dto.assignment_policy_rule)?,
            preprocessing_policy: PolicyRule::from_map(&dto.preprocessing_policy_rule)?,
            postprocessing_policy: PolicyRule::from_map(&dto.postprocessing_policy_rule)?,
            manual_block_id: non_empty(&dto.manual_block_id),
            extras: NodeExtras {
                model_parameters: dto.model_parameters,
                output_protocol: dto.output_protocol,
                input_protocol: dto.input_protocol,
                io_map: dto.io_map,
            },
        })
    }
}

impl From<&NodeObject> for NodeDto {
    fn from(node: &NodeObject) -> Self {
        NodeDto {
            node_label: node.label.to_string(),
            node_type: node.node_type.as_str().to_string(),
            vdag_uri: node.vdag_uri.as_ref().map(|u| u.to_string()).unwrap_or_default(),
            assignment_policy_rule: PolicyRule::to_map(&node.assignment_policy),
            preprocessing_policy_rule: PolicyRule::to_map(&node.preprocessing_policy),
            postprocessing_policy_rule: PolicyRule::to_map(&node.postprocessing_policy),
            model_parameters: node.extras.model_parameters.clone(),
            output_protocol: node.extras.output_protocol.clone(),
            input_protocol: node.extras.input_protocol.clone(),
            io_map: node.extras.io_map.clone(),
            manual_block_id: node.manual_block_id.as_ref().map(|b| b.to_string()).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn node_target_uses_sub_vdag_prefix_on_the_wire() {
        let sub = NodeTarget::from("vdag:::detector:1.0-stable");
        assert_eq!(sub, NodeTarget::SubVdag(VdagUri::new("detector:1.0-stable")));
        assert_eq!(sub.to_string(), "vdag:::detector:1.0-stable");

        let block = NodeTarget::from("blk-1");
        assert_eq!(block.as_block().map(|b| b.as_str()), Some("blk-1"));
        assert_eq!(serde_json::to_value(&sub).unwrap(), json!("vdag:::detector:1.0-stable"));
    }

    #[test]
    fn unknown_node_type_is_rejected() {
        let dto = NodeDto { node_label: "A".to_string(), node_type: "pipeline".to_string(), ..Default::default() };
        assert!(matches!(NodeObject::try_from(dto), Err(Error::Validation(_))));
    }

    #[test]
    fn node_dto_round_trip_is_lossless() {
        let dto: NodeDto = serde_json::from_value(json!({
            "nodeLabel": "detector",
            "nodeType": "",
            "assignmentPolicyRule": {"policyRuleURI": "rank:1.0-stable", "parameters": {"gpu": true}},
            "preprocessingPolicyRule": {},
            "postprocessingPolicyRule": {"policyRuleURI": "post:1.0-stable", "parameters": {}},
            "modelParameters": {"threshold": 0.4},
            "IOMap": [{"from": "a", "to": "b"}],
            "manualBlockId": ""
        }))
        .unwrap();

        let node = NodeObject::try_from(dto.clone()).unwrap();
        assert_eq!(node.node_type, NodeType::Unspecified);
        assert!(node.preprocessing_policy.is_none());
        assert_eq!(node.assignment_policy.as_ref().map(|p| p.policy_rule_uri.as_str()), Some("rank:1.0-stable"));

        assert_eq!(NodeDto::from(&node), dto);
    }
}
