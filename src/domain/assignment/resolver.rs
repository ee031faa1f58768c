use std::sync::Arc;

use crate::collaborators::SearchPolicy;
use crate::domain::vdag::node::{NodeObject, NodeTarget};
use crate::domain::vdag::vdag::{AssignmentInfo, VdagObject};
use crate::error::{Error, Result};

/// Maps node labels to concrete blocks or sub-vDAG references.
pub struct AssignmentResolver {
    search: Arc<dyn SearchPolicy>,
}

impl AssignmentResolver {
    pub fn new(search: Arc<dyn SearchPolicy>) -> Self {
        AssignmentResolver { search }
    }

    /// Resolves every node in declaration order and stops at the first
    /// failure; a partial assignment is never returned.
    pub async fn resolve(&self, vdag: &VdagObject) -> Result<AssignmentInfo> {
        let vdag_uri = vdag.uri_string();
        let mut assignment = AssignmentInfo::new();

        for node in &vdag.nodes {
            let target = self.resolve_node(&vdag_uri, node).await?;
            log::debug!("vDAG '{}': node '{}' resolved to {}.", vdag_uri, node.label, target);
            assignment.insert(node.label.clone(), target);
        }

        Ok(assignment)
    }

    async fn resolve_node(&self, vdag_uri: &str, node: &NodeObject) -> Result<NodeTarget> {
        if let Some(block) = &node.manual_block_id {
            return Ok(NodeTarget::Block(block.clone()));
        }

        if !node.node_type.is_block() {
            return node.vdag_uri.clone().map(NodeTarget::SubVdag).ok_or_else(|| {
                Error::Validation(format!("node '{}' is of type vdag but has no vdagURI", node.label))
            });
        }

        let assignment_error = |reason: String| Error::Assignment {
            node: node.label.to_string(),
            vdag: vdag_uri.to_string(),
            reason,
        };

        let rule = node
            .assignment_policy
            .as_ref()
            .filter(|rule| !rule.policy_rule_uri.is_empty())
            .ok_or_else(|| assignment_error("no assignmentPolicyRule and no manualBlockId".to_string()))?;

        let matches = self.search.similarity_search(rule).await.map_err(|e| match e {
            Error::Transport(msg) => Error::Transport(format!("search for node '{}' failed: {}", node.label, msg)),
            other => assignment_error(format!("search policy {} failed: {}", rule.policy_rule_uri, other)),
        })?;

        match matches.as_slice() {
            [only] => Ok(NodeTarget::Block(only.id.clone())),
            [] => Err(assignment_error(format!("policy {} matched no block", rule.policy_rule_uri))),
            many => Err(assignment_error(format!(
                "policy {} matched {} blocks, exactly one is required",
                rule.policy_rule_uri,
                many.len()
            ))),
        }
    }
}
