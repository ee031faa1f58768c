use std::collections::BTreeMap;

use crate::api::vdag_dto::CompiledGraphDataDto;
use crate::domain::compiler::block_graph::{Adjacency, BlockGraph};
use crate::domain::compiler::physical_graph::PhysicalGraph;
use crate::domain::utils::id::{BlockId, NodeLabel};
use crate::domain::vdag::node::NodeTarget;
use crate::domain::vdag::vdag::AssignmentInfo;
use crate::error::{Error, Result};

pub type RevMapping = BTreeMap<NodeTarget, NodeLabel>;

/// Everything the compiler persists on an assigned vDAG.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledGraph {
    pub block_graph: BlockGraph,
    pub physical_graph: PhysicalGraph,
    pub rev_mapping: RevMapping,
}

impl CompiledGraph {
    /// The node label a block plays in this vDAG, if any.
    pub fn label_for_block(&self, block: &BlockId) -> Option<&NodeLabel> {
        self.rev_mapping.get(&NodeTarget::Block(block.clone()))
    }
}

/// Inverts an assignment. Two labels sharing a target would make the
/// inverse lossy, so that is rejected.
pub fn reverse_mapping(mapping: &AssignmentInfo) -> Result<RevMapping> {
    let mut rev = RevMapping::new();
    for (label, target) in mapping {
        if let Some(previous) = rev.insert(target.clone(), label.clone()) {
            return Err(Error::Validation(format!(
                "nodes '{}' and '{}' are both assigned to {}",
                previous, label, target
            )));
        }
    }
    Ok(rev)
}

impl TryFrom<CompiledGraphDataDto> for CompiledGraph {
    type Error = Error;

    fn try_from(dto: CompiledGraphDataDto) -> Result<Self> {
        let adjacency: Adjacency = dto
            .t2_graph
            .into_iter()
            .map(|(block, targets)| (BlockId::new(block), targets.into_iter().map(BlockId::new).collect()))
            .collect();

        Ok(CompiledGraph {
            block_graph: BlockGraph {
                head: BlockId::new(dto.head),
                tail: dto.tail.into_iter().map(BlockId::new).collect(),
                adjacency,
            },
            physical_graph: dto.t3_graph.unwrap_or_default(),
            rev_mapping: dto
                .rev_mapping
                .iter()
                .map(|(target, label)| (NodeTarget::from(target.as_str()), NodeLabel::new(label.as_str())))
                .collect(),
        })
    }
}

impl From<&CompiledGraph> for CompiledGraphDataDto {
    fn from(compiled: &CompiledGraph) -> Self {
        let graph = &compiled.block_graph;
        CompiledGraphDataDto {
            head: graph.head.to_string(),
            tail: graph.tail.iter().map(|b| b.to_string()).collect(),
            t2_graph: graph
                .adjacency
                .iter()
                .map(|(block, targets)| (block.to_string(), targets.iter().map(|t| t.to_string()).collect()))
                .collect(),
            t3_graph: Some(compiled.physical_graph.clone()),
            rev_mapping: compiled.rev_mapping.iter().map(|(t, l)| (t.to_string(), l.to_string())).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::compiler::physical_graph::Destination;
    use crate::domain::utils::id::VdagUri;

    #[test]
    fn rev_mapping_is_the_inverse_of_the_assignment() {
        let mut mapping = AssignmentInfo::new();
        mapping.insert(NodeLabel::new("A"), NodeTarget::Block(BlockId::new("blk-1")));
        mapping.insert(NodeLabel::new("S"), NodeTarget::SubVdag(VdagUri::new("inner:1-a")));

        let rev = reverse_mapping(&mapping).unwrap();

        assert_eq!(rev.len(), mapping.len());
        for (label, target) in &mapping {
            assert_eq!(rev.get(target), Some(label));
        }
    }

    #[test]
    fn shared_target_is_rejected() {
        let mut mapping = AssignmentInfo::new();
        mapping.insert(NodeLabel::new("A"), NodeTarget::Block(BlockId::new("blk-1")));
        mapping.insert(NodeLabel::new("B"), NodeTarget::Block(BlockId::new("blk-1")));

        assert!(matches!(reverse_mapping(&mapping), Err(Error::Validation(_))));
    }

    #[test]
    fn stored_graph_data_keeps_the_physical_graph() {
        let mut physical = PhysicalGraph::new();
        physical.insert(&BlockId::new("blk-1"), vec![Destination::new("h2", 6379, "blk-2_inputs")]);
        physical.insert(&BlockId::new("blk-2"), vec![]);
        let compiled = CompiledGraph {
            block_graph: BlockGraph {
                head: BlockId::new("blk-1"),
                tail: vec![BlockId::new("blk-2")],
                adjacency: Adjacency::from([
                    (BlockId::new("blk-1"), vec![BlockId::new("blk-2")]),
                    (BlockId::new("blk-2"), vec![]),
                ]),
            },
            physical_graph: physical,
            rev_mapping: RevMapping::from([(NodeTarget::Block(BlockId::new("blk-1")), NodeLabel::new("A"))]),
        };

        let dto = CompiledGraphDataDto::from(&compiled);
        assert_eq!(dto.t3_graph.as_ref(), Some(&compiled.physical_graph));
        assert_eq!(CompiledGraph::try_from(dto).unwrap(), compiled);
    }

    #[test]
    fn malformed_physical_graph_is_rejected_when_read() {
        let missing: CompiledGraphDataDto = serde_json::from_str(r#"{"head": "blk-1", "t3_graph": null}"#).unwrap();
        assert!(CompiledGraph::try_from(missing).unwrap().physical_graph.0.is_empty());

        let broken = serde_json::from_str::<CompiledGraphDataDto>(r#"{"head": "blk-1", "t3_graph": {"blk-1": {"outputs": "h:1"}}}"#);
        assert!(broken.is_err());
    }
}
