use std::collections::{BTreeMap, HashMap};

use crate::domain::utils::id::{BlockId, NodeLabel, VdagUri};
use crate::domain::vdag::graph::LogicalGraph;
use crate::domain::vdag::node::NodeTarget;
use crate::domain::vdag::vdag::AssignmentInfo;
use crate::error::{Error, Result};

pub type Adjacency = BTreeMap<BlockId, Vec<BlockId>>;

/// The persisted assignment and logical graph of an embedded vDAG.
#[derive(Debug, Clone, PartialEq)]
pub struct SubVdagSource {
    pub assignment: AssignmentInfo,
    pub graph: LogicalGraph,
}

/// Every sub-vDAG reachable from a root mapping, loaded up front so the
/// transform below stays pure.
pub type SubGraphIndex = HashMap<VdagUri, SubVdagSource>;

/// Stage 1 output: block id adjacency with its single entry block and its sinks.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockGraph {
    pub head: BlockId,
    pub tail: Vec<BlockId>,
    pub adjacency: Adjacency,
}

impl BlockGraph {
    /// LogicalGraph -> BlockGraph.
    ///
    /// Sub-vDAG targets are compiled recursively from `sub_graphs`; their
    /// adjacency is merged in and the node is replaced by the sub-graph's head.
    /// `root` is the URI of the vDAG being compiled, if it has one, so that a
    /// sub-vDAG embedding it again is reported as a cycle.
    pub fn compile(
        root: Option<&VdagUri>,
        logical: &LogicalGraph,
        mapping: &AssignmentInfo,
        sub_graphs: &SubGraphIndex,
    ) -> Result<Self> {
        let mut in_progress: Vec<VdagUri> = root.into_iter().cloned().collect();
        Self::compile_nested(logical, mapping, sub_graphs, &mut in_progress)
    }

    fn compile_nested(
        logical: &LogicalGraph,
        mapping: &AssignmentInfo,
        sub_graphs: &SubGraphIndex,
        in_progress: &mut Vec<VdagUri>,
    ) -> Result<Self> {
        let mut adjacency = Adjacency::new();
        let mut resolved: HashMap<&NodeLabel, BlockId> = HashMap::new();

        for (label, target) in mapping {
            let block = match target {
                NodeTarget::Block(id) => id.clone(),
                NodeTarget::SubVdag(uri) => {
                    if in_progress.contains(uri) {
                        let chain: Vec<&str> = in_progress.iter().map(|u| u.as_str()).collect();
                        return Err(Error::Composition(format!(
                            "cyclic sub-vDAG reference: {} -> {}",
                            chain.join(" -> "),
                            uri
                        )));
                    }

                    let source = sub_graphs.get(uri).ok_or_else(|| {
                        Error::Composition(format!("sub-vDAG {} referenced by node '{}' was not loaded", uri, label))
                    })?;

                    in_progress.push(uri.clone());
                    let sub = Self::compile_nested(&source.graph, &source.assignment, sub_graphs, in_progress)?;
                    in_progress.pop();

                    for (from, targets) in sub.adjacency {
                        for to in targets {
                            add_edge(&mut adjacency, from.clone(), to);
                        }
                        adjacency.entry(from).or_default();
                    }
                    sub.head
                }
            };

            adjacency.entry(block.clone()).or_default();
            resolved.insert(label, block);
        }

        for (input, node) in logical.edges() {
            let from = lookup(&resolved, input)?;
            let to = lookup(&resolved, node)?;
            add_edge(&mut adjacency, from, to);
        }

        Self::from_adjacency(adjacency)
    }

    /// Derives head and tail from a finished adjacency map.
    ///
    /// Exactly one source block is required and the graph must be acyclic.
    pub fn from_adjacency(adjacency: Adjacency) -> Result<Self> {
        if adjacency.is_empty() {
            return Err(Error::Validation("vDAG compiles to an empty block graph".to_string()));
        }

        let mut incoming: HashMap<&BlockId, usize> = adjacency.keys().map(|block| (block, 0)).collect();
        for targets in adjacency.values() {
            for to in targets {
                *incoming.entry(to).or_default() += 1;
            }
        }

        let mut sources: Vec<&BlockId> = incoming.iter().filter(|(_, n)| **n == 0).map(|(b, _)| *b).collect();
        sources.sort();

        let head = match sources.as_slice() {
            [head] => (*head).clone(),
            [] => return Err(Error::Validation("block graph has no head: every block has an input".to_string())),
            many => {
                let names: Vec<&str> = many.iter().map(|b| b.as_str()).collect();
                return Err(Error::Validation(format!("ambiguous head, several source blocks: {}", names.join(", "))));
            }
        };

        ensure_acyclic(&adjacency, incoming)?;

        let tail = adjacency.iter().filter(|(_, targets)| targets.is_empty()).map(|(block, _)| block.clone()).collect();

        Ok(BlockGraph { head, tail, adjacency })
    }

    pub fn blocks(&self) -> impl Iterator<Item = &BlockId> {
        self.adjacency.keys()
    }
}

fn lookup(resolved: &HashMap<&NodeLabel, BlockId>, label: &NodeLabel) -> Result<BlockId> {
    resolved
        .get(label)
        .cloned()
        .ok_or_else(|| Error::Validation(format!("node '{}' has no entry in the assignment", label)))
}

fn add_edge(adjacency: &mut Adjacency, from: BlockId, to: BlockId) {
    adjacency.entry(to.clone()).or_default();
    let targets = adjacency.entry(from).or_default();
    if !targets.contains(&to) {
        targets.push(to);
    }
}

// Kahn's algorithm; any block never reaching in-degree zero sits on a cycle.
fn ensure_acyclic(adjacency: &Adjacency, mut incoming: HashMap<&BlockId, usize>) -> Result<()> {
    let mut ready: Vec<&BlockId> = incoming.iter().filter(|(_, n)| **n == 0).map(|(b, _)| *b).collect();
    let mut visited = 0;

    while let Some(block) = ready.pop() {
        visited += 1;
        for next in adjacency.get(block).into_iter().flatten() {
            if let Some(count) = incoming.get_mut(next) {
                *count -= 1;
                if *count == 0 {
                    ready.push(next);
                }
            }
        }
    }

    if visited != adjacency.len() {
        let mut stuck: Vec<&str> = incoming.iter().filter(|(_, n)| **n > 0).map(|(b, _)| b.as_str()).collect();
        stuck.sort();
        return Err(Error::Validation(format!("block graph contains a cycle through: {}", stuck.join(", "))));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::vdag::graph::Connection;

    fn mapping(entries: &[(&str, &str)]) -> AssignmentInfo {
        entries.iter().map(|(label, target)| (NodeLabel::new(*label), NodeTarget::from(*target))).collect()
    }

    fn ids(raw: &[&str]) -> Vec<BlockId> {
        raw.iter().map(|b| BlockId::new(*b)).collect()
    }

    #[test]
    fn two_block_chain() {
        let logical = LogicalGraph::new(vec![Connection::new("B", &["A"])]);
        let graph =
            BlockGraph::compile(None, &logical, &mapping(&[("A", "blk-1"), ("B", "blk-2")]), &SubGraphIndex::new())
                .unwrap();

        assert_eq!(graph.head, BlockId::new("blk-1"));
        assert_eq!(graph.tail, ids(&["blk-2"]));
        assert_eq!(graph.adjacency.get("blk-1"), Some(&ids(&["blk-2"])));
        assert_eq!(graph.adjacency.get("blk-2"), Some(&Vec::new()));
    }

    #[test]
    fn tail_is_exactly_the_blocks_without_outputs() {
        let logical =
            LogicalGraph::new(vec![Connection::new("B", &["A"]), Connection::new("C", &["A"]), Connection::new("D", &["B"])]);
        let graph = BlockGraph::compile(
            None,
            &logical,
            &mapping(&[("A", "a"), ("B", "b"), ("C", "c"), ("D", "d")]),
            &SubGraphIndex::new(),
        )
        .unwrap();

        let empty: Vec<BlockId> =
            graph.adjacency.iter().filter(|(_, v)| v.is_empty()).map(|(k, _)| k.clone()).collect();
        assert_eq!(graph.tail, empty);
        assert_eq!(graph.tail, ids(&["c", "d"]));
    }

    #[test]
    fn sub_vdag_is_spliced_in_at_its_head() {
        let mut subs = SubGraphIndex::new();
        subs.insert(
            VdagUri::new("inner:1-a"),
            SubVdagSource {
                assignment: mapping(&[("X", "x1"), ("Y", "x2")]),
                graph: LogicalGraph::new(vec![Connection::new("Y", &["X"])]),
            },
        );

        let logical = LogicalGraph::new(vec![Connection::new("S", &["A"]), Connection::new("C", &["S"])]);
        let graph = BlockGraph::compile(
            None,
            &logical,
            &mapping(&[("A", "a"), ("S", "vdag:::inner:1-a"), ("C", "c")]),
            &subs,
        )
        .unwrap();

        let mut expected = Adjacency::new();
        expected.insert(BlockId::new("a"), ids(&["x1"]));
        expected.insert(BlockId::new("x1"), ids(&["x2", "c"]));
        expected.insert(BlockId::new("x2"), Vec::new());
        expected.insert(BlockId::new("c"), Vec::new());

        assert_eq!(graph.adjacency, expected);
        assert_eq!(graph.head, BlockId::new("a"));
        assert_eq!(graph.tail, ids(&["c", "x2"]));
    }

    #[test]
    fn self_embedding_vdag_is_a_composition_error() {
        let mut subs = SubGraphIndex::new();
        subs.insert(
            VdagUri::new("b:1-a"),
            SubVdagSource { assignment: mapping(&[("Z", "vdag:::a:1-a")]), graph: LogicalGraph::default() },
        );

        let err = BlockGraph::compile(
            Some(&VdagUri::new("a:1-a")),
            &LogicalGraph::default(),
            &mapping(&[("S", "vdag:::b:1-a")]),
            &subs,
        )
        .unwrap_err();

        assert!(matches!(err, Error::Composition(msg) if msg.contains("a:1-a -> b:1-a -> a:1-a")));
    }

    #[test]
    fn missing_sub_vdag_is_a_composition_error() {
        let err = BlockGraph::compile(None, &LogicalGraph::default(), &mapping(&[("S", "vdag:::gone:1-a")]), &SubGraphIndex::new())
            .unwrap_err();
        assert!(matches!(err, Error::Composition(_)));
    }

    #[test]
    fn several_sources_are_rejected() {
        let logical = LogicalGraph::new(vec![Connection::new("C", &["A", "B"])]);
        let err =
            BlockGraph::compile(None, &logical, &mapping(&[("A", "a"), ("B", "b"), ("C", "c")]), &SubGraphIndex::new())
                .unwrap_err();

        assert!(matches!(err, Error::Validation(msg) if msg.contains("ambiguous head")));
    }

    #[test]
    fn cycles_behind_the_head_are_rejected() {
        let logical = LogicalGraph::new(vec![
            Connection::new("B", &["A", "C"]),
            Connection::new("C", &["B"]),
        ]);
        let err =
            BlockGraph::compile(None, &logical, &mapping(&[("A", "a"), ("B", "b"), ("C", "c")]), &SubGraphIndex::new())
                .unwrap_err();

        assert!(matches!(err, Error::Validation(msg) if msg.contains("cycle")));
    }
}
