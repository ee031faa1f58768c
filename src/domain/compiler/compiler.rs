use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use crate::collaborators::{DiscoveryService, VdagRegistry};
use crate::domain::compiler::block_graph::{BlockGraph, SubGraphIndex, SubVdagSource};
use crate::domain::compiler::compiled::{CompiledGraph, reverse_mapping};
use crate::domain::compiler::physical_graph::PhysicalGraph;
use crate::domain::utils::id::VdagUri;
use crate::domain::vdag::graph::LogicalGraph;
use crate::domain::vdag::node::NodeTarget;
use crate::domain::vdag::vdag::{AssignmentInfo, VdagStatus};
use crate::error::{Error, Result};
use crate::logger::COMPILER_TARGET;

/// Drives the three compile stages against the registry and discovery.
pub struct GraphCompiler {
    registry: Arc<dyn VdagRegistry>,
    discovery: Arc<dyn DiscoveryService>,
}

impl GraphCompiler {
    pub fn new(registry: Arc<dyn VdagRegistry>, discovery: Arc<dyn DiscoveryService>) -> Self {
        GraphCompiler { registry, discovery }
    }

    /// Loads every sub-vDAG reachable from `mapping`, each one once.
    ///
    /// The root itself is never fetched; a reference back to it is left for
    /// [`BlockGraph::compile`] to report as a cycle.
    pub async fn collect_sub_graphs(&self, root: Option<&VdagUri>, mapping: &AssignmentInfo) -> Result<SubGraphIndex> {
        let mut index = SubGraphIndex::new();
        let mut seen: HashSet<VdagUri> = root.into_iter().cloned().collect();
        let mut pending: VecDeque<VdagUri> = VecDeque::new();

        enqueue_sub_vdags(mapping, &mut seen, &mut pending);

        while let Some(uri) = pending.pop_front() {
            let vdag = match self.registry.get_vdag(&uri).await {
                Ok(Some(vdag)) => vdag,
                Ok(None) => return Err(Error::Composition(format!("sub-vDAG {} does not exist", uri))),
                Err(e) => return Err(Error::Composition(format!("failed to fetch sub-vDAG {}: {}", uri, e))),
            };

            if !matches!(vdag.status, VdagStatus::Assigned | VdagStatus::Active) || vdag.assignment_info.is_empty() {
                return Err(Error::Composition(format!(
                    "sub-vDAG {} is not assigned (status {})",
                    uri, vdag.status
                )));
            }

            log::debug!("Loaded sub-vDAG {} with {} assigned nodes.", uri, vdag.assignment_info.len());
            enqueue_sub_vdags(&vdag.assignment_info, &mut seen, &mut pending);
            index.insert(uri, SubVdagSource { assignment: vdag.assignment_info, graph: vdag.graph });
        }

        Ok(index)
    }

    /// Stage 1: node-label graph to block graph, sub-vDAGs spliced in.
    pub async fn compile_block_graph(
        &self,
        root: Option<&VdagUri>,
        logical: &LogicalGraph,
        mapping: &AssignmentInfo,
    ) -> Result<BlockGraph> {
        let sub_graphs = self.collect_sub_graphs(root, mapping).await?;
        BlockGraph::compile(root, logical, mapping, &sub_graphs)
    }

    /// Stage 2: asks discovery for an address per block. A block left
    /// unaddressed could never be reached, so that fails the compile.
    pub async fn compile_physical_graph(&self, block_graph: &BlockGraph) -> Result<PhysicalGraph> {
        let physical = self.discovery.resolve_graph(&block_graph.adjacency).await?;

        if let Some(missing) = block_graph.blocks().find(|block| !physical.contains_block(block)) {
            return Err(Error::NotFound(format!("discovery returned no address for block {}", missing)));
        }
        Ok(physical)
    }

    /// All three stages.
    pub async fn compile(
        &self,
        root: Option<&VdagUri>,
        logical: &LogicalGraph,
        mapping: &AssignmentInfo,
    ) -> Result<CompiledGraph> {
        let rev_mapping = reverse_mapping(mapping)?;
        let block_graph = self.compile_block_graph(root, logical, mapping).await?;
        let physical_graph = self.compile_physical_graph(&block_graph).await?;

        tracing::info!(
            target: COMPILER_TARGET,
            LogDescription = "vDAG compiled",
            Vdag = %root.map(|u| u.as_str()).unwrap_or(""),
            Head = %block_graph.head,
            Tail = block_graph.tail.len(),
            Blocks = block_graph.adjacency.len(),
        );

        Ok(CompiledGraph { block_graph, physical_graph, rev_mapping })
    }
}

fn enqueue_sub_vdags(mapping: &AssignmentInfo, seen: &mut HashSet<VdagUri>, pending: &mut VecDeque<VdagUri>) {
    for target in mapping.values() {
        if let NodeTarget::SubVdag(uri) = target {
            if seen.insert(uri.clone()) {
                pending.push_back(uri.clone());
            }
        }
    }
}
