use std::collections::BTreeMap;
use std::sync::Arc;

use crate::api::dryrun_dto::{DryRunGraphDto, EndToEndDto, ValidateGraphDto};
use crate::api::vdag_dto::CompiledGraphDataDto;
use crate::collaborators::{DiscoveryService, SearchPolicy, VdagRegistry};
use crate::domain::assignment::resolver::AssignmentResolver;
use crate::domain::compiler::block_graph::BlockGraph;
use crate::domain::compiler::compiled::CompiledGraph;
use crate::domain::compiler::compiler::GraphCompiler;
use crate::domain::utils::id::VdagUri;
use crate::domain::vdag::vdag::{AssignmentInfo, VdagObject, VdagStatus};
use crate::error::{Error, Result};

/// Assignment plus compilation of submitted vDAGs. The persisting path and
/// the dry runs run the same planning step.
pub struct VdagProcessor {
    registry: Arc<dyn VdagRegistry>,
    resolver: AssignmentResolver,
    compiler: GraphCompiler,
}

impl VdagProcessor {
    pub fn new(
        registry: Arc<dyn VdagRegistry>,
        search: Arc<dyn SearchPolicy>,
        discovery: Arc<dyn DiscoveryService>,
    ) -> Self {
        VdagProcessor {
            resolver: AssignmentResolver::new(search),
            compiler: GraphCompiler::new(registry.clone(), discovery),
            registry,
        }
    }

    async fn plan(&self, vdag: &VdagObject) -> Result<(AssignmentInfo, CompiledGraph)> {
        let assignment = self.resolver.resolve(vdag).await?;
        let compiled = self.compiler.compile(vdag.uri().as_ref(), &vdag.graph, &assignment).await?;
        Ok((assignment, compiled))
    }

    /// Read-only version of the registry claim.
    async fn ensure_resubmittable(&self, uri: &VdagUri) -> Result<()> {
        match self.registry.get_vdag(uri).await? {
            Some(existing) if !existing.status.allows_resubmission() => {
                Err(Error::Conflict { vdag: uri.to_string(), status: existing.status.to_string() })
            }
            _ => Ok(()),
        }
    }

    /// Assigns and compiles `vdag` and stores the result.
    ///
    /// The stored copy is `assigned` on success and `failed` otherwise; the
    /// triggering error is returned either way. A conflict is raised before
    /// any assignment call is made.
    pub async fn map_vdag_to_blocks(&self, mut vdag: VdagObject) -> Result<VdagObject> {
        vdag.validate()?;
        let uri = vdag.require_uri()?;

        self.registry.claim_for_compilation(&uri).await?;

        let outcome = match self.plan(&vdag).await {
            Ok((assignment, compiled)) => {
                vdag.assignment_info = assignment;
                vdag.compiled_graph = Some(compiled);
                vdag.status = VdagStatus::Assigned;
                Ok(())
            }
            Err(e) => {
                log::warn!("vDAG {} failed to compile: {}", uri, e);
                vdag.assignment_info.clear();
                vdag.compiled_graph = None;
                vdag.status = VdagStatus::Failed;
                Err(e)
            }
        };

        let persisted = self.registry.create_vdag(&vdag).await;
        if let Err(e) = &persisted {
            log::error!("vDAG {} could not be stored with status {}: {}", uri, vdag.status, e);
            self.registry.release_claim(&uri).await;
        }

        outcome?;
        persisted?;

        log::info!("vDAG {} assigned to {} nodes.", uri, vdag.assignment_info.len());
        Ok(vdag)
    }

    pub async fn dry_run_assignment(&self, vdag: &VdagObject) -> Result<AssignmentInfo> {
        vdag.validate()?;
        self.resolver.resolve(vdag).await
    }

    /// Everything [`Self::map_vdag_to_blocks`] does, nothing stored or deleted.
    pub async fn dry_run_end_to_end(&self, vdag: &VdagObject) -> Result<(AssignmentInfo, CompiledGraph)> {
        vdag.validate()?;
        if let Some(uri) = vdag.uri() {
            self.ensure_resubmittable(&uri).await?;
        }
        self.plan(vdag).await
    }

    /// Stage 1 only; discovery is not consulted.
    pub async fn validate_graph(&self, vdag: &VdagObject) -> Result<BlockGraph> {
        vdag.validate()?;
        let assignment = self.resolver.resolve(vdag).await?;
        self.compiler.compile_block_graph(vdag.uri().as_ref(), &vdag.graph, &assignment).await
    }
}

pub fn assignment_to_wire(assignment: &AssignmentInfo) -> BTreeMap<String, String> {
    assignment.iter().map(|(label, target)| (label.to_string(), target.to_string())).collect()
}

pub fn end_to_end_dto(assignment: &AssignmentInfo, compiled: &CompiledGraph) -> EndToEndDto {
    let data = CompiledGraphDataDto::from(compiled);
    EndToEndDto {
        nodes_assignment_info: assignment_to_wire(assignment),
        graph: DryRunGraphDto {
            head: data.head,
            tail: data.tail,
            flat_graph: data.t2_graph,
            connections_graph: data.t3_graph.unwrap_or_default(),
            rev_mapping: data.rev_mapping,
        },
    }
}

impl From<&BlockGraph> for ValidateGraphDto {
    fn from(graph: &BlockGraph) -> Self {
        ValidateGraphDto {
            head: graph.head.to_string(),
            tail: graph.tail.iter().map(|b| b.to_string()).collect(),
            graph: graph
                .adjacency
                .iter()
                .map(|(block, targets)| (block.to_string(), targets.iter().map(|t| t.to_string()).collect()))
                .collect(),
        }
    }
}
