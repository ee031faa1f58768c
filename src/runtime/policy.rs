use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::collaborators::{PolicyEvaluator, PolicyLoader, VdagRegistry};
use crate::domain::utils::cache::TtlCache;
use crate::domain::utils::id::{BlockId, VdagUri};
use crate::error::{Error, Result};
use crate::runtime::packet::Packet;
use crate::runtime::session::SessionContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyStage {
    Preprocessing,
    Postprocessing,
}

type CachedPolicy = Option<Arc<dyn PolicyEvaluator>>;

/// The pre/post-processing policies this block runs for each vDAG it serves.
///
/// A block only knows its own id; the node label (and with it the policies)
/// comes from the vDAG's `rev_mapping`. Both stages are loaded together and
/// cached per `(vdagURI, stage)`. A node without a policy, or a block that is
/// not a node of the vDAG at all, is cached as `None`.
pub struct BlockPolicies {
    block_id: BlockId,
    registry: Arc<dyn VdagRegistry>,
    loader: Arc<dyn PolicyLoader>,
    cache: Mutex<TtlCache<(VdagUri, PolicyStage), CachedPolicy>>,
}

impl BlockPolicies {
    pub fn new(
        block_id: BlockId,
        registry: Arc<dyn VdagRegistry>,
        loader: Arc<dyn PolicyLoader>,
        capacity: usize,
        ttl: Option<Duration>,
    ) -> Self {
        BlockPolicies { block_id, registry, loader, cache: Mutex::new(TtlCache::new(capacity, ttl)) }
    }

    pub async fn policy_for(&self, uri: &VdagUri, stage: PolicyStage) -> Result<CachedPolicy> {
        if let Some(cached) = self.cache.lock().await.get(&(uri.clone(), stage)) {
            return Ok(cached);
        }

        let (pre, post) = match self.load(uri).await {
            Ok(loaded) => loaded,
            Err(e) => {
                self.invalidate_vdag(uri).await;
                return Err(e);
            }
        };

        let mut cache = self.cache.lock().await;
        cache.insert((uri.clone(), PolicyStage::Preprocessing), pre.clone());
        cache.insert((uri.clone(), PolicyStage::Postprocessing), post.clone());

        Ok(match stage {
            PolicyStage::Preprocessing => pre,
            PolicyStage::Postprocessing => post,
        })
    }

    async fn load(&self, uri: &VdagUri) -> Result<(CachedPolicy, CachedPolicy)> {
        let vdag = self.registry.get_vdag(uri).await?.ok_or_else(|| Error::NotFound(format!("vDAG {}", uri)))?;

        let compiled = vdag
            .compiled_graph
            .as_ref()
            .ok_or_else(|| Error::NotFound(format!("vDAG {} has not been compiled", uri)))?;
        // Blocks spliced in from a sub-vDAG carry the outer session but have
        // no node of their own in the outer vDAG.
        let Some(label) = compiled.label_for_block(&self.block_id) else {
            log::debug!("Block {} has no node in vDAG {}, packets pass through.", self.block_id, uri);
            return Ok((None, None));
        };
        let node = vdag
            .node(label.as_str())
            .ok_or_else(|| Error::NotFound(format!("node '{}' missing from vDAG {}", label, uri)))?;

        let pre = match &node.preprocessing_policy {
            Some(rule) => Some(self.loader.load(rule).await?),
            None => None,
        };
        let post = match &node.postprocessing_policy {
            Some(rule) => Some(self.loader.load(rule).await?),
            None => None,
        };

        log::info!(
            "Block {} loaded policies for vDAG {} as node '{}' (pre: {}, post: {}).",
            self.block_id,
            uri,
            label,
            pre.is_some(),
            post.is_some()
        );
        Ok((pre, post))
    }

    /// Runs the stage's policy on a vDAG-governed packet. Plain sessions and
    /// nodes without a policy pass through unchanged.
    pub async fn apply(&self, ctx: &SessionContext, stage: PolicyStage, packet: Packet) -> Result<Packet> {
        let Some(uri) = ctx.vdag_uri() else {
            return Ok(packet);
        };
        let Some(policy) = self.policy_for(uri, stage).await? else {
            return Ok(packet);
        };

        let output = policy.evaluate(json!({"packet": serde_json::to_value(&packet)?})).await?;
        let updated = output
            .get("packet")
            .cloned()
            .ok_or_else(|| Error::Policy(format!("{:?} policy of vDAG {} returned no packet", stage, uri)))?;

        serde_json::from_value(updated).map_err(|e| Error::Policy(format!("{:?} policy returned a malformed packet: {}", stage, e)))
    }

    /// Forgets both cached stages of a vDAG, e.g. after it was recompiled.
    pub async fn invalidate_vdag(&self, uri: &VdagUri) -> usize {
        self.cache.lock().await.invalidate_where(|(cached_uri, _)| cached_uri == uri)
    }
}
