use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::utils::id::BlockId;
use crate::error::Result;
use crate::runtime::packet::Packet;
use crate::runtime::policy::{BlockPolicies, PolicyStage};
use crate::runtime::router::{ForwardReport, PacketRouter};
use crate::runtime::session::SessionContext;
use crate::transport::queue::QueueClient;

/// The block's own work on a packet (model inference in production).
#[async_trait]
pub trait BlockHandler: Send + Sync {
    async fn process(&self, packet: Packet) -> Result<Packet>;
}

/// Returns every packet unchanged.
pub struct EchoHandler;

#[async_trait]
impl BlockHandler for EchoHandler {
    async fn process(&self, packet: Packet) -> Result<Packet> {
        Ok(packet)
    }
}

pub fn input_queue_name(block_id: &BlockId) -> String {
    format!("{}_inputs", block_id)
}

pub struct BlockRuntime {
    block_id: BlockId,
    input: Arc<dyn QueueClient>,
    handler: Arc<dyn BlockHandler>,
    policies: Arc<BlockPolicies>,
    router: PacketRouter,
    poll_timeout: Duration,
}

impl BlockRuntime {
    pub fn new(
        block_id: BlockId,
        input: Arc<dyn QueueClient>,
        handler: Arc<dyn BlockHandler>,
        policies: Arc<BlockPolicies>,
        router: PacketRouter,
    ) -> Self {
        BlockRuntime { block_id, input, handler, policies, router, poll_timeout: Duration::from_secs(1) }
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    /// Decode, preprocess, process, postprocess, route.
    pub async fn handle_payload(&self, payload: &[u8]) -> Result<ForwardReport> {
        let packet = Packet::decode(payload)?;
        let ctx = SessionContext::parse(&packet.session_id)?;

        let packet = self.policies.apply(&ctx, PolicyStage::Preprocessing, packet).await?;
        let output = self.handler.process(packet).await?;
        let output = self.policies.apply(&ctx, PolicyStage::Postprocessing, output).await?;

        self.router.forward(&output).await
    }

    /// Handles at most one queued packet. Returns whether one was taken.
    pub async fn run_once(&self) -> Result<bool> {
        let queue = input_queue_name(&self.block_id);
        let Some(payload) = self.input.pop(&queue, self.poll_timeout).await? else {
            return Ok(false);
        };

        if let Err(e) = self.handle_payload(&payload).await {
            log::error!("Block {} dropped a packet: {}", self.block_id, e);
        }
        Ok(true)
    }

    /// Serves the input queue until the task is dropped.
    pub async fn run(&self) {
        log::info!("Block {} listening on '{}'.", self.block_id, input_queue_name(&self.block_id));
        loop {
            if let Err(e) = self.run_once().await {
                log::error!("Block {} failed to read its input queue: {}", self.block_id, e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
