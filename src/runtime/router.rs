use std::sync::Arc;

use crate::domain::compiler::physical_graph::{DEFAULT_QUEUE, Destination};
use crate::domain::utils::id::BlockId;
use crate::error::{Error, Result};
use crate::logger::ROUTING_TARGET;
use crate::runtime::output_ptr::{RoutingEnvelope, resolve_route};
use crate::runtime::packet::Packet;
use crate::transport::connection_cache::ConnectionCache;
use crate::transport::queue::QueueClient;

/// Outcome of forwarding one packet. Destinations are independent: a
/// failure on one is recorded and the rest are still attempted.
#[derive(Debug, Default, PartialEq)]
pub struct ForwardReport {
    pub delivered: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl ForwardReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Per-block forwarding decision, driven entirely by the packet's `output_ptr`.
pub struct PacketRouter {
    block_id: BlockId,
    own_queue: Arc<dyn QueueClient>,
    connections: Arc<ConnectionCache>,
}

impl PacketRouter {
    pub fn new(block_id: BlockId, own_queue: Arc<dyn QueueClient>, connections: Arc<ConnectionCache>) -> Self {
        PacketRouter { block_id, own_queue, connections }
    }

    /// Where this block would send `packet`; `None` means its own `OUTPUT` queue.
    pub fn plan(&self, packet: &Packet) -> Result<Option<Vec<Destination>>> {
        match RoutingEnvelope::parse(&packet.output_ptr)? {
            RoutingEnvelope::Adhoc => Ok(None),
            RoutingEnvelope::Graph(graph) => Ok(Some(resolve_route(&graph, self.block_id.as_str())?.to_vec())),
            RoutingEnvelope::Direct(outputs) if outputs.is_empty() => Err(Error::Routing(format!(
                "output_ptr of session {} lists no destinations",
                packet.session_id
            ))),
            RoutingEnvelope::Direct(outputs) => Ok(Some(outputs)),
        }
    }

    /// Pushes `packet` to every next hop. Only a routing decision that cannot
    /// be made is an error; delivery failures land in the report.
    pub async fn forward(&self, packet: &Packet) -> Result<ForwardReport> {
        let plan = match self.plan(packet) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::error!(
                    target: ROUTING_TARGET,
                    LogDescription = "No route for packet, dropped",
                    Block = %self.block_id,
                    Session = %packet.session_id,
                    SeqNo = packet.seq_no,
                    Error = %e,
                );
                return Err(e);
            }
        };

        let payload = packet.encode()?;
        let mut report = ForwardReport::default();

        match plan {
            None => match self.own_queue.push(DEFAULT_QUEUE, payload).await {
                Ok(()) => report.delivered.push(DEFAULT_QUEUE.to_string()),
                Err(e) => report.failed.push((DEFAULT_QUEUE.to_string(), e.to_string())),
            },
            Some(destinations) => {
                for destination in &destinations {
                    let target = format!("{}/{}", destination.endpoint(), destination.queue_name);
                    match self.deliver(destination, payload.clone()).await {
                        Ok(()) => report.delivered.push(target),
                        Err(e) => {
                            log::warn!("Block {} could not deliver to {}: {}", self.block_id, target, e);
                            report.failed.push((target, e.to_string()));
                        }
                    }
                }
            }
        }

        tracing::info!(
            target: ROUTING_TARGET,
            LogDescription = "Packet forwarded",
            Block = %self.block_id,
            Session = %packet.session_id,
            SeqNo = packet.seq_no,
            Delivered = report.delivered.len(),
            Failed = report.failed.len(),
        );

        Ok(report)
    }

    async fn deliver(&self, destination: &Destination, payload: Vec<u8>) -> Result<()> {
        let client = self.connections.get(destination).await?;
        if let Err(e) = client.push(&destination.queue_name, payload).await {
            self.connections.invalidate(destination).await;
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::queue::{MemoryBroker, MemoryQueue};
    use tracing_test::traced_test;

    fn router(block: &str, broker: Arc<MemoryBroker>, own: Arc<MemoryQueue>) -> PacketRouter {
        PacketRouter::new(BlockId::new(block), own, Arc::new(ConnectionCache::new(broker, 16, None)))
    }

    #[tokio::test]
    async fn empty_output_ptr_goes_to_own_output_queue() {
        let broker = Arc::new(MemoryBroker::new());
        let own = Arc::new(MemoryQueue::new());

        let report = router("blk-1", broker.clone(), own.clone()).forward(&Packet::new("s", 1, "x")).await.unwrap();

        assert_eq!(report.delivered, vec!["OUTPUT".to_string()]);
        assert_eq!(own.len("OUTPUT"), 1);
        assert_eq!(broker.connects(), 0);
    }

    #[tokio::test]
    async fn one_unreachable_destination_does_not_block_the_others() {
        let broker = Arc::new(MemoryBroker::new());
        broker.set_unreachable("down", 6379);

        let mut packet = Packet::new("s", 1, "x");
        packet.output_ptr = RoutingEnvelope::Direct(vec![
            Destination::new("down", 6379, "A"),
            Destination::new("up", 6379, "B"),
        ])
        .to_output_ptr();

        let report = router("blk-1", broker.clone(), Arc::new(MemoryQueue::new())).forward(&packet).await.unwrap();

        assert_eq!(report.delivered, vec!["up:6379/B".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert!(!report.is_complete());
        assert_eq!(broker.endpoint("up", 6379).len("B"), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn forwarding_emits_a_routing_event() {
        let mut packet = Packet::new("s-9", 4, "x");
        packet.output_ptr = RoutingEnvelope::Direct(vec![Destination::new("up", 6379, "B")]).to_output_ptr();

        router("blk-1", Arc::new(MemoryBroker::new()), Arc::new(MemoryQueue::new())).forward(&packet).await.unwrap();

        assert!(logs_contain("Packet forwarded"));
        assert!(logs_contain("s-9"));
    }

    #[tokio::test]
    async fn unparseable_output_ptr_is_a_routing_error() {
        let mut packet = Packet::new("s", 1, "x");
        packet.output_ptr = "{oops".to_string();

        let result = router("blk-1", Arc::new(MemoryBroker::new()), Arc::new(MemoryQueue::new())).forward(&packet).await;
        assert!(matches!(result, Err(Error::Routing(_))));
    }
}
