use crate::domain::compiler::compiled::CompiledGraph;
use crate::domain::compiler::physical_graph::Destination;
use crate::domain::utils::id::{BlockId, VdagUri};
use crate::runtime::block::input_queue_name;
use crate::runtime::output_ptr::RoutingEnvelope;
use crate::runtime::packet::Packet;
use crate::runtime::session::SessionContext;

/// First packet of a vDAG session and the queue it enters through.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryPacket {
    pub head: BlockId,
    pub queue_name: String,
    pub packet: Packet,
}

/// Tags the packet with the session, attaches the compiled graph with
/// `final_sink` as terminal fallback and targets the head block.
pub fn build_entry_packet(
    compiled: &CompiledGraph,
    uri: &VdagUri,
    session: &str,
    data: &str,
    final_sink: Vec<Destination>,
) -> EntryPacket {
    let head = compiled.block_graph.head.clone();
    let graph = compiled.physical_graph.with_final(final_sink);

    let packet = Packet {
        session_id: SessionContext::governed(uri, session).to_string(),
        data: data.to_string(),
        ts: chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
        output_ptr: RoutingEnvelope::Graph(graph).to_output_ptr(),
        ..Default::default()
    };

    EntryPacket { queue_name: input_queue_name(&head), head, packet }
}
