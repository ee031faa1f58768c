use serde_json::{Value, json};

use crate::domain::compiler::physical_graph::{Destination, PhysicalGraph};
use crate::error::{Error, Result};

/// Parsed form of a packet's `output_ptr`.
#[derive(Debug, Clone, PartialEq)]
pub enum RoutingEnvelope {
    /// Empty pointer: results go to the block's own `OUTPUT` queue.
    Adhoc,
    /// `{is_graph: true, graph}`: a compiled vDAG travelling with the packet.
    Graph(PhysicalGraph),
    /// Explicit one-hop addressing.
    Direct(Vec<Destination>),
}

impl RoutingEnvelope {
    pub fn parse(output_ptr: &str) -> Result<Self> {
        if output_ptr.trim().is_empty() {
            return Ok(RoutingEnvelope::Adhoc);
        }

        let value: Value = serde_json::from_str(output_ptr)
            .map_err(|e| Error::Routing(format!("output_ptr is not valid JSON: {}", e)))?;

        if value.get("is_graph").and_then(Value::as_bool) == Some(true) {
            let graph = value
                .get("graph")
                .cloned()
                .ok_or_else(|| Error::Routing("output_ptr is marked is_graph but carries no graph".to_string()))?;
            let graph = serde_json::from_value(graph)
                .map_err(|e| Error::Routing(format!("output_ptr graph is malformed: {}", e)))?;
            return Ok(RoutingEnvelope::Graph(graph));
        }

        let outputs = match value {
            Value::Array(_) => value,
            Value::Object(mut map) => map.remove("outputs").unwrap_or(Value::Array(Vec::new())),
            other => return Err(Error::Routing(format!("output_ptr has unexpected shape: {}", other))),
        };
        let outputs = serde_json::from_value(outputs)
            .map_err(|e| Error::Routing(format!("output_ptr outputs are malformed: {}", e)))?;

        Ok(RoutingEnvelope::Direct(outputs))
    }

    pub fn to_output_ptr(&self) -> String {
        match self {
            RoutingEnvelope::Adhoc => String::new(),
            RoutingEnvelope::Graph(graph) => json!({"is_graph": true, "graph": graph}).to_string(),
            RoutingEnvelope::Direct(outputs) => json!({"outputs": outputs}).to_string(),
        }
    }
}

/// Next hops of `block` in `graph`: its own outputs, or `final` when it
/// declares none. A hop with nowhere to go is an error, never a silent drop.
pub fn resolve_route<'a>(graph: &'a PhysicalGraph, block: &str) -> Result<&'a [Destination]> {
    let spec = graph
        .get(block)
        .ok_or_else(|| Error::Routing(format!("block {} is not part of the routed graph", block)))?;

    if !spec.outputs.is_empty() {
        return Ok(&spec.outputs);
    }

    match graph.final_outputs() {
        Some(outputs) if !outputs.is_empty() => Ok(outputs),
        _ => Err(Error::Routing(format!(
            "block {} has no outputs and the graph defines no final destination",
            block
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::utils::id::BlockId;

    fn graph() -> PhysicalGraph {
        let mut graph = PhysicalGraph::new();
        graph.insert(&BlockId::new("blk-1"), vec![Destination::new("h2", 6379, "blk-2_inputs")]);
        graph.insert(&BlockId::new("blk-2"), vec![]);
        graph
    }

    #[test]
    fn declared_outputs_win_over_final() {
        let graph = graph().with_final(vec![Destination::new("sink", 1, "Q")]);

        assert_eq!(resolve_route(&graph, "blk-1").unwrap(), &[Destination::new("h2", 6379, "blk-2_inputs")]);
        assert_eq!(resolve_route(&graph, "blk-2").unwrap(), &[Destination::new("sink", 1, "Q")]);
    }

    #[test]
    fn terminal_hop_without_final_fails_loudly() {
        assert!(matches!(resolve_route(&graph(), "blk-2"), Err(Error::Routing(_))));
        assert!(matches!(resolve_route(&graph(), "blk-9"), Err(Error::Routing(_))));

        let empty_final = graph().with_final(vec![]);
        assert!(matches!(resolve_route(&empty_final, "blk-2"), Err(Error::Routing(_))));
    }

    #[test]
    fn envelope_shapes() {
        assert_eq!(RoutingEnvelope::parse("").unwrap(), RoutingEnvelope::Adhoc);

        let graph = RoutingEnvelope::Graph(graph());
        assert_eq!(RoutingEnvelope::parse(&graph.to_output_ptr()).unwrap(), graph);

        let bare = RoutingEnvelope::parse(r#"[{"host": "h", "port": 7000}]"#).unwrap();
        assert_eq!(bare, RoutingEnvelope::Direct(vec![Destination::new("h", 7000, "OUTPUT")]));

        assert!(matches!(RoutingEnvelope::parse("{not json"), Err(Error::Routing(_))));
        assert!(matches!(RoutingEnvelope::parse("42"), Err(Error::Routing(_))));
    }
}
