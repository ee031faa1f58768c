use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::api::vdag_dto::{ConnectionDto, GraphDto, InputRefDto};
use crate::domain::utils::id::NodeLabel;
use crate::error::{Error, Result};

/// `node_label` consumes the output of every label in `inputs`.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub node_label: NodeLabel,
    pub inputs: Vec<NodeLabel>,
}

impl Connection {
    pub fn new(node_label: &str, inputs: &[&str]) -> Self {
        Connection { node_label: NodeLabel::new(node_label), inputs: inputs.iter().map(|l| NodeLabel::new(*l)).collect() }
    }
}

/// The node-label dependency graph exactly as declared by the vDAG author.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LogicalGraph {
    pub connections: Vec<Connection>,
    pub extra: Map<String, Value>,
}

impl LogicalGraph {
    pub fn new(connections: Vec<Connection>) -> Self {
        LogicalGraph { connections, extra: Map::new() }
    }

    /// Every `(source, destination)` edge in declaration order.
    pub fn edges(&self) -> impl Iterator<Item = (&NodeLabel, &NodeLabel)> {
        self.connections.iter().flat_map(|c| c.inputs.iter().map(move |input| (input, &c.node_label)))
    }

    /// Every label used by a connection must name a node.
    pub fn validate_labels(&self, known: &HashSet<&str>) -> Result<()> {
        for connection in &self.connections {
            if !known.contains(connection.node_label.as_str()) {
                return Err(Error::Validation(format!(
                    "connection references unknown node label '{}'",
                    connection.node_label
                )));
            }
            for input in &connection.inputs {
                if !known.contains(input.as_str()) {
                    return Err(Error::Validation(format!(
                        "node '{}' takes input from unknown node label '{}'",
                        connection.node_label, input
                    )));
                }
            }
        }
        Ok(())
    }
}

impl From<GraphDto> for LogicalGraph {
    fn from(dto: GraphDto) -> Self {
        let connections = dto
            .connections
            .into_iter()
            .map(|c| Connection {
                node_label: NodeLabel::new(c.node_label),
                inputs: c.inputs.into_iter().map(|i| NodeLabel::new(i.node_label)).collect(),
            })
            .collect();

        LogicalGraph { connections, extra: dto.extra }
    }
}

impl From<&LogicalGraph> for GraphDto {
    fn from(graph: &LogicalGraph) -> Self {
        GraphDto {
            connections: graph
                .connections
                .iter()
                .map(|c| ConnectionDto {
                    node_label: c.node_label.to_string(),
                    inputs: c.inputs.iter().map(|i| InputRefDto { node_label: i.to_string() }).collect(),
                })
                .collect(),
            extra: graph.extra.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edges_point_from_input_to_consumer() {
        let graph = LogicalGraph::new(vec![Connection::new("B", &["A"]), Connection::new("C", &["A", "B"])]);

        let edges: Vec<(&str, &str)> = graph.edges().map(|(s, d)| (s.as_str(), d.as_str())).collect();
        assert_eq!(edges, vec![("A", "B"), ("A", "C"), ("B", "C")]);
    }

    #[test]
    fn unknown_input_label_is_a_validation_error() {
        let graph = LogicalGraph::new(vec![Connection::new("B", &["X"])]);
        let known: HashSet<&str> = ["A", "B"].into_iter().collect();

        let err = graph.validate_labels(&known).unwrap_err();
        assert!(matches!(err, Error::Validation(msg) if msg.contains("'X'")));
    }
}
