use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::utils::id::BlockId;

/// Key of the global fallback used by terminal hops.
pub const FINAL_KEY: &str = "final";

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 6379;
pub const DEFAULT_QUEUE: &str = "OUTPUT";

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_queue() -> String {
    DEFAULT_QUEUE.to_string()
}

/// One addressed next hop.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_queue")]
    pub queue_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_id: Option<String>,
}

impl Destination {
    pub fn new(host: &str, port: u16, queue_name: &str) -> Self {
        Destination { host: host.to_string(), port, queue_name: queue_name.to_string(), block_id: None }
    }

    /// The key connections are cached under.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Destination {
    fn default() -> Self {
        Destination::new(DEFAULT_HOST, DEFAULT_PORT, DEFAULT_QUEUE)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct OutputSpec {
    #[serde(default)]
    pub outputs: Vec<Destination>,
}

/// Stage 2 output: for every block, where its results go.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(transparent)]
pub struct PhysicalGraph(pub BTreeMap<String, OutputSpec>);

impl PhysicalGraph {
    pub fn new() -> Self {
        PhysicalGraph(BTreeMap::new())
    }

    pub fn get(&self, block: &str) -> Option<&OutputSpec> {
        self.0.get(block)
    }

    pub fn insert(&mut self, block: &BlockId, outputs: Vec<Destination>) {
        self.0.insert(block.to_string(), OutputSpec { outputs });
    }

    pub fn contains_block(&self, block: &BlockId) -> bool {
        self.0.contains_key(block.as_str())
    }

    pub fn final_outputs(&self) -> Option<&[Destination]> {
        self.0.get(FINAL_KEY).map(|spec| spec.outputs.as_slice())
    }

    /// A copy carrying `final` as the fallback for terminal hops.
    pub fn with_final(&self, sink: Vec<Destination>) -> Self {
        let mut graph = self.clone();
        graph.0.insert(FINAL_KEY.to_string(), OutputSpec { outputs: sink });
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn destination_fields_fall_back_to_defaults() {
        let graph: PhysicalGraph = serde_json::from_value(json!({
            "blk-1": {"outputs": [{"host": "10.0.0.4"}]},
            "blk-2": {"outputs": []}
        }))
        .unwrap();

        let dest = &graph.get("blk-1").unwrap().outputs[0];
        assert_eq!(dest, &Destination::new("10.0.0.4", 6379, "OUTPUT"));
        assert_eq!(dest.endpoint(), "10.0.0.4:6379");
        assert!(graph.final_outputs().is_none());
    }

    #[test]
    fn with_final_adds_fallback_without_touching_blocks() {
        let mut graph = PhysicalGraph::new();
        graph.insert(&BlockId::new("blk-1"), vec![]);

        let routed = graph.with_final(vec![Destination::new("sink", 6380, "OUTPUTS")]);

        assert_eq!(routed.final_outputs(), Some(&[Destination::new("sink", 6380, "OUTPUTS")][..]));
        assert!(graph.final_outputs().is_none());
        assert_eq!(serde_json::to_value(&routed).unwrap()["final"]["outputs"][0]["queue_name"], json!("OUTPUTS"));
    }
}
