pub mod block_graph;
pub mod compiled;
pub mod compiler;
pub mod physical_graph;
