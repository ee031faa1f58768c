pub mod codec;
pub mod connection_cache;
pub mod queue;
