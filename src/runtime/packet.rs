use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct FileInfo {
    pub metadata: String,
    pub file_data: Vec<u8>,
}

/// Unit of work moved between blocks. `output_ptr` carries the routing
/// envelope for the hop that produced it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Packet {
    pub session_id: String,
    pub seq_no: i64,
    pub data: String,
    pub ts: f64,
    pub frame_ptr: Vec<u8>,
    pub files: Vec<FileInfo>,
    pub output_ptr: String,
}

impl Packet {
    pub fn new(session_id: &str, seq_no: i64, data: &str) -> Self {
        Packet { session_id: session_id.to_string(), seq_no, data: data.to_string(), ..Default::default() }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}
