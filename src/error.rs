use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid vDAG definition: {0}")]
    Validation(String),

    #[error("Assignment failed for node {node} of vDAG {vdag}: {reason}")]
    Assignment { node: String, vdag: String, reason: String },

    #[error("Sub-vDAG composition failed: {0}")]
    Composition(String),

    #[error("vDAG {vdag} already exists with status {status}")]
    Conflict { vdag: String, status: String },

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Routing failed: {0}")]
    Routing(String),

    #[error("Policy evaluation failed: {0}")]
    Policy(String),

    #[error("Packet codec failure: {0}")]
    Codec(String),

    #[error("File not found or could not be read: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse JSON: {0}")]
    DeserializationError(#[from] serde_json::Error),
}

impl Error {
    /// Stable label used in API error bodies and task status data.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation_error",
            Error::Assignment { .. } => "assignment_error",
            Error::Composition(_) => "composition_error",
            Error::Conflict { .. } => "conflict_error",
            Error::Transport(_) => "transport_error",
            Error::NotFound(_) => "not_found",
            Error::Routing(_) => "routing_error",
            Error::Policy(_) => "policy_error",
            Error::Codec(_) => "codec_error",
            Error::IoError(_) => "io_error",
            Error::DeserializationError(_) => "deserialization_error",
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::Transport(e.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Codec(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
