use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::domain::compiler::physical_graph::Destination;
use crate::domain::utils::cache::TtlCache;
use crate::error::{Error, Result};
use crate::transport::queue::{QueueClient, QueueConnector};

/// Queue connections shared by every packet a block forwards, keyed `host:port`.
pub struct ConnectionCache {
    connector: Arc<dyn QueueConnector>,
    connections: Mutex<TtlCache<String, Arc<dyn QueueClient>>>,
}

impl ConnectionCache {
    pub fn new(connector: Arc<dyn QueueConnector>, capacity: usize, ttl: Option<Duration>) -> Self {
        ConnectionCache { connector, connections: Mutex::new(TtlCache::new(capacity, ttl)) }
    }

    pub async fn get(&self, destination: &Destination) -> Result<Arc<dyn QueueClient>> {
        if destination.port == 0 {
            return Err(Error::Transport(format!(
                "destination {} uses port 0 (gRPC), which is not supported",
                destination.host
            )));
        }

        let key = destination.endpoint();
        let mut connections = self.connections.lock().await;
        if let Some(client) = connections.get(&key) {
            return Ok(client);
        }

        log::debug!("Opening queue connection to {}.", key);
        let client = self.connector.connect(destination).await?;
        connections.insert(key, client.clone());
        Ok(client)
    }

    /// Drops a connection that failed so the next packet reconnects.
    pub async fn invalidate(&self, destination: &Destination) {
        self.connections.lock().await.invalidate(&destination.endpoint());
    }

    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }
}
