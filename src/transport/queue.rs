use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::domain::compiler::physical_graph::Destination;
use crate::error::{Error, Result};

/// Blocking list queue with LPUSH/BRPOP semantics: FIFO per queue name.
#[async_trait]
pub trait QueueClient: Send + Sync {
    async fn push(&self, queue: &str, payload: Vec<u8>) -> Result<()>;

    /// Waits up to `timeout` for an item.
    async fn pop(&self, queue: &str, timeout: Duration) -> Result<Option<Vec<u8>>>;
}

/// Opens a queue client for a routed destination.
#[async_trait]
pub trait QueueConnector: Send + Sync {
    async fn connect(&self, destination: &Destination) -> Result<Arc<dyn QueueClient>>;
}

/// Redis-backed queue. Pops block their connection, so they get their own.
pub struct RedisQueue {
    push_conn: MultiplexedConnection,
    pop_conn: MultiplexedConnection,
}

impl RedisQueue {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let push_conn = client.get_multiplexed_async_connection().await?;
        let pop_conn = client.get_multiplexed_async_connection().await?;

        log::debug!("Connected to queue endpoint {}.", url);
        Ok(RedisQueue { push_conn, pop_conn })
    }
}

#[async_trait]
impl QueueClient for RedisQueue {
    async fn push(&self, queue: &str, payload: Vec<u8>) -> Result<()> {
        let mut conn = self.push_conn.clone();
        let _length: i64 = redis::cmd("LPUSH").arg(queue).arg(payload).query_async(&mut conn).await?;
        Ok(())
    }

    async fn pop(&self, queue: &str, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let mut conn = self.pop_conn.clone();
        let secs = timeout.as_secs().max(1);
        let reply: Option<(String, Vec<u8>)> = redis::cmd("BRPOP").arg(queue).arg(secs).query_async(&mut conn).await?;
        Ok(reply.map(|(_, payload)| payload))
    }
}

pub struct RedisConnector;

#[async_trait]
impl QueueConnector for RedisConnector {
    async fn connect(&self, destination: &Destination) -> Result<Arc<dyn QueueClient>> {
        let url = format!("redis://{}:{}", destination.host, destination.port);
        Ok(Arc::new(RedisQueue::connect(&url).await?))
    }
}

/// In-process queue with the same ordering as [`RedisQueue`].
#[derive(Default)]
pub struct MemoryQueue {
    queues: Mutex<HashMap<String, VecDeque<Vec<u8>>>>,
    notify: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, queue: &str) -> usize {
        self.queues.lock().map(|q| q.get(queue).map_or(0, VecDeque::len)).unwrap_or(0)
    }

    /// Removes and returns everything queued, oldest first.
    pub fn drain(&self, queue: &str) -> Vec<Vec<u8>> {
        let mut drained = Vec::new();
        while let Ok(Some(item)) = self.try_pop(queue) {
            drained.push(item);
        }
        drained
    }

    fn try_pop(&self, queue: &str) -> Result<Option<Vec<u8>>> {
        let mut queues = self.queues.lock().map_err(|_| Error::Transport("queue lock poisoned".to_string()))?;
        Ok(queues.get_mut(queue).and_then(VecDeque::pop_back))
    }
}

#[async_trait]
impl QueueClient for MemoryQueue {
    async fn push(&self, queue: &str, payload: Vec<u8>) -> Result<()> {
        {
            let mut queues = self.queues.lock().map_err(|_| Error::Transport("queue lock poisoned".to_string()))?;
            queues.entry(queue.to_string()).or_default().push_front(payload);
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn pop(&self, queue: &str, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let deadline = Instant::now() + timeout;

        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.try_pop(queue)? {
                return Ok(Some(item));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            let _ = tokio::time::timeout(remaining, notified).await;
        }
    }
}

/// A set of [`MemoryQueue`]s addressed like Redis endpoints (`host:port`).
/// Endpoints can be marked unreachable to exercise delivery failures.
#[derive(Default)]
pub struct MemoryBroker {
    endpoints: Mutex<HashMap<String, Arc<MemoryQueue>>>,
    unreachable: Mutex<HashSet<String>>,
    connects: AtomicUsize,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// The queue server behind `host:port`, created on first use.
    pub fn endpoint(&self, host: &str, port: u16) -> Arc<MemoryQueue> {
        let key = format!("{}:{}", host, port);
        match self.endpoints.lock() {
            Ok(mut endpoints) => endpoints.entry(key).or_default().clone(),
            Err(_) => Arc::new(MemoryQueue::new()),
        }
    }

    pub fn set_unreachable(&self, host: &str, port: u16) {
        if let Ok(mut unreachable) = self.unreachable.lock() {
            unreachable.insert(format!("{}:{}", host, port));
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueueConnector for MemoryBroker {
    async fn connect(&self, destination: &Destination) -> Result<Arc<dyn QueueClient>> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        let endpoint = destination.endpoint();
        let refused = self.unreachable.lock().map(|u| u.contains(&endpoint)).unwrap_or(true);
        if refused {
            return Err(Error::Transport(format!("connection to {} refused", endpoint)));
        }
        Ok(self.endpoint(&destination.host, destination.port))
    }
}
