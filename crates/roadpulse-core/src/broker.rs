//! Topic-based subscription broker.
//!
//! Each live observer is a connection with a bounded outbound queue and a set
//! of subscribed [`Topic`]s. Publishing never waits on a consumer: a full
//! queue loses the message for that connection only, and a closed queue
//! unregisters the connection.
//!
//! # Snapshot ordering
//!
//! [`Broker::subscribe`] holds a read guard on the [`StateCache`] while it
//! builds the topic snapshot, enqueues it and inserts the membership. Ticks
//! publish while holding the cache write guard, so each tick is either in the
//! snapshot or delivered live after it, never both and never neither.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use roadpulse_types::{ConnectionId, ServerMessage, Topic};
use tokio::sync::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::cache::{CacheContents, StateCache};

/// Default capacity of a connection's outbound queue.
pub const DEFAULT_CONNECTION_BUFFER: usize = 64;

/// Messages as they travel through a connection queue.
pub type Outbound = Arc<ServerMessage>;

/// Errors returned by broker operations on a single connection.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// The connection is not (or no longer) registered.
    #[error("unknown connection: {0}")]
    UnknownConnection(ConnectionId),
}

/// Receiving side of a registered connection.
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Broker-assigned identifier.
    pub id: ConnectionId,
    /// Messages addressed to this connection.
    pub receiver: mpsc::Receiver<Outbound>,
}

/// Outcome of a [`Broker::publish`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Members whose queue accepted the message.
    pub delivered: usize,
    /// Members whose queue was full.
    pub dropped: usize,
    /// Members whose queue was closed and that were removed.
    pub closed: usize,
}

#[derive(Debug)]
struct Connection {
    sender: mpsc::Sender<Outbound>,
    topics: BTreeSet<Topic>,
}

/// Registry of connections and their topic memberships.
#[derive(Debug)]
pub struct Broker {
    cache: Arc<StateCache>,
    connections: RwLock<HashMap<ConnectionId, Connection>>,
    buffer: usize,
}

impl Broker {
    /// Create a broker reading snapshots from `cache`.
    ///
    /// `buffer` is the per-connection queue capacity; zero is raised to one.
    pub fn new(cache: Arc<StateCache>, buffer: usize) -> Self {
        Self {
            cache,
            connections: RwLock::new(HashMap::new()),
            buffer: buffer.max(1),
        }
    }

    /// The cache snapshots are taken from.
    pub const fn cache(&self) -> &Arc<StateCache> {
        &self.cache
    }

    /// Register a new connection with no subscriptions.
    pub async fn connect(&self) -> ConnectionHandle {
        let (sender, receiver) = mpsc::channel(self.buffer);
        let id = ConnectionId::new();
        self.connections.write().await.insert(
            id,
            Connection {
                sender,
                topics: BTreeSet::new(),
            },
        );
        debug!(connection_id = %id, "Connection registered");
        ConnectionHandle { id, receiver }
    }

    /// Join `topic`. Returns `true` if the membership is new.
    ///
    /// A new membership is preceded by the topic snapshot, if the topic has
    /// one. Subscribing again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::UnknownConnection`] if `conn` is not registered.
    pub async fn subscribe(&self, conn: ConnectionId, topic: Topic) -> Result<bool, BrokerError> {
        let contents = self.cache.read().await;
        let mut connections = self.connections.write().await;
        let connection = connections
            .get_mut(&conn)
            .ok_or(BrokerError::UnknownConnection(conn))?;

        if connection.topics.contains(&topic) {
            return Ok(false);
        }

        enqueue_snapshot(conn, &connection.sender, &contents, topic);
        connection.topics.insert(topic);
        drop(connections);
        drop(contents);

        debug!(connection_id = %conn, %topic, "Subscribed");
        Ok(true)
    }

    /// Leave `topic`. Returns `true` if a membership was removed.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::UnknownConnection`] if `conn` is not registered.
    pub async fn unsubscribe(
        &self,
        conn: ConnectionId,
        topic: Topic,
    ) -> Result<bool, BrokerError> {
        let mut connections = self.connections.write().await;
        let connection = connections
            .get_mut(&conn)
            .ok_or(BrokerError::UnknownConnection(conn))?;
        let removed = connection.topics.remove(&topic);
        if removed {
            debug!(connection_id = %conn, %topic, "Unsubscribed");
        }
        Ok(removed)
    }

    /// Push the topic snapshot without touching memberships.
    ///
    /// Returns `false` for topics without a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::UnknownConnection`] if `conn` is not registered.
    pub async fn request_snapshot(
        &self,
        conn: ConnectionId,
        topic: Topic,
    ) -> Result<bool, BrokerError> {
        let contents = self.cache.read().await;
        let connections = self.connections.read().await;
        let connection = connections
            .get(&conn)
            .ok_or(BrokerError::UnknownConnection(conn))?;
        Ok(enqueue_snapshot(conn, &connection.sender, &contents, topic))
    }

    /// Unregister a connection and all of its memberships. Idempotent.
    pub async fn disconnect(&self, conn: ConnectionId) {
        if self.connections.write().await.remove(&conn).is_some() {
            debug!(connection_id = %conn, "Connection removed");
        }
    }

    /// Deliver `message` once to every current member of `topic`.
    pub async fn publish(&self, topic: Topic, message: ServerMessage) -> PublishReport {
        let message = Arc::new(message);
        let mut report = PublishReport::default();
        let mut closed = Vec::new();

        {
            let connections = self.connections.read().await;
            for (id, connection) in connections.iter() {
                if !connection.topics.contains(&topic) {
                    continue;
                }
                match connection.sender.try_send(Arc::clone(&message)) {
                    Ok(()) => report.delivered = report.delivered.saturating_add(1),
                    Err(TrySendError::Full(_)) => {
                        report.dropped = report.dropped.saturating_add(1);
                        warn!(connection_id = %id, %topic, "Outbound queue full, message dropped");
                    }
                    Err(TrySendError::Closed(_)) => closed.push(*id),
                }
            }
        }

        if !closed.is_empty() {
            let mut connections = self.connections.write().await;
            for id in &closed {
                connections.remove(id);
                debug!(connection_id = %id, "Removed closed connection");
            }
            report.closed = closed.len();
        }

        report
    }

    /// Topics `conn` is subscribed to, or `None` if it is not registered.
    pub async fn topics(&self, conn: ConnectionId) -> Option<BTreeSet<Topic>> {
        self.connections
            .read()
            .await
            .get(&conn)
            .map(|c| c.topics.clone())
    }

    /// Number of registered connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Number of connections subscribed to `topic`.
    pub async fn subscriber_count(&self, topic: Topic) -> usize {
        self.connections
            .read()
            .await
            .values()
            .filter(|c| c.topics.contains(&topic))
            .count()
    }
}

fn enqueue_snapshot(
    conn: ConnectionId,
    sender: &mpsc::Sender<Outbound>,
    contents: &CacheContents,
    topic: Topic,
) -> bool {
    let Some(message) = contents.snapshot_message(topic, Utc::now()) else {
        return false;
    };
    match sender.try_send(Arc::new(message)) {
        Ok(()) => true,
        Err(err) => {
            warn!(connection_id = %conn, %topic, error = %err, "Snapshot not delivered");
            false
        }
    }
}
