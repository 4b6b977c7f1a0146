//! `WebSocket` endpoint bridging clients onto the topic broker.
//!
//! Clients connect to `GET /ws`, optionally with `?topics=a,b` to subscribe
//! on connect, and then send [`ClientCommand`] JSON text frames. Every
//! connection owns one bounded broker queue; the socket task drains it and
//! forwards each message as a JSON text frame. Unparseable commands get an
//! `error` message and the connection stays open.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use roadpulse_core::broker::{Broker, ConnectionHandle};
use roadpulse_types::{ClientCommand, ConnectionId, ErrorPayload, ServerMessage, Topic};
use tracing::{debug, warn};

use crate::state::AppState;

/// Query parameters accepted on the upgrade request.
#[derive(Debug, Default, serde::Deserialize)]
pub struct WsQuery {
    /// Comma-separated topics to join immediately.
    pub topics: Option<String>,
}

/// Upgrade an HTTP request to a `WebSocket` connection.
///
/// # Route
///
/// `GET /ws`
pub async fn ws_connect(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<WsQuery>,
) -> impl IntoResponse {
    let topics = parse_topics(params.topics.as_deref());
    ws.on_upgrade(move |socket| handle_ws(socket, state, topics))
}

/// Parse the `topics` query value, skipping unknown names.
pub fn parse_topics(raw: Option<&str>) -> Vec<Topic> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    let mut topics = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        match name.parse::<Topic>() {
            Ok(topic) if !topics.contains(&topic) => topics.push(topic),
            Ok(_) => {}
            Err(e) => debug!(error = %e, "Ignoring topic in connect query"),
        }
    }
    topics
}

/// Apply one client command and return the reply to send, if any.
///
/// Successful membership changes are silent; the snapshot that follows a new
/// subscription arrives through the connection queue.
pub async fn apply_command(broker: &Broker, conn: ConnectionId, text: &str) -> Option<ServerMessage> {
    let command = match serde_json::from_str::<ClientCommand>(text) {
        Ok(command) => command,
        Err(e) => return Some(error_message(format!("invalid command: {e}"))),
    };

    let result = match command {
        ClientCommand::Subscribe { topic } => broker.subscribe(conn, topic).await.map(|_| true),
        ClientCommand::Unsubscribe { topic } => broker.unsubscribe(conn, topic).await.map(|_| true),
        ClientCommand::Snapshot { topic } => broker.request_snapshot(conn, topic).await,
    };

    match result {
        Ok(true) => None,
        Ok(false) => Some(error_message(format!(
            "no snapshot available for {}",
            command_topic(command)
        ))),
        Err(e) => Some(error_message(e.to_string())),
    }
}

const fn command_topic(command: ClientCommand) -> Topic {
    match command {
        ClientCommand::Subscribe { topic }
        | ClientCommand::Unsubscribe { topic }
        | ClientCommand::Snapshot { topic } => topic,
    }
}

const fn error_message(message: String) -> ServerMessage {
    ServerMessage::Error(ErrorPayload { message })
}

type Sink = SplitSink<WebSocket, Message>;

async fn send_json(sink: &mut Sink, message: &ServerMessage) -> Result<(), axum::Error> {
    match serde_json::to_string(message) {
        Ok(json) => sink.send(Message::Text(json.into())).await,
        Err(e) => {
            warn!(event = message.event_name(), "Failed to serialize server message: {e}");
            Ok(())
        }
    }
}

/// Drive one connection: forward queued messages out, apply commands in,
/// and deregister from the broker when either side ends.
async fn handle_ws(socket: WebSocket, state: Arc<AppState>, initial: Vec<Topic>) {
    let ConnectionHandle { id, mut receiver } = state.broker.connect().await;
    debug!(connection_id = %id, "WebSocket client connected");

    for topic in initial {
        if let Err(e) = state.broker.subscribe(id, topic).await {
            debug!(connection_id = %id, error = %e, "Initial subscription failed");
        }
    }

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            // Messages routed to this connection by the broker.
            outbound = receiver.recv() => {
                let Some(message) = outbound else {
                    debug!(connection_id = %id, "Broker queue closed");
                    break;
                };
                if send_json(&mut sink, &message).await.is_err() {
                    debug!(connection_id = %id, "WebSocket client disconnected (send failed)");
                    break;
                }
            }
            // Frames from the client.
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let reply = apply_command(&state.broker, id, text.as_str()).await;
                        if let Some(reply) = reply {
                            if send_json(&mut sink, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sink.send(Message::Pong(data)).await.is_err() {
                            debug!(connection_id = %id, "WebSocket client disconnected (pong failed)");
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(connection_id = %id, "WebSocket client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        debug!(connection_id = %id, "WebSocket error: {e}");
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.broker.disconnect(id).await;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use roadpulse_core::cache::StateCache;

    use super::*;

    fn broker() -> Broker {
        Broker::new(Arc::new(StateCache::default()), 8)
    }

    #[test]
    fn topics_query_dedupes_and_skips_unknown() {
        let topics = parse_topics(Some("traffic-updates,bogus, traffic-updates,analytics-updates"));
        assert_eq!(topics, vec![Topic::TrafficUpdates, Topic::AnalyticsUpdates]);
        assert!(parse_topics(None).is_empty());
    }

    #[tokio::test]
    async fn subscribe_command_is_silent_and_queues_snapshot() {
        let broker = broker();
        let mut handle = broker.connect().await;
        let reply = apply_command(
            &broker,
            handle.id,
            r#"{"action":"subscribe","topic":"traffic-updates"}"#,
        )
        .await;
        assert!(reply.is_none());
        let snapshot = handle.receiver.try_recv().unwrap();
        assert_eq!(snapshot.event_name(), "initial-traffic-data");
    }

    #[tokio::test]
    async fn malformed_command_yields_error_message() {
        let broker = broker();
        let handle = broker.connect().await;
        let reply = apply_command(&broker, handle.id, "{not json").await;
        assert!(matches!(reply, Some(ServerMessage::Error(_))));
        assert_eq!(broker.connection_count().await, 1);
    }

    #[tokio::test]
    async fn analytics_snapshot_request_is_refused() {
        let broker = broker();
        let handle = broker.connect().await;
        let reply = apply_command(
            &broker,
            handle.id,
            r#"{"action":"snapshot","topic":"analytics-updates"}"#,
        )
        .await;
        assert!(matches!(
            reply,
            Some(ServerMessage::Error(ErrorPayload { ref message })) if message.contains("analytics-updates")
        ));
    }

    #[tokio::test]
    async fn unsubscribe_command_removes_membership() {
        let broker = broker();
        let handle = broker.connect().await;
        broker.subscribe(handle.id, Topic::IncidentUpdates).await.unwrap();
        let reply = apply_command(
            &broker,
            handle.id,
            r#"{"action":"unsubscribe","topic":"incident-updates"}"#,
        )
        .await;
        assert!(reply.is_none());
        assert!(broker.topics(handle.id).await.unwrap().is_empty());
    }
}
