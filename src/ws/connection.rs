//! WebSocket connection state machine.
//!
//! Handles the read/write loop for a single WebSocket connection,
//! dispatching incoming commands and forwarding relayed events from the
//! connection's bounded queue.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::mpsc;

use super::messages::{WsCommand, WsMessage};
use super::subscription::SubscriptionManager;
use crate::domain::ChannelName;
use crate::error::RealtimeError;
use crate::service::{EventSink, RealtimeService, RelayEvent};

/// Runs the read/write loop for a single WebSocket connection.
///
/// - Reads commands from the client and dispatches them.
/// - Forwards relayed events queued by this connection's subscriptions.
///
/// Every subscription the client created is released when the loop ends.
pub async fn run_connection(socket: WebSocket, service: Arc<RealtimeService>, capacity: usize) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (event_tx, mut event_rx) = mpsc::channel::<RelayEvent>(capacity.max(1));
    let mut subs = SubscriptionManager::new();

    loop {
        tokio::select! {
            // Incoming message from client
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let response = handle_text_message(&text, &service, &event_tx, &mut subs);
                        if let Some(resp_json) = response
                            && ws_tx.send(Message::text(resp_json)).await.is_err() {
                                break;
                            }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(err)) => {
                        tracing::debug!(error = %err, "ws read failed");
                        break;
                    }
                    _ => {}
                }
            }
            // Event relayed by one of this connection's subscriptions
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let json = match encode_event(&event) {
                    Ok(json) => json,
                    Err(err) => {
                        tracing::error!(channel = %event.channel, error = %err, "dropping relay event");
                        continue;
                    }
                };
                if ws_tx.send(Message::text(json)).await.is_err() {
                    break;
                }
            }
        }
    }

    let released = subs.count();
    subs.clear();
    tracing::debug!(released, "ws connection closed");
}

/// Wraps a relayed event in an `event` envelope.
fn encode_event(event: &RelayEvent) -> Result<String, RealtimeError> {
    let payload = serde_json::to_value(event)
        .map_err(|err| RealtimeError::Internal(format!("relay event encoding: {err}")))?;
    WsMessage::event(payload)
        .to_json()
        .ok_or_else(|| RealtimeError::Internal("event envelope encoding".to_string()))
}

/// Handles a text message from the client, returning an optional JSON response.
pub(crate) fn handle_text_message(
    text: &str,
    service: &RealtimeService,
    sink: &EventSink,
    subs: &mut SubscriptionManager,
) -> Option<String> {
    let Ok(msg) = serde_json::from_str::<WsMessage>(text) else {
        return WsMessage::error(String::new(), 400, "malformed JSON").to_json();
    };

    let name = msg
        .payload
        .get("command")
        .and_then(Value::as_str)
        .map(str::to_owned);
    let command = match serde_json::from_value::<WsCommand>(msg.payload) {
        Ok(command) => command,
        Err(err) => {
            let reply = match name {
                Some(name) if WsCommand::is_known(&name) => {
                    WsMessage::error(msg.id, 400, format!("invalid {name} command: {err}"))
                }
                _ => WsMessage::error(msg.id, 404, format!("unknown command: {err}")),
            };
            return reply.to_json();
        }
    };

    let reply = match command {
        WsCommand::Subscribe { channel } => match service.subscribe(channel, sink.clone()) {
            Ok(subscription) => {
                let name = subscription.channel_name().to_string();
                let added = subs.add(subscription);
                WsMessage::response(
                    msg.id,
                    json!({
                        "subscribed": name,
                        "already_subscribed": !added,
                        "count": subs.count(),
                    }),
                )
            }
            Err(err) => {
                tracing::debug!(error = %err, "ws subscribe rejected");
                WsMessage::error(msg.id, err.error_code(), err.to_string())
            }
        },
        WsCommand::Unsubscribe { channel_name } => match ChannelName::new(channel_name) {
            Ok(name) if subs.remove(&name) => WsMessage::response(
                msg.id,
                json!({
                    "unsubscribed": name,
                    "remaining_count": subs.count(),
                }),
            ),
            Ok(name) => WsMessage::error(msg.id, 2001, format!("not subscribed to {name}")),
            Err(err) => WsMessage::error(msg.id, err.error_code(), err.to_string()),
        },
        WsCommand::ListSubscriptions => {
            WsMessage::response(msg.id, json!({ "channels": subs.names() }))
        }
    };
    reply.to_json()
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::domain::RowChange;
    use crate::realtime::RetryPolicy;
    use crate::realtime::test_support::eventually;
    use crate::transport::InMemoryTransport;

    fn service() -> RealtimeService {
        RealtimeService::new(InMemoryTransport::new(), RetryPolicy::disabled(), "public")
    }

    fn send(
        text: &str,
        service: &RealtimeService,
        sink: &EventSink,
        subs: &mut SubscriptionManager,
    ) -> Value {
        let Some(reply) = handle_text_message(text, service, sink, subs) else {
            panic!("expected reply");
        };
        let Ok(value) = serde_json::from_str(&reply) else {
            panic!("reply should be json");
        };
        value
    }

    fn command(id: &str, payload: &Value) -> String {
        json!({
            "id": id,
            "type": "command",
            "timestamp": "2026-01-01T00:00:00Z",
            "payload": payload,
        })
        .to_string()
    }

    #[tokio::test]
    async fn subscribe_then_unsubscribe() {
        let service = service();
        let (tx, _rx) = mpsc::channel(4);
        let mut subs = SubscriptionManager::new();

        let reply = send(
            &command(
                "c1",
                &json!({"command": "subscribe", "channel": {"adapter": "trip", "trip_id": "T1"}}),
            ),
            &service,
            &tx,
            &mut subs,
        );
        assert_eq!(reply.get("type"), Some(&json!("response")));
        assert_eq!(reply.get("id"), Some(&json!("c1")));
        assert_eq!(reply.pointer("/payload/subscribed"), Some(&json!("trip-T1")));
        assert_eq!(service.pool().len(), 1);

        let reply = send(
            &command("c2", &json!({"command": "list_subscriptions"})),
            &service,
            &tx,
            &mut subs,
        );
        assert_eq!(reply.pointer("/payload/channels"), Some(&json!(["trip-T1"])));

        let reply = send(
            &command("c3", &json!({"command": "unsubscribe", "channel_name": "trip-T1"})),
            &service,
            &tx,
            &mut subs,
        );
        assert_eq!(reply.pointer("/payload/remaining_count"), Some(&json!(0)));
        assert!(service.pool().is_empty());

        let reply = send(
            &command("c4", &json!({"command": "unsubscribe", "channel_name": "trip-T1"})),
            &service,
            &tx,
            &mut subs,
        );
        assert_eq!(reply.get("type"), Some(&json!("error")));
        assert_eq!(reply.pointer("/payload/code"), Some(&json!(2001)));
    }

    #[tokio::test]
    async fn bad_input_yields_errors() {
        let service = service();
        let (tx, _rx) = mpsc::channel(4);
        let mut subs = SubscriptionManager::new();

        let reply = send("not json", &service, &tx, &mut subs);
        assert_eq!(reply.pointer("/payload/code"), Some(&json!(400)));

        let reply = send(&command("c1", &json!({"command": "swap"})), &service, &tx, &mut subs);
        assert_eq!(reply.pointer("/payload/code"), Some(&json!(404)));

        let reply = send(
            &command(
                "c1b",
                &json!({"command": "subscribe", "channel": {"adapter": "ferry", "ferry_id": "F1"}}),
            ),
            &service,
            &tx,
            &mut subs,
        );
        assert_eq!(reply.pointer("/payload/code"), Some(&json!(400)));
        assert_eq!(reply.get("id"), Some(&json!("c1b")));

        let reply = send(
            &command(
                "c2",
                &json!({"command": "subscribe", "channel": {"adapter": "booking", "booking_id": ""}}),
            ),
            &service,
            &tx,
            &mut subs,
        );
        assert_eq!(reply.pointer("/payload/code"), Some(&json!(1001)));
        assert!(service.pool().is_empty());
    }

    #[test]
    fn relay_event_envelope() {
        let Ok(channel) = ChannelName::new("trip-T1") else {
            panic!("valid name");
        };
        let Ok(text) = encode_event(&RelayEvent {
            channel,
            event: json!({"id": "T1"}),
        }) else {
            panic!("event should encode");
        };
        let Ok(value) = serde_json::from_str::<Value>(&text) else {
            panic!("valid json");
        };
        assert_eq!(value.get("type"), Some(&json!("event")));
        assert_eq!(value.pointer("/payload/channel"), Some(&json!("trip-T1")));
        assert_eq!(value.pointer("/payload/event/id"), Some(&json!("T1")));
    }

    #[tokio::test]
    async fn resubscribe_after_forced_close_receives_events() {
        let service = service();
        let (tx, mut rx) = mpsc::channel(4);
        let mut subs = SubscriptionManager::new();
        let subscribe = command(
            "c1",
            &json!({"command": "subscribe", "channel": {"adapter": "trip", "trip_id": "T1"}}),
        );

        send(&subscribe, &service, &tx, &mut subs);
        assert!(service.close_channel("trip-T1").is_ok());

        let reply = send(&subscribe, &service, &tx, &mut subs);
        assert_eq!(reply.pointer("/payload/already_subscribed"), Some(&json!(false)));
        assert_eq!(reply.pointer("/payload/count"), Some(&json!(1)));
        assert_eq!(service.pool().len(), 1);

        assert!(
            eventually(|| service
                .channel("trip-T1")
                .is_ok_and(|c| c.listeners == 1 && c.state.is_subscribed()))
            .await
        );

        let reached = service.ingest(&RowChange::update(
            "trips",
            json!({"id": "T1", "status": "done"}),
            json!({"id": "T1", "status": "ongoing"}),
        ));
        assert_eq!(reached, 1);
        let Ok(Some(event)) = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await else {
            panic!("expected relayed event");
        };
        assert_eq!(event.channel.as_str(), "trip-T1");
    }
}
