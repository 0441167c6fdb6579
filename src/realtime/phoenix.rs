//! Websocket client for the hosted realtime service (Phoenix channel protocol).
//!
//! One socket per subscription. The feed task joins the channel with a
//! `postgres_changes` filter, keeps it alive with heartbeats, forwards row
//! changes, and reconnects with a fixed delay when the socket drops. Leaving
//! is explicit (`phx_leave`) when the subscription is released.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::{
    ChannelSpec, RealtimeConnector, RealtimeMessage, RowChange, SUBSCRIPTION_BUFFER, Subscription,
};
use crate::errors::RealtimeError;

/// Interval between Phoenix heartbeats.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

/// A heartbeat without a reply for this long means the socket is dead.
const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(60);

/// Wait before reconnecting after the socket drops.
const RECONNECT_DELAY: Duration = Duration::from_secs(3);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One frame of the Phoenix v1 JSON protocol.
#[derive(Debug, Serialize, Deserialize)]
struct Frame {
    topic: String,
    event: String,
    #[serde(default)]
    payload: serde_json::Value,
    #[serde(rename = "ref", default)]
    reference: Option<String>,
}

pub struct PhoenixRealtime {
    url: String,
    access_token: RwLock<Option<String>>,
}

impl PhoenixRealtime {
    /// `url` is the full websocket endpoint including `apikey` and `vsn`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            access_token: RwLock::new(None),
        }
    }

    fn current_token(&self) -> Option<String> {
        self.access_token.read().ok().and_then(|t| t.clone())
    }
}

#[async_trait]
impl RealtimeConnector for PhoenixRealtime {
    async fn subscribe(&self, spec: ChannelSpec) -> Result<Subscription, RealtimeError> {
        let (socket, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| RealtimeError::Connect(e.to_string()))?;
        tracing::info!(topic = %spec.topic(), "realtime socket connected");

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let feed = Feed {
            url: self.url.clone(),
            spec,
            token: self.current_token(),
            tx,
            next_ref: 0,
        };
        let task = tokio::spawn(feed.run(socket, shutdown_rx));
        Ok(Subscription::new(spec.topic(), rx, shutdown_tx, task))
    }

    /// Sent on join so row-level security applies to the feed.
    fn set_access_token(&self, token: Option<String>) {
        if let Ok(mut guard) = self.access_token.write() {
            *guard = token;
        }
    }
}

/// Why one connection's loop ended.
enum LoopExit {
    Shutdown,
    Disconnected,
    Fatal,
}

struct Feed {
    url: String,
    spec: ChannelSpec,
    token: Option<String>,
    tx: mpsc::Sender<RealtimeMessage>,
    next_ref: u64,
}

impl Feed {
    async fn run(mut self, socket: Socket, mut shutdown: oneshot::Receiver<()>) {
        let mut socket = Some(socket);
        loop {
            let exit = match socket.take() {
                Some(ws) => self.drive(ws, &mut shutdown).await,
                None => LoopExit::Disconnected,
            };
            match exit {
                LoopExit::Shutdown | LoopExit::Fatal => break,
                LoopExit::Disconnected => {
                    tracing::warn!(topic = %self.spec.topic(), "realtime socket dropped; reconnecting");
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                    }
                    match connect_async(self.url.as_str()).await {
                        Ok((ws, _)) => socket = Some(ws),
                        Err(e) => {
                            tracing::warn!(error = %e, "realtime reconnect failed");
                        }
                    }
                }
            }
        }
        let _ = self.tx.send(RealtimeMessage::Closed).await;
    }

    fn make_ref(&mut self) -> String {
        self.next_ref += 1;
        self.next_ref.to_string()
    }

    fn join_frame(&mut self) -> Frame {
        let mut payload = json!({
            "config": {
                "broadcast": {"self": false},
                "presence": {"key": ""},
                "postgres_changes": [{
                    "event": "*",
                    "schema": "public",
                    "table": "tasks",
                    "filter": self.spec.filter(),
                }],
            },
        });
        if let Some(token) = &self.token {
            payload["access_token"] = json!(token);
        }
        Frame {
            topic: self.spec.topic(),
            event: "phx_join".into(),
            payload,
            reference: Some(self.make_ref()),
        }
    }

    async fn send(sink: &mut SplitSink<Socket, Message>, frame: &Frame) -> bool {
        match serde_json::to_string(frame) {
            Ok(text) => sink.send(Message::text(text)).await.is_ok(),
            Err(e) => {
                tracing::error!(error = %e, "failed to encode realtime frame");
                false
            }
        }
    }

    async fn leave(&mut self, sink: &mut SplitSink<Socket, Message>) {
        let leave = Frame {
            topic: self.spec.topic(),
            event: "phx_leave".into(),
            payload: json!({}),
            reference: Some(self.make_ref()),
        };
        let _ = Self::send(sink, &leave).await;
        let _ = sink.send(Message::Close(None)).await;
    }

    /// Join, then pump frames until shutdown or disconnect.
    async fn drive(&mut self, socket: Socket, shutdown: &mut oneshot::Receiver<()>) -> LoopExit {
        let (mut sink, mut stream) = socket.split();
        let join = self.join_frame();
        let join_ref = join.reference.clone();
        if !Self::send(&mut sink, &join).await {
            return LoopExit::Disconnected;
        }

        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        // The first tick completes immediately.
        heartbeat.tick().await;
        let mut last_reply = tokio::time::Instant::now();

        loop {
            tokio::select! {
                _ = &mut *shutdown => {
                    self.leave(&mut sink).await;
                    return LoopExit::Shutdown;
                }

                _ = heartbeat.tick() => {
                    if last_reply.elapsed() > HEARTBEAT_TIMEOUT {
                        return LoopExit::Disconnected;
                    }
                    let beat = Frame {
                        topic: "phoenix".into(),
                        event: "heartbeat".into(),
                        payload: json!({}),
                        reference: Some(self.make_ref()),
                    };
                    if !Self::send(&mut sink, &beat).await {
                        return LoopExit::Disconnected;
                    }
                }

                msg = stream.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            last_reply = tokio::time::Instant::now();
                            match self.handle_text(text.as_str(), join_ref.as_deref()).await {
                                Some(LoopExit::Shutdown) => {
                                    self.leave(&mut sink).await;
                                    return LoopExit::Shutdown;
                                }
                                Some(exit) => return exit,
                                None => continue,
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => return LoopExit::Disconnected,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "realtime socket error");
                            return LoopExit::Disconnected;
                        }
                    }
                }
            }
        }
    }

    async fn handle_text(&mut self, text: &str, join_ref: Option<&str>) -> Option<LoopExit> {
        let frame: Frame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(error = %e, "ignoring unparseable realtime frame");
                return None;
            }
        };

        let forwarded = match frame.event.as_str() {
            "phx_reply" if frame.reference.as_deref() == join_ref => {
                if frame.payload["status"] == "ok" {
                    tracing::info!(topic = %frame.topic, "realtime channel joined");
                    Some(RealtimeMessage::Joined)
                } else {
                    tracing::error!(response = %frame.payload["response"], "realtime join rejected");
                    return Some(LoopExit::Fatal);
                }
            }
            "postgres_changes" => {
                let data = frame.payload.get("data").cloned().unwrap_or_default();
                match serde_json::from_value::<RowChange>(data) {
                    Ok(change) => change.into_event().map(RealtimeMessage::Change),
                    Err(e) => {
                        tracing::debug!(error = %e, "ignoring malformed change payload");
                        None
                    }
                }
            }
            "phx_error" | "phx_close" if frame.topic == self.spec.topic() => {
                return Some(LoopExit::Disconnected);
            }
            _ => None,
        };

        if let Some(message) = forwarded {
            if self.tx.send(message).await.is_err() {
                // Receiver gone: nobody is listening any more.
                return Some(LoopExit::Shutdown);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn feed() -> (Feed, mpsc::Receiver<RealtimeMessage>) {
        let (tx, rx) = mpsc::channel(8);
        let feed = Feed {
            url: "ws://127.0.0.1:1/realtime/v1/websocket".into(),
            spec: ChannelSpec::for_project(Uuid::nil()),
            token: Some("user-token".into()),
            tx,
            next_ref: 0,
        };
        (feed, rx)
    }

    #[test]
    fn test_join_frame_carries_filter_and_token() {
        let (mut feed, _rx) = feed();
        let frame = feed.join_frame();
        assert_eq!(frame.event, "phx_join");
        assert_eq!(frame.reference.as_deref(), Some("1"));
        let change = &frame.payload["config"]["postgres_changes"][0];
        assert_eq!(change["table"], "tasks");
        assert_eq!(change["filter"], format!("project_id=eq.{}", Uuid::nil()));
        assert_eq!(frame.payload["access_token"], "user-token");
    }

    #[tokio::test]
    async fn test_join_reply_ok_forwards_joined() {
        let (mut feed, mut rx) = feed();
        let reply = json!({
            "topic": feed.spec.topic(),
            "event": "phx_reply",
            "payload": {"status": "ok", "response": {}},
            "ref": "1"
        })
        .to_string();
        assert!(feed.handle_text(&reply, Some("1")).await.is_none());
        assert_eq!(rx.recv().await, Some(RealtimeMessage::Joined));
    }

    #[tokio::test]
    async fn test_join_reply_error_is_fatal() {
        let (mut feed, _rx) = feed();
        let reply = json!({
            "topic": feed.spec.topic(),
            "event": "phx_reply",
            "payload": {"status": "error", "response": {"reason": "unauthorized"}},
            "ref": "1"
        })
        .to_string();
        assert!(matches!(
            feed.handle_text(&reply, Some("1")).await,
            Some(LoopExit::Fatal)
        ));
    }

    #[tokio::test]
    async fn test_postgres_change_is_forwarded() {
        let (mut feed, mut rx) = feed();
        let id = Uuid::new_v4();
        let frame = json!({
            "topic": feed.spec.topic(),
            "event": "postgres_changes",
            "payload": {"data": {"type": "DELETE", "old_record": {"id": id}}},
            "ref": null
        })
        .to_string();
        assert!(feed.handle_text(&frame, Some("1")).await.is_none());
        match rx.recv().await {
            Some(RealtimeMessage::Change(event)) => assert_eq!(event.task_id(), id),
            other => panic!("expected change, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_heartbeat_reply_is_ignored() {
        let (mut feed, mut rx) = feed();
        let frame = json!({
            "topic": "phoenix",
            "event": "phx_reply",
            "payload": {"status": "ok"},
            "ref": "7"
        })
        .to_string();
        assert!(feed.handle_text(&frame, Some("1")).await.is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_channel_error_disconnects() {
        let (mut feed, _rx) = feed();
        let frame = json!({
            "topic": feed.spec.topic(),
            "event": "phx_error",
            "payload": {},
            "ref": null
        })
        .to_string();
        assert!(matches!(
            feed.handle_text(&frame, Some("1")).await,
            Some(LoopExit::Disconnected)
        ));
    }

    #[tokio::test]
    async fn test_closed_receiver_releases_parked_send() {
        let (mut feed, mut rx) = feed();
        for _ in 0..8 {
            feed.tx.try_send(RealtimeMessage::Joined).unwrap();
        }
        let closer = tokio::spawn(async move {
            tokio::task::yield_now().await;
            rx.close();
            rx
        });
        let frame = json!({
            "topic": feed.spec.topic(),
            "event": "postgres_changes",
            "payload": {"data": {"type": "DELETE", "old_record": {"id": Uuid::new_v4()}}},
            "ref": null
        })
        .to_string();
        let exit = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            feed.handle_text(&frame, Some("1")),
        )
        .await
        .expect("send stayed parked after the receiver closed");
        assert!(matches!(exit, Some(LoopExit::Shutdown)));
        closer.await.unwrap();
    }

    #[tokio::test]
    async fn test_subscribe_to_unreachable_host_fails() {
        let realtime = PhoenixRealtime::new("ws://127.0.0.1:1/realtime/v1/websocket");
        let result = realtime.subscribe(ChannelSpec::for_project(Uuid::nil())).await;
        assert!(matches!(result, Err(RealtimeError::Connect(_))));
    }
}
