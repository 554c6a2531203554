//! WebSocket push subscription.

use std::time::Duration;

use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;

use super::ActorHandle;
use crate::model::lenient::lenient;
use crate::model::{TreeNode, TreeStats};
use crate::sync::SyncEvent;
use crate::util::with_timeout;
use crate::{clog, clog_debug, clog_trace, clog_warn, Error, Result};

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ConnectionStatus {
    #[serde(default, deserialize_with = "lenient")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub message: String,
    #[serde(default, deserialize_with = "lenient")]
    pub timestamp: Option<String>,
}

impl ConnectionStatus {
    /// Frames without an explicit status are sent on connect.
    pub fn is_connected(&self) -> bool {
        !matches!(
            self.status.as_deref(),
            Some("disconnected") | Some("error") | Some("closed")
        )
    }
}

/// Full tree replacement pushed by the backend.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct TreeUpdate {
    #[serde(default, deserialize_with = "lenient")]
    pub tree: Option<TreeNode>,
    #[serde(default, deserialize_with = "lenient")]
    pub stats: Option<TreeStats>,
    #[serde(default, deserialize_with = "lenient")]
    pub source: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PushMessage {
    ConnectionStatus(ConnectionStatus),
    TreeUpdate(TreeUpdate),
}

impl PushMessage {
    /// Decode one text frame. Unknown frame types yield `Ok(None)`.
    pub fn parse(text: &str) -> Result<Option<Self>> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::MalformedPayload(format!("push frame: {}", e)))?;
        let kind = value.get("type").and_then(Value::as_str).unwrap_or("");
        let data = value.get("data").cloned().unwrap_or(Value::Null);
        let data = if data.is_object() {
            data
        } else {
            Value::Object(Default::default())
        };
        match kind {
            "connection_status" => {
                let status = serde_json::from_value(data)
                    .map_err(|e| Error::MalformedPayload(format!("connection_status: {}", e)))?;
                Ok(Some(PushMessage::ConnectionStatus(status)))
            }
            "tree_update" => {
                let mut update: TreeUpdate = serde_json::from_value(data)
                    .map_err(|e| Error::MalformedPayload(format!("tree_update: {}", e)))?;
                if update.tree.as_ref().is_some_and(|t| !t.is_valid()) {
                    update.tree = None;
                }
                Ok(Some(PushMessage::TreeUpdate(update)))
            }
            other => {
                clog_debug!("PushActor: ignoring frame type {:?}", other);
                Ok(None)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    Message(PushMessage),
    /// The socket closed or could not be opened.
    Disconnected(String),
}

enum SessionEnd {
    Clean,
    Dropped(String),
    Cancelled,
}

/// Keeps one WebSocket subscription open and forwards its frames.
pub struct PushActor {
    url: String,
    tx: mpsc::UnboundedSender<SyncEvent>,
    reconnect_delay: Duration,
    connect_timeout: Duration,
    auto_reconnect: bool,
}

impl PushActor {
    pub fn new(url: &str, tx: mpsc::UnboundedSender<SyncEvent>) -> Self {
        Self {
            url: url.to_string(),
            tx,
            reconnect_delay: Duration::from_millis(5000),
            connect_timeout: Duration::from_secs(10),
            auto_reconnect: true,
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Reconnect after a non-clean close; off when auto-refresh is disabled.
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    fn emit(&self, event: PushEvent) -> bool {
        self.tx.send(SyncEvent::Push(event)).is_ok()
    }

    pub fn spawn(self) -> ActorHandle {
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();

        clog_debug!("PushActor::spawn url={}", self.url);

        tokio::spawn(async move {
            loop {
                let handshake = async {
                    connect_async(self.url.as_str()).await.map_err(Error::from)
                };
                let connect = tokio::select! {
                    _ = cancel_clone.cancelled() => break,
                    result = with_timeout(self.connect_timeout, handshake) => result,
                };

                match connect {
                    Ok((ws, _)) => {
                        clog!("PushActor: connected to {}", self.url);
                        match self.run_session(ws, &cancel_clone).await {
                            SessionEnd::Cancelled => break,
                            SessionEnd::Clean => {
                                clog!("PushActor: server closed the connection");
                                self.emit(PushEvent::Disconnected("closed".to_string()));
                                break;
                            }
                            SessionEnd::Dropped(reason) => {
                                clog_warn!("PushActor: connection dropped: {}", reason);
                                if !self.emit(PushEvent::Disconnected(reason)) {
                                    break;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        clog_warn!("PushActor: connect to {} failed: {}", self.url, e);
                        if !self.emit(PushEvent::Disconnected(e.to_string())) {
                            break;
                        }
                    }
                }

                if !self.auto_reconnect {
                    clog_debug!("PushActor: auto-refresh off, not reconnecting");
                    break;
                }
                tokio::select! {
                    _ = cancel_clone.cancelled() => break,
                    _ = tokio::time::sleep(self.reconnect_delay) => {
                        clog_debug!("PushActor: reconnecting");
                    }
                }
            }
            clog_debug!("PushActor stopped");
        });

        ActorHandle::new(cancel)
    }

    async fn run_session<S>(&self, mut ws: S, cancel: &CancellationToken) -> SessionEnd
    where
        S: futures::Stream<Item = std::result::Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
            + Unpin,
    {
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return SessionEnd::Cancelled,
                next = ws.next() => next,
            };
            match next {
                Some(Ok(WsMessage::Text(text))) => match PushMessage::parse(&text) {
                    Ok(Some(message)) => {
                        clog_trace!("PushActor: frame {:?}", message_kind(&message));
                        if !self.emit(PushEvent::Message(message)) {
                            return SessionEnd::Cancelled;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => clog_warn!("PushActor: {}", e),
                },
                Some(Ok(WsMessage::Close(_))) => return SessionEnd::Clean,
                Some(Ok(_)) => {}
                Some(Err(e)) => return SessionEnd::Dropped(e.to_string()),
                None => return SessionEnd::Dropped("stream ended".to_string()),
            }
        }
    }
}

fn message_kind(message: &PushMessage) -> &'static str {
    match message {
        PushMessage::ConnectionStatus(_) => "connection_status",
        PushMessage::TreeUpdate(_) => "tree_update",
    }
}
