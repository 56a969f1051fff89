//! # WebSocket Connector
//!
//! [`WsConnector`] opens one `tokio-tungstenite` connection per `connect`
//! call and drives it from a dedicated task. The returned [`WsTransport`]
//! only queues requests for that task, so none of its methods block or fail.
//!
//! The task reports `Open` once the handshake completes and always finishes
//! with exactly one `Close`, whether the connection failed, the server went
//! away or the handle asked for it.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        handshake::client::Request,
        http::{header::SEC_WEBSOCKET_PROTOCOL, HeaderValue},
        protocol::Message as WsMessage,
    },
};

use crate::error::ProtocolError;
use crate::transport::protocol::{self, ClientMessage, ServerMessage, SubscriptionRequest};
use crate::transport::{Connector, EventSink, Transport, TransportEvent};
use crate::types::{ChannelId, SubscriptionId};

/// The WebSocket subprotocol the server must speak.
pub const SUBPROTOCOL: &str = "foxglove.websocket.v1";

/// Requests queued from the handle to the connection task.
#[derive(Debug)]
enum Outbound {
    Send(ClientMessage),
    Close,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WsConnector {
    fn connect(&self, url: &str, sink: EventSink) -> Box<dyn Transport> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_connection(url.to_string(), outbound_rx, sink));
        Box::new(WsTransport {
            outbound: outbound_tx,
            next_subscription_id: 0,
        })
    }
}

/// Handle to a connection task. Subscription ids are allocated locally and
/// grow monotonically for the lifetime of the connection.
#[derive(Debug)]
pub struct WsTransport {
    outbound: mpsc::UnboundedSender<Outbound>,
    next_subscription_id: SubscriptionId,
}

impl Transport for WsTransport {
    fn subscribe(&mut self, channel_id: ChannelId) -> SubscriptionId {
        let id = self.next_subscription_id;
        self.next_subscription_id = self.next_subscription_id.wrapping_add(1);
        let _ = self.outbound.send(Outbound::Send(ClientMessage::Subscribe {
            subscriptions: vec![SubscriptionRequest { id, channel_id }],
        }));
        id
    }

    fn unsubscribe(&mut self, subscription_id: SubscriptionId) {
        let _ = self.outbound.send(Outbound::Send(ClientMessage::Unsubscribe {
            subscription_ids: vec![subscription_id],
        }));
    }

    fn close(&mut self) {
        let _ = self.outbound.send(Outbound::Close);
    }
}

fn build_request(url: &str) -> Result<Request, ProtocolError> {
    let mut request = url.into_client_request()?;
    request
        .headers_mut()
        .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SUBPROTOCOL));
    Ok(request)
}

async fn run_connection(url: String, mut outbound: mpsc::UnboundedReceiver<Outbound>, sink: EventSink) {
    let request = match build_request(&url) {
        Ok(request) => request,
        Err(e) => {
            log::error!("Invalid WebSocket address {}: {}", url, e);
            sink.send(TransportEvent::Error(e.to_string()));
            sink.send(TransportEvent::Close {
                code: None,
                reason: e.to_string(),
            });
            return;
        }
    };

    log::info!("Connecting to {}", url);
    let ws_stream = match connect_async(request).await {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            log::error!("Failed to connect to {}: {}", url, e);
            sink.send(TransportEvent::Error(e.to_string()));
            sink.send(TransportEvent::Close {
                code: None,
                reason: e.to_string(),
            });
            return;
        }
    };

    log::info!("Connected to {}", url);
    sink.send(TransportEvent::Open);

    let (mut write, mut read) = ws_stream.split();
    let mut close = TransportEvent::Close {
        code: None,
        reason: "connection lost".to_string(),
    };

    loop {
        tokio::select! {
            request = outbound.recv() => {
                match request {
                    Some(Outbound::Send(message)) => {
                        let json = match message.to_json() {
                            Ok(json) => json,
                            Err(e) => {
                                log::error!("Failed to encode {:?}: {}", message, e);
                                continue;
                            }
                        };
                        log::debug!("Sending: {}", json);
                        if let Err(e) = write.send(WsMessage::Text(json.into())).await {
                            log::error!("Failed to send to {}: {}", url, e);
                            sink.send(TransportEvent::Error(e.to_string()));
                            break;
                        }
                    }
                    // Close request, or the handle was dropped
                    Some(Outbound::Close) | None => {
                        let _ = write.close().await;
                        close = TransportEvent::Close {
                            code: Some(1000),
                            reason: "closed by client".to_string(),
                        };
                        break;
                    }
                }
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        log::trace!("Received text frame: {}", text.as_str());
                        match ServerMessage::parse(text.as_str()) {
                            Ok(message) => {
                                if let Some(event) = message.into_event() {
                                    if !sink.send(event) {
                                        break;
                                    }
                                }
                            }
                            Err(e) => log::warn!("Ignoring control message from {}: {}", url, e),
                        }
                    }
                    Some(Ok(WsMessage::Binary(data))) => {
                        log::trace!("Received binary frame: {} bytes", data.len());
                        match protocol::parse_binary(data) {
                            Ok(event) => {
                                if !sink.send(event) {
                                    break;
                                }
                            }
                            Err(e) => log::warn!("Ignoring binary frame from {}: {}", url, e),
                        }
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        close = match frame {
                            Some(frame) => TransportEvent::Close {
                                code: Some(u16::from(frame.code)),
                                reason: frame.reason.as_str().to_string(),
                            },
                            None => TransportEvent::Close {
                                code: None,
                                reason: "closed by server".to_string(),
                            },
                        };
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        log::error!("WebSocket error from {}: {}", url, e);
                        sink.send(TransportEvent::Error(e.to_string()));
                        close = TransportEvent::Close {
                            code: None,
                            reason: e.to_string(),
                        };
                        break;
                    }
                    None => {
                        log::warn!("WebSocket stream from {} ended", url);
                        break;
                    }
                }
            }
        }
    }

    sink.send(close);
}
