//! Runs the player against a real local WebSocket server.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{channel, collector, message_count, point_bytes, wait_for};
use futures_util::{SinkExt, StreamExt};
use lib_player::transport::protocol::encode_message_data;
use lib_player::{
    Connector, EventSink, NoopMetricsCollector, PlayerOptions, PlayerPresence, Time, Transport, WebSocketPlayer,
    WsConnector,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{header::SEC_WEBSOCKET_PROTOCOL, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;

/// Accepts one client, advertises `/a`, waits for its subscription and
/// answers with a single message stamped at one second.
async fn serve_one_client(listener: TcpListener) {
    let (stream, _) = listener.accept().await.unwrap();
    let callback = |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
        assert_eq!(
            request.headers().get(SEC_WEBSOCKET_PROTOCOL).unwrap(),
            "foxglove.websocket.v1"
        );
        response
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("foxglove.websocket.v1"));
        Ok(response)
    };
    let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback).await.unwrap();

    let server_info = json!({"op": "serverInfo", "name": "test server", "capabilities": []});
    ws.send(WsMessage::Text(server_info.to_string().into())).await.unwrap();
    let advertise = json!({"op": "advertise", "channels": [channel(1, "/a")]});
    ws.send(WsMessage::Text(advertise.to_string().into())).await.unwrap();

    let subscription_id = loop {
        match ws.next().await {
            Some(Ok(WsMessage::Text(text))) => {
                let request: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
                if request["op"] == "subscribe" {
                    let subscription = &request["subscriptions"][0];
                    assert_eq!(subscription["channelId"], 1);
                    break subscription["id"].as_u64().unwrap() as u32;
                }
            }
            Some(Ok(_)) => {}
            other => panic!("client went away: {:?}", other),
        }
    };

    let frame = encode_message_data(subscription_id, 1_000_000_000, &point_bytes(3.0, 4.0));
    ws.send(WsMessage::Binary(frame.into())).await.unwrap();

    // Hold the connection open until the client closes it
    while let Some(Ok(_)) = ws.next().await {}
}

#[tokio::test]
async fn decodes_messages_from_a_live_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let server = tokio::spawn(serve_one_client(listener));

    let player = WebSocketPlayer::new(url.clone(), Arc::new(NoopMetricsCollector));
    let (listener, mut states) = collector();
    player.set_listener(listener);
    player.set_subscriptions(["/a"]);

    let state = wait_for(&mut states, |s| message_count(s) > 0).await;

    assert_eq!(state.presence, PlayerPresence::Present);
    assert_eq!(state.name, format!("{}\ntest server", url));
    let data = state.active_data.unwrap();
    assert_eq!(data.messages.len(), 1);
    let event = &data.messages[0];
    assert_eq!(event.topic, "/a");
    assert_eq!(event.receive_time, Time::new(1, 0));
    assert_eq!(event.message, json!({"x": 3.0, "y": 4.0}));

    player.close();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server did not see the close")
        .unwrap();
}

/// Wraps the real connector to count connection attempts.
struct CountingConnector {
    inner: WsConnector,
    attempts: Arc<AtomicUsize>,
}

impl Connector for CountingConnector {
    fn connect(&self, url: &str, sink: EventSink) -> Box<dyn Transport> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.inner.connect(url, sink)
    }
}

#[tokio::test]
async fn unreachable_server_keeps_reconnecting() {
    // Reserve a port nobody listens on
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let url = format!("ws://127.0.0.1:{}", port);
    let attempts = Arc::new(AtomicUsize::new(0));
    let connector = CountingConnector {
        inner: WsConnector::new(),
        attempts: Arc::clone(&attempts),
    };
    let options = PlayerOptions::new(url.clone()).with_reconnect_delay(Duration::from_millis(300));

    let player = WebSocketPlayer::with_connector(options, Arc::new(NoopMetricsCollector), Arc::new(connector));
    let (listener, mut states) = collector();
    player.set_listener(listener);

    let state = wait_for(&mut states, |s| s.presence == PlayerPresence::Reconnecting).await;
    assert!(attempts.load(Ordering::SeqCst) >= 1);
    assert_eq!(state.problems.len(), 1);
    assert!(state.problems["connection-failed"].message.contains(&url));
    assert!(state.active_data.is_none());

    // Retry spacing is covered with paused time; here only require that a retry happens
    tokio::time::timeout(Duration::from_secs(10), async {
        while attempts.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("player never retried the connection");

    player.close();
}
