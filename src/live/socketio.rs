//! Socket.IO client transport over tokio-tungstenite

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION, USER_AGENT};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use super::codec::{self, EnginePacket, SocketPacket};
use super::{ChannelCommand, LiveChannel, LiveConnector, LiveError, LiveEvent};
use crate::config::ServerSettings;
use crate::constants::{LIVE_EVENT_CAPACITY, LIVE_NAMESPACE};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens `/live_submission` channels against the platform's Socket.IO endpoint
pub struct SocketIoConnector {
    url: Url,
    authorization: Option<String>,
    namespace: String,
}

impl SocketIoConnector {
    pub fn new(settings: &ServerSettings) -> Result<Self, LiveError> {
        let url = settings
            .socket_url()
            .map_err(|e| LiveError::Connect(e.to_string()))?;
        Ok(Self {
            url,
            authorization: settings.authorization(),
            namespace: LIVE_NAMESPACE.to_string(),
        })
    }
}

#[async_trait]
impl LiveConnector for SocketIoConnector {
    async fn connect(&self, sid: &str) -> Result<LiveChannel, LiveError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| LiveError::Connect(e.to_string()))?;

        let headers = request.headers_mut();
        if let Some(auth) = &self.authorization {
            let value = HeaderValue::from_str(auth)
                .map_err(|_| LiveError::Connect("credentials contain invalid characters".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }
        if let Ok(agent) = HeaderValue::from_str(&crate::user_agent()) {
            headers.insert(USER_AGENT, agent);
        }

        let (socket, _) = connect_async(request)
            .await
            .map_err(|e| LiveError::Connect(e.to_string()))?;
        log::debug!("Live channel connected for submission {}", sid);

        let (event_tx, event_rx) = mpsc::channel(LIVE_EVENT_CAPACITY);
        let (command_tx, command_rx) = mpsc::channel(16);
        let namespace = self.namespace.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = run_transport(socket, namespace, event_tx, command_rx).await {
                log::warn!("Live transport stopped: {}", e);
            }
        });

        Ok(LiveChannel::new(event_rx, command_tx, Some(task)))
    }
}

/// Pump frames between the WebSocket and the channel queues until either side closes
async fn run_transport(
    socket: Socket,
    namespace: String,
    events: mpsc::Sender<LiveEvent>,
    mut commands: mpsc::Receiver<ChannelCommand>,
) -> Result<(), LiveError> {
    let (mut sink, mut stream) = socket.split();
    let mut joined = false;
    // Frames waiting for the namespace to be joined
    let mut pending: Vec<String> = Vec::new();

    loop {
        tokio::select! {
            frame = stream.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(LiveError::Connect(e.to_string())),
                };

                let mut outgoing = Vec::new();
                match codec::decode_engine(&text)? {
                    EnginePacket::Open(_) => outgoing.push(codec::encode_connect(&namespace)),
                    EnginePacket::Ping(payload) => outgoing.push(codec::encode_pong(&payload)),
                    EnginePacket::Close => return Ok(()),
                    EnginePacket::Message(payload) => {
                        let packet = codec::decode_socket(&payload)?;
                        if packet.namespace() != namespace {
                            continue;
                        }
                        match packet {
                            SocketPacket::Connect { .. } => {
                                joined = true;
                                outgoing.append(&mut pending);
                            }
                            SocketPacket::Event { data, .. } => match codec::to_live_event(&data) {
                                Some(event) => {
                                    if events.send(event).await.is_err() {
                                        return Ok(());
                                    }
                                }
                                None => log::debug!("Ignoring live message {}", data),
                            },
                            SocketPacket::ConnectError { data, .. } => {
                                let detail = data
                                    .get("message")
                                    .and_then(|m| m.as_str())
                                    .unwrap_or("namespace connection refused")
                                    .to_string();
                                if events.send(LiveEvent::Error(detail)).await.is_err() {
                                    return Ok(());
                                }
                            }
                            SocketPacket::Disconnect { .. } => return Ok(()),
                            SocketPacket::Ack { .. } => {}
                        }
                    }
                    EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => {}
                }

                for frame in outgoing {
                    sink.send(Message::Text(frame))
                        .await
                        .map_err(|e| LiveError::Connect(e.to_string()))?;
                }
            }
            command = commands.recv() => {
                match command {
                    Some(ChannelCommand::Listen { wq_id }) => {
                        let frame = codec::encode_event(
                            &namespace,
                            "listen",
                            &json!({"wq_id": wq_id, "from_start": true}),
                        );
                        if joined {
                            sink.send(Message::Text(frame))
                                .await
                                .map_err(|e| LiveError::Connect(e.to_string()))?;
                        } else {
                            pending.push(frame);
                        }
                    }
                    Some(ChannelCommand::Close) | None => {
                        let _ = sink.send(Message::Text(codec::encode_disconnect(&namespace))).await;
                        let _ = sink.close().await;
                        return Ok(());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_uses_socket_url_and_credentials() {
        let settings = ServerSettings {
            url: "https://al.example.com".to_string(),
            username: Some("analyst".to_string()),
            apikey: Some("secret".to_string()),
            ..ServerSettings::default()
        };
        let connector = SocketIoConnector::new(&settings).unwrap();
        assert_eq!(connector.url.scheme(), "wss");
        assert_eq!(connector.namespace, "/live_submission");
        assert_eq!(connector.authorization.as_deref(), Some("Bearer analyst:secret"));
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        let settings = ServerSettings {
            url: "http://127.0.0.1:9".to_string(),
            ..ServerSettings::default()
        };
        let connector = SocketIoConnector::new(&settings).unwrap();
        assert!(matches!(connector.connect("sid").await, Err(LiveError::Connect(_))));
    }
}
