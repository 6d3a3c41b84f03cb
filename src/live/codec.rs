//! Engine.IO v4 / Socket.IO v5 text framing
//!
//! Only the subset needed by a listening client is supported: no binary
//! attachments, no polling transport.

use serde_json::Value;

use super::{LiveError, LiveEvent};

/// Engine.IO transport-level packet
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(Value),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

/// Socket.IO packet carried inside an Engine.IO message
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect { namespace: String, data: Option<Value> },
    Disconnect { namespace: String },
    Event { namespace: String, ack: Option<u64>, data: Value },
    Ack { namespace: String, ack: u64, data: Value },
    ConnectError { namespace: String, data: Value },
}

impl SocketPacket {
    pub fn namespace(&self) -> &str {
        match self {
            SocketPacket::Connect { namespace, .. }
            | SocketPacket::Disconnect { namespace }
            | SocketPacket::Event { namespace, .. }
            | SocketPacket::Ack { namespace, .. }
            | SocketPacket::ConnectError { namespace, .. } => namespace,
        }
    }
}

/// Decode one WebSocket text frame
pub fn decode_engine(frame: &str) -> Result<EnginePacket, LiveError> {
    let mut chars = frame.chars();
    let kind = chars
        .next()
        .ok_or_else(|| LiveError::Protocol("empty frame".to_string()))?;
    let body = chars.as_str();

    match kind {
        '0' => {
            let handshake = serde_json::from_str(body)
                .map_err(|e| LiveError::Protocol(format!("invalid open packet: {}", e)))?;
            Ok(EnginePacket::Open(handshake))
        }
        '1' => Ok(EnginePacket::Close),
        '2' => Ok(EnginePacket::Ping(body.to_string())),
        '3' => Ok(EnginePacket::Pong(body.to_string())),
        '4' => Ok(EnginePacket::Message(body.to_string())),
        '5' => Ok(EnginePacket::Upgrade),
        '6' => Ok(EnginePacket::Noop),
        other => Err(LiveError::Protocol(format!("unknown engine packet type '{}'", other))),
    }
}

/// Decode the payload of an Engine.IO message packet
pub fn decode_socket(payload: &str) -> Result<SocketPacket, LiveError> {
    let mut rest = payload;
    let kind = rest
        .chars()
        .next()
        .ok_or_else(|| LiveError::Protocol("empty socket packet".to_string()))?;
    rest = &rest[kind.len_utf8()..];

    let namespace = if rest.starts_with('/') {
        match rest.find(',') {
            Some(idx) => {
                let ns = &rest[..idx];
                rest = &rest[idx + 1..];
                ns.to_string()
            }
            None => {
                let ns = rest.to_string();
                rest = "";
                ns
            }
        }
    } else {
        "/".to_string()
    };

    let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    let ack = if digits > 0 {
        let id = rest[..digits]
            .parse::<u64>()
            .map_err(|e| LiveError::Protocol(format!("invalid ack id: {}", e)))?;
        rest = &rest[digits..];
        Some(id)
    } else {
        None
    };

    let data = if rest.is_empty() {
        None
    } else {
        Some(
            serde_json::from_str::<Value>(rest)
                .map_err(|e| LiveError::Protocol(format!("invalid packet data: {}", e)))?,
        )
    };

    match kind {
        '0' => Ok(SocketPacket::Connect { namespace, data }),
        '1' => Ok(SocketPacket::Disconnect { namespace }),
        '2' => Ok(SocketPacket::Event {
            namespace,
            ack,
            data: data.unwrap_or(Value::Null),
        }),
        '3' => Ok(SocketPacket::Ack {
            namespace,
            ack: ack.ok_or_else(|| LiveError::Protocol("ack packet without id".to_string()))?,
            data: data.unwrap_or(Value::Null),
        }),
        '4' => Ok(SocketPacket::ConnectError {
            namespace,
            data: data.unwrap_or(Value::Null),
        }),
        '5' | '6' => Err(LiveError::Protocol("binary packets are not supported".to_string())),
        other => Err(LiveError::Protocol(format!("unknown socket packet type '{}'", other))),
    }
}

fn namespace_prefix(namespace: &str) -> String {
    if namespace == "/" {
        String::new()
    } else {
        format!("{},", namespace)
    }
}

/// Frame joining a namespace
pub fn encode_connect(namespace: &str) -> String {
    format!("40{}", namespace_prefix(namespace))
}

/// Frame leaving a namespace
pub fn encode_disconnect(namespace: &str) -> String {
    format!("41{}", namespace_prefix(namespace))
}

/// Frame emitting an event with one argument
pub fn encode_event(namespace: &str, name: &str, data: &Value) -> String {
    let payload = Value::Array(vec![Value::String(name.to_string()), data.clone()]);
    format!("42{}{}", namespace_prefix(namespace), payload)
}

/// Frame answering a server ping
pub fn encode_pong(payload: &str) -> String {
    format!("3{}", payload)
}

/// Convert a decoded event array into a live event.
/// Unknown event names yield `None`.
pub fn to_live_event(data: &Value) -> Option<LiveEvent> {
    let items = data.as_array()?;
    let name = items.first()?.as_str()?;
    let msg = items.get(1).and_then(|arg| arg.get("msg")).cloned().unwrap_or(Value::Null);

    let text = |value: &Value| match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    let key = |value: &Value| match value {
        Value::Null => None,
        other => Some(text(other)),
    };

    match name {
        "start" => Some(LiveEvent::Start(text(&msg))),
        "stop" => Some(LiveEvent::Stop(text(&msg))),
        "cachekey" => Some(LiveEvent::CacheKey(key(&msg))),
        "cachekeyerr" => Some(LiveEvent::CacheKeyErr(key(&msg))),
        "error" => Some(LiveEvent::Error(text(&msg))),
        _ => None,
    }
}
