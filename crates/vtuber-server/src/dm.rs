//! Live-chat ingress: WebSocket client to a blivedm-like relay.
//!
//! Joins the room, keeps the connection alive, and turns text (`cmd=2`) and
//! super-chat (`cmd=5`) frames into `TextIn` records. The connection is a
//! background daemon: on failure it reconnects with exponential backoff and
//! only stops when the TextIn channel closes.

use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::Message;

use vtuber_core::{Priority, TextIn};

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

const HEARTBEAT_MESSAGE: &str = r#"{"cmd":0,"data":{}}"#;

// relay frame commands
const CMD_JOIN_ROOM: i64 = 1;
const CMD_ADD_TEXT: i64 = 2;
const CMD_ADD_SUPER_CHAT: i64 = 5;

#[derive(Debug, Error)]
pub enum DmError {
    #[error("websocket failed: {0}")]
    Socket(#[from] tungstenite::Error),

    #[error("the relay closed the connection")]
    SocketClosed,

    #[error("bad frame: {0}")]
    Parse(String),
}

/// A frame from the relay. `data` is an array or an object depending on
/// `cmd`, so it stays raw until dispatch.
#[derive(Debug, Deserialize)]
struct RelayFrame {
    cmd: i64,
    #[serde(default)]
    data: Value,
}

fn join_room_message(roomid: u64) -> String {
    serde_json::json!({"cmd": CMD_JOIN_ROOM, "data": {"roomId": roomid}}).to_string()
}

/// The positional layout of a `cmd=2` text frame.
///
/// The relay sends these as a bare array; each index has a declared type,
/// with numeric-to-bool coercion for the flag positions. Fields past the
/// declared ones are tolerated and ignored.
#[derive(Debug, Default, PartialEq)]
pub struct TextMessageData {
    pub avatar_url: String,
    pub timestamp: i64,
    pub author_name: String,
    pub author_type: i64,
    pub content: String,
    pub privilege_type: i64,
    pub is_gift_danmaku: bool,
    pub author_level: i64,
    pub is_newbie: bool,
    pub is_mobile_verified: bool,
    pub medal_level: i64,
    pub id: String,
    pub translation: String,
    pub content_type: i64,
    pub content_type_params: Vec<Value>,
}

const TEXT_MESSAGE_FIELDS: usize = 15;

impl TextMessageData {
    pub fn from_array(data: &[Value]) -> Result<TextMessageData, DmError> {
        if data.len() < TEXT_MESSAGE_FIELDS {
            return Err(DmError::Parse(format!(
                "text message has {} fields, want at least {}",
                data.len(),
                TEXT_MESSAGE_FIELDS
            )));
        }
        Ok(TextMessageData {
            avatar_url: take_str(data, 0)?,
            timestamp: take_i64(data, 1)?,
            author_name: take_str(data, 2)?,
            author_type: take_i64(data, 3)?,
            content: take_str(data, 4)?,
            privilege_type: take_i64(data, 5)?,
            is_gift_danmaku: take_bool(data, 6)?,
            author_level: take_i64(data, 7)?,
            is_newbie: take_bool(data, 8)?,
            is_mobile_verified: take_bool(data, 9)?,
            medal_level: take_i64(data, 10)?,
            id: take_str(data, 11)?,
            translation: take_str(data, 12)?,
            content_type: take_i64(data, 13)?,
            content_type_params: data[14].as_array().cloned().unwrap_or_default(),
        })
    }
}

fn take_str(data: &[Value], i: usize) -> Result<String, DmError> {
    data[i]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| DmError::Parse(format!("field {i} is not a string")))
}

fn take_i64(data: &[Value], i: usize) -> Result<i64, DmError> {
    // the relay serialises every number as a float
    data[i]
        .as_i64()
        .or_else(|| data[i].as_f64().map(|f| f as i64))
        .ok_or_else(|| DmError::Parse(format!("field {i} is not a number")))
}

fn take_bool(data: &[Value], i: usize) -> Result<bool, DmError> {
    if let Some(b) = data[i].as_bool() {
        return Ok(b);
    }
    take_i64(data, i)
        .map(|n| n != 0)
        .map_err(|_| DmError::Parse(format!("field {i} is not a bool")))
}

/// A `cmd=5` super-chat frame, keyed.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SuperChatData {
    #[serde(default)]
    #[allow(dead_code)]
    id: String,
    #[serde(default)]
    #[allow(dead_code)]
    avatar_url: String,
    #[serde(default)]
    #[allow(dead_code)]
    timestamp: i64,
    author_name: String,
    /// In the stream's currency; tens of it map to one priority level.
    price: f64,
    content: String,
    #[serde(default)]
    #[allow(dead_code)]
    translation: String,
}

/// Parse one relay frame into a `TextIn`, if it carries one.
fn text_in_from_frame(raw: &str) -> Result<Option<TextIn>, DmError> {
    let frame: RelayFrame =
        serde_json::from_str(raw).map_err(|e| DmError::Parse(e.to_string()))?;

    match frame.cmd {
        CMD_ADD_TEXT => {
            let data = frame
                .data
                .as_array()
                .ok_or_else(|| DmError::Parse("text data is not an array".into()))?;
            let text = TextMessageData::from_array(data)?;
            Ok(Some(TextIn::new(
                text.author_name,
                text.content,
                Priority::LOW,
            )))
        }
        CMD_ADD_SUPER_CHAT => {
            let sc: SuperChatData = serde_json::from_value(frame.data)
                .map_err(|e| DmError::Parse(format!("super chat: {e}")))?;
            let priority = Priority::from_price(sc.price.max(0.0) as u64);
            Ok(Some(TextIn::new(sc.author_name, sc.content, priority)))
        }
        _ => Ok(None),
    }
}

/// Receive comments from `roomid` and push them to `text_in`, forever.
///
/// Reconnects on socket failure; stops when the channel closes.
pub async fn text_in_from_dm(roomid: u64, server: String, text_in: mpsc::Sender<TextIn>) {
    tracing::info!(roomid, server = %server, "receiving live chat");

    let mut backoff = INITIAL_BACKOFF;
    loop {
        let started = Instant::now();

        match run_connection(roomid, &server, &text_in).await {
            Ok(()) => return, // channel closed, we are done
            Err(e) => {
                tracing::warn!(error = %e, "live chat connection failed");
            }
        }
        if text_in.is_closed() {
            return;
        }

        // an attempt that lived a while earns a fresh backoff;
        // quick successive failures double it
        if started.elapsed() > backoff * 3 {
            backoff = INITIAL_BACKOFF;
        }
        tracing::info!(backoff = ?backoff, "reconnecting to live chat");
        tokio::time::sleep(backoff).await;
        backoff *= 2;
    }
}

/// One connection's lifetime. `Ok(())` means the TextIn channel closed and
/// the daemon should stop; an error asks for a reconnect.
async fn run_connection(
    roomid: u64,
    server: &str,
    text_in: &mpsc::Sender<TextIn>,
) -> Result<(), DmError> {
    let (ws, _) = connect_async(server).await?;
    let (mut sink, mut stream) = ws.split();

    sink.send(Message::Text(join_room_message(roomid))).await?;

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await; // the immediate first tick

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                sink.send(Message::Text(HEARTBEAT_MESSAGE.to_string())).await?;
            }
            received = stream.next() => {
                let msg = match received {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(DmError::SocketClosed),
                };
                match msg {
                    Message::Text(raw) => {
                        if raw == HEARTBEAT_MESSAGE {
                            continue;
                        }
                        match text_in_from_frame(&raw) {
                            Ok(Some(text)) => {
                                tracing::info!(
                                    author = %text.author,
                                    content = %text.content,
                                    "text in from live chat"
                                );
                                if text_in.send(text).await.is_err() {
                                    return Ok(());
                                }
                            }
                            Ok(None) => {}
                            Err(e) => {
                                tracing::warn!(error = %e, "dropped undecodable frame");
                            }
                        }
                    }
                    Message::Close(_) => return Err(DmError::SocketClosed),
                    _ => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text_array() -> Value {
        json!([
            "http://avatar", 1676962600.0, "alice", 0, "你好", 0,
            0, 21, 1, 1, 7, "id-123", "", 0, []
        ])
    }

    #[test]
    fn join_room_message_shape() {
        assert_eq!(
            join_room_message(42),
            r#"{"cmd":1,"data":{"roomId":42}}"#
        );
    }

    #[test]
    fn positional_decode_with_coercion() {
        let arr = text_array();
        let data = TextMessageData::from_array(arr.as_array().unwrap()).unwrap();

        assert_eq!(data.author_name, "alice");
        assert_eq!(data.content, "你好");
        assert_eq!(data.timestamp, 1676962600);
        assert!(!data.is_gift_danmaku, "0 coerces to false");
        assert!(data.is_newbie, "1 coerces to true");
        assert!(data.is_mobile_verified);
        assert_eq!(data.author_level, 21);
    }

    #[test]
    fn trailing_extra_fields_are_tolerated() {
        let mut arr = text_array();
        arr.as_array_mut()
            .unwrap()
            .push(json!("some future field"));
        assert!(TextMessageData::from_array(arr.as_array().unwrap()).is_ok());
    }

    #[test]
    fn short_or_mistyped_arrays_are_rejected() {
        let arr = json!(["only", "five", "fields", 1, 2]);
        assert!(TextMessageData::from_array(arr.as_array().unwrap()).is_err());

        let mut arr = text_array();
        arr.as_array_mut().unwrap()[4] = json!(12345); // content must be a string
        assert!(TextMessageData::from_array(arr.as_array().unwrap()).is_err());
    }

    #[test]
    fn text_frame_becomes_low_priority_text_in() {
        let raw = json!({"cmd": 2, "data": text_array()}).to_string();
        let text = text_in_from_frame(&raw).unwrap().unwrap();
        assert_eq!(text.author, "alice");
        assert_eq!(text.content, "你好");
        assert_eq!(text.priority, Priority::LOW);
    }

    #[test]
    fn super_chat_priority_scales_with_price() {
        let raw = json!({"cmd": 5, "data": {
            "id": "sc-1",
            "avatarUrl": "http://avatar",
            "timestamp": 1676962600,
            "authorName": "bob",
            "price": 30.0,
            "content": "hello!",
            "translation": ""
        }})
        .to_string();

        let text = text_in_from_frame(&raw).unwrap().unwrap();
        assert_eq!(text.author, "bob");
        assert_eq!(text.priority, Priority(3));
    }

    #[test]
    fn unknown_cmds_are_ignored() {
        let raw = json!({"cmd": 3, "data": {"gift": "rose"}}).to_string();
        assert!(text_in_from_frame(&raw).unwrap().is_none());

        let raw = json!({"cmd": 99}).to_string();
        assert!(text_in_from_frame(&raw).unwrap().is_none());
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(text_in_from_frame("not json").is_err());
        let raw = json!({"cmd": 2, "data": {"not": "an array"}}).to_string();
        assert!(text_in_from_frame(&raw).is_err());
    }
}
