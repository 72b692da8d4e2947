//! NSQ TCP protocol V2 (panic-free).
//!
//! Parsing rules:
//! - Never index (`buf[0]`) — always use `Buf` and `remaining()` checks.
//! - Never `unwrap()` / `expect()` / `panic!()` in production paths.
//!
//! Frame layout (big-endian): `[u32 size][u32 frame_type][data]`, where
//! `size` counts the frame type plus data. Message data is
//! `[i64 timestamp_ns][u16 attempts][16-byte id][body]`.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;

use crate::error::{NsqWsError, Result};
use crate::protocol::names::{Channel, Topic};

/// Protocol magic sent once right after connecting.
pub const MAGIC_V2: &[u8; 4] = b"  V2";

/// Response body nsqd sends as a liveness probe; answer with `NOP`.
pub const HEARTBEAT: &[u8] = b"_heartbeat_";

/// Response body acknowledging a command.
pub const OK: &[u8] = b"OK";

/// Length of an NSQ message id.
pub const MESSAGE_ID_LEN: usize = 16;

const MESSAGE_HEADER_LEN: usize = 8 + 2 + MESSAGE_ID_LEN;

/// Opaque 16-byte message id (hex ASCII in practice).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId([u8; MESSAGE_ID_LEN]);

impl MessageId {
    pub fn new(raw: [u8; MESSAGE_ID_LEN]) -> Self {
        Self(raw)
    }

    pub fn as_bytes(&self) -> &[u8; MESSAGE_ID_LEN] {
        &self.0
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({self})")
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

/// Body of the `IDENTIFY` command.
#[derive(Debug, Clone, Serialize)]
pub struct Identify {
    pub client_id: String,
    pub hostname: String,
    pub user_agent: String,
    /// Milliseconds between nsqd heartbeats.
    pub heartbeat_interval: u64,
    /// Kept false so nsqd answers with a plain `OK`.
    pub feature_negotiation: bool,
}

/// Client → nsqd commands.
#[derive(Debug, Clone)]
pub enum Command {
    Identify(Identify),
    Sub { topic: Topic, channel: Channel },
    Rdy(u32),
    Fin(MessageId),
    Req { id: MessageId, delay_ms: u64 },
    Touch(MessageId),
    Pub { topic: Topic, body: Bytes },
    Nop,
    Cls,
}

impl Command {
    /// Append the encoded command to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        match self {
            Command::Identify(identify) => {
                let body = serde_json::to_vec(identify)
                    .map_err(|e| NsqWsError::Internal(format!("identify encode failed: {e}")))?;
                dst.put_slice(b"IDENTIFY\n");
                put_sized(dst, &body)?;
            }
            Command::Sub { topic, channel } => {
                put_line(dst, &["SUB", topic.as_str(), channel.as_str()]);
            }
            Command::Rdy(count) => put_line(dst, &["RDY", &count.to_string()]),
            Command::Fin(id) => {
                dst.put_slice(b"FIN ");
                dst.put_slice(id.as_bytes());
                dst.put_u8(b'\n');
            }
            Command::Req { id, delay_ms } => {
                dst.put_slice(b"REQ ");
                dst.put_slice(id.as_bytes());
                dst.put_u8(b' ');
                dst.put_slice(delay_ms.to_string().as_bytes());
                dst.put_u8(b'\n');
            }
            Command::Touch(id) => {
                dst.put_slice(b"TOUCH ");
                dst.put_slice(id.as_bytes());
                dst.put_u8(b'\n');
            }
            Command::Pub { topic, body } => {
                put_line(dst, &["PUB", topic.as_str()]);
                put_sized(dst, body)?;
            }
            Command::Nop => dst.put_slice(b"NOP\n"),
            Command::Cls => dst.put_slice(b"CLS\n"),
        }
        Ok(())
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }
}

fn put_line(dst: &mut BytesMut, parts: &[&str]) {
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            dst.put_u8(b' ');
        }
        dst.put_slice(part.as_bytes());
    }
    dst.put_u8(b'\n');
}

fn put_sized(dst: &mut BytesMut, body: &[u8]) -> Result<()> {
    let len = u32::try_from(body.len())
        .map_err(|_| NsqWsError::BadRequest("body exceeds u32 length".into()))?;
    dst.put_u32(len);
    dst.put_slice(body);
    Ok(())
}

/// Frame type tags.
pub const FRAME_TYPE_RESPONSE: u32 = 0;
pub const FRAME_TYPE_ERROR: u32 = 1;
pub const FRAME_TYPE_MESSAGE: u32 = 2;

/// A message delivered by nsqd.
#[derive(Debug, Clone)]
pub struct NsqMessage {
    pub timestamp_ns: i64,
    pub attempts: u16,
    pub id: MessageId,
    pub body: Bytes,
}

/// nsqd → client frames.
#[derive(Debug, Clone)]
pub enum Frame {
    Response(Bytes),
    Error(Bytes),
    Message(NsqMessage),
}

impl Frame {
    pub fn is_heartbeat(&self) -> bool {
        matches!(self, Frame::Response(b) if b.as_ref() == HEARTBEAT)
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Frame::Response(b) if b.as_ref() == OK)
    }
}

/// Decode one frame from the front of `src`.
///
/// Returns `Ok(None)` while the buffered bytes do not yet hold a whole
/// frame; consumed bytes are removed from `src` only on success.
pub fn decode_frame(src: &mut BytesMut, max_frame_bytes: usize) -> Result<Option<Frame>> {
    if src.remaining() < 4 {
        return Ok(None);
    }

    let mut peek: &[u8] = src.as_ref();
    let size = peek.get_u32() as usize;
    if size < 4 {
        return Err(NsqWsError::Protocol(format!("frame size {size} too small")));
    }
    if size > max_frame_bytes {
        return Err(NsqWsError::Protocol(format!(
            "frame size {size} exceeds limit {max_frame_bytes}"
        )));
    }
    if src.remaining() < 4 + size {
        src.reserve(4 + size - src.remaining());
        return Ok(None);
    }

    src.advance(4);
    let mut data = src.split_to(size).freeze();
    let frame_type = data.get_u32();

    match frame_type {
        FRAME_TYPE_RESPONSE => Ok(Some(Frame::Response(data))),
        FRAME_TYPE_ERROR => Ok(Some(Frame::Error(data))),
        FRAME_TYPE_MESSAGE => Ok(Some(Frame::Message(decode_message(data)?))),
        other => Err(NsqWsError::Protocol(format!("unknown frame type {other}"))),
    }
}

/// Decode the data section of a message frame.
pub fn decode_message(mut buf: Bytes) -> Result<NsqMessage> {
    if buf.remaining() < MESSAGE_HEADER_LEN {
        return Err(NsqWsError::Protocol(format!(
            "message too short: {} bytes",
            buf.remaining()
        )));
    }

    let timestamp_ns = buf.get_i64();
    let attempts = buf.get_u16();
    let mut raw_id = [0u8; MESSAGE_ID_LEN];
    buf.copy_to_slice(&mut raw_id);

    // Remaining bytes are the body.
    let body = buf.copy_to_bytes(buf.remaining());

    Ok(NsqMessage {
        timestamp_ns,
        attempts,
        id: MessageId::new(raw_id),
        body,
    })
}
