//! One TCP connection speaking protocol V2.

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use nsqws_core::error::{NsqWsError, Result};
use nsqws_core::protocol::wire::{decode_frame, Command, Frame, Identify, MAGIC_V2};

const DIAL_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) struct NsqConn {
    addr: String,
    stream: TcpStream,
    read_buf: BytesMut,
    write_buf: BytesMut,
    max_frame_bytes: usize,
}

impl NsqConn {
    /// Dial, send the magic, and complete IDENTIFY.
    pub(crate) async fn connect(addr: &str, identify: &Identify, max_frame_bytes: usize) -> Result<Self> {
        let stream = tokio::time::timeout(DIAL_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| NsqWsError::Io(std::io::ErrorKind::TimedOut.into()))??;
        stream.set_nodelay(true)?;

        let mut conn = Self {
            addr: addr.to_string(),
            stream,
            read_buf: BytesMut::with_capacity(4096),
            write_buf: BytesMut::with_capacity(1024),
            max_frame_bytes,
        };
        conn.stream.write_all(MAGIC_V2).await?;
        conn.send(&Command::Identify(identify.clone())).await?;
        conn.expect_ok().await?;
        tracing::debug!(nsqd = %conn.addr, "connected");
        Ok(conn)
    }

    pub(crate) fn addr(&self) -> &str {
        &self.addr
    }

    pub(crate) async fn send(&mut self, cmd: &Command) -> Result<()> {
        self.write_buf.clear();
        cmd.encode(&mut self.write_buf)?;
        self.stream.write_all(&self.write_buf).await?;
        Ok(())
    }

    /// Cancel-safe: bytes stay in `read_buf` until a whole frame decodes.
    pub(crate) async fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = decode_frame(&mut self.read_buf, self.max_frame_bytes)? {
                return Ok(frame);
            }
            if self.stream.read_buf(&mut self.read_buf).await? == 0 {
                return Err(NsqWsError::Io(std::io::ErrorKind::UnexpectedEof.into()));
            }
        }
    }

    /// Wait for `OK`, answering heartbeats on the way.
    pub(crate) async fn expect_ok(&mut self) -> Result<()> {
        loop {
            let frame = self.read_frame().await?;
            if frame.is_heartbeat() {
                self.send(&Command::Nop).await?;
                continue;
            }
            return match frame {
                f if f.is_ok() => Ok(()),
                Frame::Error(body) => Err(NsqWsError::Nsq(String::from_utf8_lossy(&body).into_owned())),
                Frame::Response(body) => Err(NsqWsError::Protocol(format!(
                    "expected OK, got {:?}",
                    String::from_utf8_lossy(&body)
                ))),
                Frame::Message(_) => Err(NsqWsError::Protocol("unexpected message frame".into())),
            };
        }
    }
}
