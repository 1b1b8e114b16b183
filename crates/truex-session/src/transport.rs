//! TCP transport proxy.
//!
//! Reads bytes into a frame buffer and yields complete FIX frames;
//! partial frames persist across reads. Writes issued before the socket is
//! up are queued and flushed in FIFO order once the connection completes,
//! so logon traffic never races the TCP handshake.

use crate::error::{SessionError, SessionResult};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};
use truex_fix::extract_frame;

const READ_CHUNK: usize = 8 * 1024;

/// Accumulates bytes and yields complete frames.
#[derive(Debug, Default)]
pub struct FrameReader {
    buf: Vec<u8>,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes from the socket.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete frame, if one is buffered.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        let (frame, consumed) = extract_frame(&self.buf)?;
        self.buf.drain(..consumed);
        Some(frame)
    }

    /// Bytes currently buffered (partial frame remainder).
    pub fn pending_bytes(&self) -> usize {
        self.buf.len()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

/// TCP transport with pre-connect write buffering.
pub struct Transport {
    stream: Option<TcpStream>,
    reader: FrameReader,
    /// Writes queued while disconnected, flushed FIFO on connect.
    pending_writes: VecDeque<Vec<u8>>,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport {
    pub fn new() -> Self {
        Self {
            stream: None,
            reader: FrameReader::new(),
            pending_writes: VecDeque::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Connect with a deadline, then flush any queued writes in order.
    pub async fn connect(
        &mut self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> SessionResult<()> {
        let addr = format!("{host}:{port}");
        info!(%addr, "connecting transport");

        let stream = tokio::time::timeout(timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| SessionError::ConnectTimeout)??;
        stream.set_nodelay(true)?;

        self.reader.clear();
        self.stream = Some(stream);

        let queued = self.pending_writes.len();
        if queued > 0 {
            debug!(queued, "flushing pre-connect write queue");
            while let Some(frame) = self.pending_writes.pop_front() {
                self.write_now(&frame).await?;
            }
        }

        info!(%addr, "transport connected");
        Ok(())
    }

    /// Send a frame, queueing it if the socket is not up yet.
    pub async fn send(&mut self, frame: Vec<u8>) -> SessionResult<()> {
        if self.stream.is_some() {
            self.write_now(&frame).await
        } else {
            debug!(len = frame.len(), "socket not ready; queueing frame");
            self.pending_writes.push_back(frame);
            Ok(())
        }
    }

    async fn write_now(&mut self, frame: &[u8]) -> SessionResult<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or(SessionError::ChannelClosed)?;
        stream.write_all(frame).await?;
        Ok(())
    }

    /// Read until one complete frame is available.
    ///
    /// Returns `Ok(None)` on orderly remote close.
    pub async fn read_frame(&mut self) -> SessionResult<Option<Vec<u8>>> {
        loop {
            if let Some(frame) = self.reader.next_frame() {
                return Ok(Some(frame));
            }

            let stream = self
                .stream
                .as_mut()
                .ok_or(SessionError::ChannelClosed)?;
            let mut chunk = [0u8; READ_CHUNK];
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                if self.reader.pending_bytes() > 0 {
                    warn!(
                        pending = self.reader.pending_bytes(),
                        "remote closed mid-frame"
                    );
                }
                return Ok(None);
            }
            self.reader.push(&chunk[..n]);
        }
    }

    /// Drop the socket. Queued writes are preserved for the next connect.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        self.reader.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use truex_fix::{FrameBuilder, MsgType};

    fn frame() -> Vec<u8> {
        FrameBuilder::new(MsgType::Heartbeat)
            .header("CLI", "TRUEX_UAT_OE", 1, "20251006-14:30:00.000")
            .build()
    }

    #[test]
    fn test_frame_reader_partial_then_complete() {
        let mut reader = FrameReader::new();
        let bytes = frame();
        let split = bytes.len() / 2;

        reader.push(&bytes[..split]);
        assert!(reader.next_frame().is_none());
        assert_eq!(reader.pending_bytes(), split);

        reader.push(&bytes[split..]);
        assert_eq!(reader.next_frame().unwrap(), bytes);
        assert_eq!(reader.pending_bytes(), 0);
    }

    #[test]
    fn test_frame_reader_multiple_frames() {
        let mut reader = FrameReader::new();
        let bytes = frame();
        reader.push(&bytes);
        reader.push(&bytes);

        assert_eq!(reader.next_frame().unwrap(), bytes);
        assert_eq!(reader.next_frame().unwrap(), bytes);
        assert!(reader.next_frame().is_none());
    }

    #[tokio::test]
    async fn test_pre_connect_writes_flushed_in_order() {
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut transport = Transport::new();
        transport.send(b"first".to_vec()).await.unwrap();
        transport.send(b"second".to_vec()).await.unwrap();
        assert!(!transport.is_connected());

        let accept = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 64];
            loop {
                let n = stream.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                if buf.len() >= 11 {
                    break;
                }
            }
            buf
        });

        transport
            .connect(&addr.ip().to_string(), addr.port(), Duration::from_secs(1))
            .await
            .unwrap();
        transport.close().await;

        let received = accept.await.unwrap();
        assert_eq!(received, b"firstsecond");
    }
}
