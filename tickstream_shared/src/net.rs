//! Framed transport.
//!
//! Goals:
//! - Deliver whole, ordered messages over a byte stream.
//! - Stay payload-agnostic; encoding lives in [`crate::protocol`].
//! - Split into independent read/write halves so one task can block on
//!   reads while another drains an outbound queue.
//!
//! Frames are a 4-byte big-endian length followed by that many payload bytes.

use std::net::SocketAddr;

use anyhow::{bail, Context};
use bytes::{BufMut, Bytes, BytesMut};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
};

/// Default read limit. Client frames are small, so the server holds them
/// to this.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Largest frame ever written, and the read limit clients apply to server
/// frames. Snapshots grow with the session count.
pub const MAX_SERVER_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Reads length-prefixed frames.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    max_len: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            max_len: MAX_FRAME_LEN,
        }
    }

    /// Replaces the read limit.
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    /// Reads the next frame. Returns `Ok(None)` when the peer closed the
    /// stream cleanly between frames; a stream ending anywhere inside a
    /// frame, length prefix included, is an error.
    pub async fn recv(&mut self) -> anyhow::Result<Option<Bytes>> {
        let mut len_buf = [0u8; 4];
        match self.inner.read_exact(&mut len_buf[..1]).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e).context("read frame len"),
        }
        self.inner
            .read_exact(&mut len_buf[1..])
            .await
            .context("read frame len")?;
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > self.max_len {
            bail!("frame of {len} bytes exceeds limit of {}", self.max_len);
        }
        let mut payload = BytesMut::zeroed(len);
        self.inner
            .read_exact(&mut payload)
            .await
            .context("read frame payload")?;
        Ok(Some(payload.freeze()))
    }
}

/// Writes length-prefixed frames.
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub async fn send(&mut self, payload: &[u8]) -> anyhow::Result<()> {
        if payload.len() > MAX_SERVER_FRAME_LEN {
            bail!(
                "frame of {} bytes exceeds limit of {MAX_SERVER_FRAME_LEN}",
                payload.len()
            );
        }
        let mut buf = BytesMut::with_capacity(4 + payload.len());
        buf.put_u32(payload.len() as u32);
        buf.extend_from_slice(payload);
        self.inner.write_all(&buf).await.context("write frame")?;
        self.inner.flush().await.context("flush frame")?;
        Ok(())
    }
}

/// Reliable connection over TCP with length-prefixed frames.
#[derive(Debug)]
pub struct ReliableConn {
    stream: TcpStream,
}

impl ReliableConn {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await.context("tcp connect")?;
        stream.set_nodelay(true).context("tcp nodelay")?;
        Ok(Self::new(stream))
    }

    pub fn peer_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    pub fn into_split(self) -> (FrameReader<OwnedReadHalf>, FrameWriter<OwnedWriteHalf>) {
        let (read, write) = self.stream.into_split();
        (FrameReader::new(read), FrameWriter::new(write))
    }
}

/// TCP server listener.
pub struct ReliableListener {
    listener: TcpListener,
}

impl ReliableListener {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<(ReliableConn, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        stream.set_nodelay(true).context("tcp nodelay")?;
        Ok((ReliableConn::new(stream), addr))
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}
