//! Length-prefixed framing over TCP
//!
//! Every frame on the wire is a 4-byte big-endian length followed by exactly
//! that many bytes. The framer does not look inside the bytes it carries.

use bytes::{BufMut, BytesMut};
use std::net::SocketAddr;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;


/// Size of the length prefix in bytes
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Default upper bound on a frame body (16MB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Framing errors
#[derive(Debug, Error)]
pub enum FramingError {
    /// Peer closed the stream at a frame boundary
    #[error("Connection closed")]
    Closed,

    /// Peer closed the stream in the middle of a frame
    #[error("Connection closed mid-frame: expected {expected} bytes, received {received}")]
    Truncated { expected: usize, received: usize },

    /// Declared or outgoing frame is over the configured limit
    #[error("Frame too large: {size} bytes (max: {max} bytes)")]
    TooLarge { size: usize, max: usize },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FramingError {
    /// Whether this is the clean end of a session rather than a failure
    pub fn is_clean_close(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Read one frame body.
///
/// The declared length is checked against `max_frame_size` before anything is
/// allocated for the body.
pub async fn read_frame<R>(reader: &mut R, max_frame_size: usize) -> Result<Vec<u8>, FramingError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    let mut filled = 0;

    while filled < LENGTH_PREFIX_LEN {
        let n = reader.read(&mut prefix[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Err(FramingError::Closed);
            }
            return Err(FramingError::Truncated {
                expected: LENGTH_PREFIX_LEN,
                received: filled,
            });
        }
        filled += n;
    }

    let len = u32::from_be_bytes(prefix) as usize;
    if len > max_frame_size {
        return Err(FramingError::TooLarge {
            size: len,
            max: max_frame_size,
        });
    }

    let mut body = Vec::with_capacity(len);
    let received = (&mut *reader).take(len as u64).read_to_end(&mut body).await?;
    if received < len {
        return Err(FramingError::Truncated {
            expected: len,
            received,
        });
    }

    Ok(body)
}

/// Write one frame and wait until the transport has taken it
pub async fn write_frame<W>(
    writer: &mut W,
    body: &[u8],
    max_frame_size: usize,
) -> Result<(), FramingError>
where
    W: AsyncWrite + Unpin,
{
    let max = max_frame_size.min(u32::MAX as usize);
    if body.len() > max {
        return Err(FramingError::TooLarge {
            size: body.len(),
            max,
        });
    }

    let mut frame = BytesMut::with_capacity(LENGTH_PREFIX_LEN + body.len());
    frame.put_u32(body.len() as u32);
    frame.put_slice(body);

    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read half of a framed connection
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    max_frame_size: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, max_frame_size: usize) -> Self {
        Self {
            inner,
            max_frame_size,
        }
    }

    pub async fn read_frame(&mut self) -> Result<Vec<u8>, FramingError> {
        read_frame(&mut self.inner, self.max_frame_size).await
    }
}

/// Write half of a framed connection
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: W,
    max_frame_size: usize,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W, max_frame_size: usize) -> Self {
        Self {
            inner,
            max_frame_size,
        }
    }

    pub async fn write_frame(&mut self, body: &[u8]) -> Result<(), FramingError> {
        write_frame(&mut self.inner, body, self.max_frame_size).await
    }

    /// Shut down the write direction so the peer sees a clean close
    pub async fn shutdown(&mut self) -> Result<(), FramingError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

/// Open a TCP connection to a sync endpoint
pub async fn connect(address: &str, port: u16) -> std::io::Result<TcpStream> {
    let stream = TcpStream::connect((address, port)).await?;
    stream.set_nodelay(true)?;
    debug!("Connected to {}", stream.peer_addr()?);
    Ok(stream)
}

/// Bind a TCP listener for incoming sync endpoints
pub async fn bind(address: &str, port: u16) -> std::io::Result<TcpListener> {
    TcpListener::bind((address, port)).await
}

/// Accept one connection and prepare it for frame traffic
pub async fn accept(listener: &TcpListener) -> std::io::Result<(TcpStream, SocketAddr)> {
    let (stream, addr) = listener.accept().await?;
    stream.set_nodelay(true)?;
    Ok((stream, addr))
}
