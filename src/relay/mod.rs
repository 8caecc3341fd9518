//! Relay server fanning encrypted frames out between clients
//!
//! The relay never touches a clipboard. It checks that every incoming frame
//! decrypts and decodes with the shared key, then forwards the frame bytes
//! unchanged to every other connected client.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::crypto::Cipher;
use crate::protocol;
use crate::sync::SyncError;
use crate::transport::{self, FrameReader, FrameWriter, FramingError};

/// One verified frame on its way to the other clients
#[derive(Debug, Clone)]
struct RelayedFrame {
    body: Bytes,
    sender: SocketAddr,
}

/// Relay tunables
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Frames buffered per client before it starts skipping
    pub channel_capacity: usize,

    /// Largest frame body accepted
    pub max_frame_size: usize,
}

/// Cheap handle for observing a running relay
#[derive(Debug, Clone)]
pub struct RelayHandle {
    tx: broadcast::Sender<RelayedFrame>,
}

impl RelayHandle {
    /// Number of clients currently connected
    pub fn connected_clients(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// TCP relay server
pub struct RelayServer {
    listener: TcpListener,
    cipher: Arc<Cipher>,
    settings: RelaySettings,
    tx: broadcast::Sender<RelayedFrame>,
}

impl RelayServer {
    /// Bind the relay listener
    pub async fn bind(
        address: &str,
        port: u16,
        cipher: Arc<Cipher>,
        settings: RelaySettings,
    ) -> std::io::Result<Self> {
        let listener = transport::bind(address, port).await?;
        let (tx, _) = broadcast::channel(settings.channel_capacity);

        Ok(Self {
            listener,
            cipher,
            settings,
            tx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn handle(&self) -> RelayHandle {
        RelayHandle {
            tx: self.tx.clone(),
        }
    }

    /// Accept clients until the listener fails
    pub async fn run(self) -> std::io::Result<()> {
        info!(
            "Relay listening on {} (key fingerprint {})",
            self.listener.local_addr()?,
            self.cipher.fingerprint()
        );

        loop {
            let (stream, addr) = transport::accept(&self.listener).await?;
            // Subscribe before spawning so no frame sent after accept is missed
            let rx = self.tx.subscribe();
            let tx = self.tx.clone();
            let cipher = Arc::clone(&self.cipher);
            let max_frame_size = self.settings.max_frame_size;

            tokio::spawn(async move {
                info!("Client connected: {}", addr);
                serve_client(stream, addr, cipher, tx, rx, max_frame_size).await;
                info!("Client disconnected: {}", addr);
            });
        }
    }
}

async fn serve_client(
    stream: TcpStream,
    addr: SocketAddr,
    cipher: Arc<Cipher>,
    tx: broadcast::Sender<RelayedFrame>,
    rx: broadcast::Receiver<RelayedFrame>,
    max_frame_size: usize,
) {
    let (reader, writer) = stream.into_split();
    let reader = FrameReader::new(reader, max_frame_size);
    let writer = FrameWriter::new(writer, max_frame_size);

    tokio::select! {
        result = forward_from_client(reader, addr, &cipher, &tx) => match result {
            Ok(()) => debug!("{} closed its stream", addr),
            Err(e) => warn!("Dropping {}: {}", addr, e),
        },
        result = deliver_to_client(writer, addr, rx) => {
            if let Err(e) = result {
                warn!("Failed to write to {}: {}", addr, e);
            }
        }
    }
}

/// Verify frames from one client and publish them
async fn forward_from_client(
    mut reader: FrameReader<tokio::net::tcp::OwnedReadHalf>,
    addr: SocketAddr,
    cipher: &Cipher,
    tx: &broadcast::Sender<RelayedFrame>,
) -> Result<(), SyncError> {
    loop {
        let body = match reader.read_frame().await {
            Ok(body) => body,
            Err(FramingError::Closed) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let payload = protocol::decode(&cipher.decrypt(&body)?)?;
        debug!("Relaying {:?} from {}", payload, addr);

        let frame = RelayedFrame {
            body: Bytes::from(body),
            sender: addr,
        };
        if tx.send(frame).is_err() {
            error!("Failed to broadcast frame from {}", addr);
        }
    }
}

/// Forward every other client's frames to one client
async fn deliver_to_client(
    mut writer: FrameWriter<tokio::net::tcp::OwnedWriteHalf>,
    addr: SocketAddr,
    mut rx: broadcast::Receiver<RelayedFrame>,
) -> Result<(), FramingError> {
    loop {
        match rx.recv().await {
            Ok(frame) if frame.sender == addr => continue,
            Ok(frame) => writer.write_frame(&frame.body).await?,
            Err(broadcast::error::RecvError::Lagged(count)) => {
                warn!("{} lagged; skipped {} frames", addr, count);
            }
            Err(broadcast::error::RecvError::Closed) => return Ok(()),
        }
    }
}
