//! Two-loop clipboard sync over one encrypted stream
//!
//! The inbound loop reads frames, decrypts and decodes them and applies text to
//! the local clipboard. The outbound loop polls the local clipboard and sends
//! changes. Both share a [`SyncState`] so that a value that just arrived is not
//! bounced straight back to the peer.

pub mod state;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{oneshot, Mutex};
use tokio::time::sleep;
use tracing::{debug, info, warn};

pub use state::{is_echo, SyncState};

use crate::clipboard::{ClipboardError, ClipboardProvider};
use crate::crypto::{Cipher, CryptoError};
use crate::protocol::{self, ClipboardPayload, CodecError};
use crate::transport::{FrameReader, FrameWriter, FramingError, DEFAULT_MAX_FRAME_SIZE};

/// Default clipboard polling cadence
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// State handle shared by both loops of one connection
pub type SharedState = Arc<Mutex<SyncState>>;

/// Errors that end a sync loop
#[derive(Debug, Error)]
pub enum SyncError {
    /// Stream framing failed
    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),

    /// Frame did not authenticate
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Frame decrypted to a malformed payload
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Local clipboard failed
    #[error("Clipboard error: {0}")]
    Clipboard(#[from] ClipboardError),
}

/// Tunables for one sync session
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Time between clipboard polls
    pub poll_interval: Duration,

    /// Largest frame body accepted or sent
    pub max_frame_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Result of one outbound poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing new on the clipboard
    Idle,

    /// New text matched what was just received and was not sent
    Suppressed,

    /// New text was sent to the peer
    Sent,
}

/// Builds sync sessions that share a clipboard and a key
pub struct SyncEngine<C: ClipboardProvider + ?Sized> {
    clipboard: Arc<C>,
    cipher: Arc<Cipher>,
    config: SyncConfig,
}

impl<C: ClipboardProvider + ?Sized> SyncEngine<C> {
    pub fn new(clipboard: Arc<C>, cipher: Arc<Cipher>, config: SyncConfig) -> Self {
        Self {
            clipboard,
            cipher,
            config,
        }
    }

    /// Create both halves of a session over fresh, empty state
    pub fn session<R, W>(&self, reader: R, writer: W) -> (Inbound<R, C>, Outbound<W, C>)
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let state: SharedState = Arc::new(Mutex::new(SyncState::new()));

        let inbound = Inbound {
            reader: FrameReader::new(reader, self.config.max_frame_size),
            cipher: Arc::clone(&self.cipher),
            clipboard: Arc::clone(&self.clipboard),
            state: Arc::clone(&state),
            received: 0,
        };

        let outbound = Outbound {
            writer: FrameWriter::new(writer, self.config.max_frame_size),
            cipher: Arc::clone(&self.cipher),
            clipboard: Arc::clone(&self.clipboard),
            state,
            poll_interval: self.config.poll_interval,
            sent: 0,
        };

        (inbound, outbound)
    }

    /// Sync over `stream` until both loops have exited.
    ///
    /// Returns the first fatal error, inbound first. A peer that closes the
    /// stream at a frame boundary ends the session with `Ok`.
    pub async fn run<S>(&self, stream: S) -> Result<(), SyncError>
    where
        S: AsyncRead + AsyncWrite,
    {
        let (reader, writer) = tokio::io::split(stream);
        let (inbound, outbound) = self.session(reader, writer);
        let (closed_tx, closed_rx) = oneshot::channel::<()>();

        let inbound_task = async move {
            let result = inbound.run().await;
            // Dropping the sender tells the outbound loop the peer is gone
            drop(closed_tx);
            result
        };

        let (inbound_result, outbound_result) =
            tokio::join!(inbound_task, outbound.run(closed_rx));

        match &inbound_result {
            Ok(()) => info!("Inbound loop finished: connection closed by peer"),
            Err(e) => warn!("Inbound loop terminated: {}", e),
        }
        match &outbound_result {
            Ok(()) => debug!("Outbound loop finished"),
            Err(e) => warn!("Outbound loop terminated: {}", e),
        }

        inbound_result.and(outbound_result)
    }
}

/// Receiving half of a session
pub struct Inbound<R, C: ClipboardProvider + ?Sized> {
    reader: FrameReader<R>,
    cipher: Arc<Cipher>,
    clipboard: Arc<C>,
    state: SharedState,
    received: u64,
}

impl<R, C> Inbound<R, C>
where
    R: AsyncRead + Unpin,
    C: ClipboardProvider + ?Sized,
{
    /// Receive and apply one frame. `None` means the peer closed cleanly.
    pub async fn receive_once(&mut self) -> Result<Option<ClipboardPayload>, SyncError> {
        let body = match self.reader.read_frame().await {
            Ok(body) => body,
            Err(FramingError::Closed) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let plaintext = self.cipher.decrypt(&body)?;
        let payload = protocol::decode(&plaintext)?;
        self.received += 1;
        debug!("Received {:?} ({} byte frame)", payload, body.len());

        // Held across the clipboard write so no poll sees the new text
        // before it is recorded
        let mut state = self.state.lock().await;

        match &payload {
            ClipboardPayload::Text(text) => {
                self.clipboard.set_text(text).await?;
            }
            ClipboardPayload::Image { width, height, .. } => {
                info!(
                    "Received {}x{} image; image clipboard is not supported, ignoring",
                    width, height
                );
            }
        }

        state.record_applied(payload.clone());

        Ok(Some(payload))
    }

    /// Receive until the peer closes or a frame fails
    pub async fn run(mut self) -> Result<(), SyncError> {
        while self.receive_once().await?.is_some() {}
        debug!("Inbound loop applied {} frames", self.received);
        Ok(())
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }
}

/// Sending half of a session
pub struct Outbound<W, C: ClipboardProvider + ?Sized> {
    writer: FrameWriter<W>,
    cipher: Arc<Cipher>,
    clipboard: Arc<C>,
    state: SharedState,
    poll_interval: Duration,
    sent: u64,
}

impl<W, C> Outbound<W, C>
where
    W: AsyncWrite + Unpin,
    C: ClipboardProvider + ?Sized,
{
    /// One poll cycle without the leading sleep
    pub async fn poll_once(&mut self) -> Result<PollOutcome, SyncError> {
        let (candidate, generation) = {
            let mut state = self.state.lock().await;
            let current = self.clipboard.get_text().await?;
            // The suppression window covers exactly this one poll
            let applied = state.last_applied.take();

            let Some(candidate) = state.candidate(&current) else {
                return Ok(PollOutcome::Idle);
            };

            if is_echo(applied.as_ref(), &candidate) {
                debug!("Suppressing echo of just-received {:?}", candidate);
                return Ok(PollOutcome::Suppressed);
            }

            (candidate, state.applied_generation())
        };

        let body = self.cipher.encrypt(&protocol::encode(&candidate))?;
        self.writer.write_frame(&body).await?;
        self.sent += 1;
        debug!("Sent {:?} ({} byte frame)", candidate, body.len());

        if let ClipboardPayload::Text(text) = candidate {
            let mut state = self.state.lock().await;
            if !state.record_sent(text, generation) {
                debug!("Inbound update arrived during send; keeping it as current");
            }
        }

        Ok(PollOutcome::Sent)
    }

    /// Poll until `closed` fires or a send fails
    pub async fn run(mut self, mut closed: oneshot::Receiver<()>) -> Result<(), SyncError> {
        let result = loop {
            tokio::select! {
                _ = sleep(self.poll_interval) => {}
                _ = &mut closed => {
                    debug!("Connection closed; stopping clipboard polling");
                    break Ok(());
                }
            }

            if let Err(e) = self.poll_once().await {
                break Err(e);
            }
        };

        // Let the peer's inbound loop see the end of our stream
        if let Err(e) = self.writer.shutdown().await {
            debug!("Failed to shut down write half: {}", e);
        }
        debug!("Outbound loop sent {} frames", self.sent);

        result
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::MockClipboardProvider;
    use crate::transport::write_frame;
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;
    use tokio::io::{duplex, DuplexStream};

    fn cipher() -> Arc<Cipher> {
        Arc::new(Cipher::from_passphrase("secret"))
    }

    fn engine(clipboard: MockClipboardProvider) -> SyncEngine<MockClipboardProvider> {
        SyncEngine::new(Arc::new(clipboard), cipher(), SyncConfig::default())
    }

    fn sealed_frame(payload: &ClipboardPayload) -> Vec<u8> {
        let body = cipher().encrypt(&protocol::encode(payload)).unwrap();
        let mut wire = (body.len() as u32).to_be_bytes().to_vec();
        wire.extend_from_slice(&body);
        wire
    }

    #[tokio::test]
    async fn test_inbound_applies_text() {
        let mut clipboard = MockClipboardProvider::new();
        clipboard
            .expect_set_text()
            .with(eq("hello"))
            .times(1)
            .returning(|_| Ok(()));

        let wire = sealed_frame(&ClipboardPayload::Text("hello".to_string()));
        let (mut inbound, _outbound) = engine(clipboard).session(&wire[..], Vec::new());

        let payload = inbound.receive_once().await.unwrap();
        assert_eq!(payload, Some(ClipboardPayload::Text("hello".to_string())));

        let state = inbound.state().lock().await;
        assert_eq!(state.last_sent_text.as_deref(), Some("hello"));
        assert_eq!(
            state.last_applied,
            Some(ClipboardPayload::Text("hello".to_string()))
        );
    }

    #[tokio::test]
    async fn test_inbound_image_is_not_applied() {
        let mut clipboard = MockClipboardProvider::new();
        clipboard.expect_set_text().never();

        let image = ClipboardPayload::Image {
            width: 2,
            height: 2,
            pixels: vec![1; 16],
        };
        let wire = sealed_frame(&image);
        let (mut inbound, _outbound) = engine(clipboard).session(&wire[..], Vec::new());

        assert_eq!(inbound.receive_once().await.unwrap(), Some(image.clone()));
        let state = inbound.state().lock().await;
        assert_eq!(state.last_applied, Some(image));
        assert!(state.last_sent_text.is_none());
    }

    #[tokio::test]
    async fn test_inbound_clean_close() {
        let clipboard = MockClipboardProvider::new();
        let (inbound, _outbound) = engine(clipboard).session(tokio::io::empty(), Vec::new());
        inbound.run().await.unwrap();
    }

    #[tokio::test]
    async fn test_inbound_rejects_foreign_key() {
        let mut clipboard = MockClipboardProvider::new();
        clipboard.expect_set_text().never();

        let body = Cipher::from_passphrase("other")
            .encrypt(&protocol::encode(&ClipboardPayload::Text("x".to_string())))
            .unwrap();
        let mut wire = Vec::new();
        write_frame(&mut wire, &body, DEFAULT_MAX_FRAME_SIZE)
            .await
            .unwrap();

        let (inbound, _outbound) = engine(clipboard).session(&wire[..], Vec::new());
        let err = inbound.run().await.unwrap_err();
        assert!(matches!(err, SyncError::Crypto(CryptoError::Authentication)));
    }

    #[tokio::test]
    async fn test_inbound_rejects_malformed_payload() {
        let mut clipboard = MockClipboardProvider::new();
        clipboard.expect_set_text().never();

        // Declares 10 bytes of text but carries 2
        let mut plaintext = 0u32.to_le_bytes().to_vec();
        plaintext.extend_from_slice(&10u64.to_le_bytes());
        plaintext.extend_from_slice(b"hi");
        let body = cipher().encrypt(&plaintext).unwrap();
        let mut wire = Vec::new();
        write_frame(&mut wire, &body, DEFAULT_MAX_FRAME_SIZE)
            .await
            .unwrap();

        let (mut inbound, _outbound) = engine(clipboard).session(&wire[..], Vec::new());
        let err = inbound.receive_once().await.unwrap_err();
        assert!(matches!(err, SyncError::Codec(CodecError::LengthOverrun { .. })));

        let state = inbound.state().lock().await;
        assert!(state.last_applied.is_none());
        assert!(state.last_sent_text.is_none());
    }

    #[tokio::test]
    async fn test_inbound_clipboard_failure_is_fatal() {
        let mut clipboard = MockClipboardProvider::new();
        clipboard
            .expect_set_text()
            .returning(|_| Err(ClipboardError::Platform("no display".to_string())));

        let wire = sealed_frame(&ClipboardPayload::Text("hello".to_string()));
        let (mut inbound, _outbound) = engine(clipboard).session(&wire[..], Vec::new());
        let err = inbound.receive_once().await.unwrap_err();
        assert!(matches!(err, SyncError::Clipboard(_)));

        // Nothing is recorded for a write that never happened
        let state = inbound.state().lock().await;
        assert!(state.last_applied.is_none());
        assert!(state.last_sent_text.is_none());
    }

    #[tokio::test]
    async fn test_outbound_sends_changed_text() {
        let mut clipboard = MockClipboardProvider::new();
        clipboard
            .expect_get_text()
            .returning(|| Ok("world".to_string()));

        let (client, server) = duplex(4096);
        let (_inbound, mut outbound) = engine(clipboard).session(tokio::io::empty(), client);
        outbound.state().lock().await.last_sent_text = Some("hello".to_string());

        assert_eq!(outbound.poll_once().await.unwrap(), PollOutcome::Sent);
        assert_eq!(
            outbound.state().lock().await.last_sent_text.as_deref(),
            Some("world")
        );

        let mut reader = FrameReader::new(server, DEFAULT_MAX_FRAME_SIZE);
        let body = reader.read_frame().await.unwrap();
        let payload = protocol::decode(&cipher().decrypt(&body).unwrap()).unwrap();
        assert_eq!(payload, ClipboardPayload::Text("world".to_string()));

        // Unchanged clipboard on the next poll sends nothing
        assert_eq!(outbound.poll_once().await.unwrap(), PollOutcome::Idle);
    }

    #[tokio::test]
    async fn test_outbound_never_sends_empty_text() {
        let mut clipboard = MockClipboardProvider::new();
        clipboard.expect_get_text().returning(|| Ok(String::new()));

        let (_inbound, mut outbound) = engine(clipboard).session(tokio::io::empty(), Vec::new());
        assert_eq!(outbound.poll_once().await.unwrap(), PollOutcome::Idle);
    }

    #[tokio::test]
    async fn test_outbound_suppresses_echo_once() {
        let mut clipboard = MockClipboardProvider::new();
        clipboard
            .expect_get_text()
            .returning(|| Ok("bounce".to_string()));

        let (_inbound, mut outbound) = engine(clipboard).session(tokio::io::empty(), Vec::new());
        outbound.state().lock().await.last_applied =
            Some(ClipboardPayload::Text("bounce".to_string()));

        assert_eq!(outbound.poll_once().await.unwrap(), PollOutcome::Suppressed);
        assert!(outbound.state().lock().await.last_applied.is_none());

        // Window is single-shot: the next poll sends
        assert_eq!(outbound.poll_once().await.unwrap(), PollOutcome::Sent);
    }

    #[tokio::test]
    async fn test_outbound_image_applied_suppresses_any_text() {
        let mut clipboard = MockClipboardProvider::new();
        clipboard
            .expect_get_text()
            .returning(|| Ok("unrelated".to_string()));

        let (_inbound, mut outbound) = engine(clipboard).session(tokio::io::empty(), Vec::new());
        outbound.state().lock().await.last_applied = Some(ClipboardPayload::Image {
            width: 1,
            height: 1,
            pixels: vec![0; 4],
        });

        assert_eq!(outbound.poll_once().await.unwrap(), PollOutcome::Suppressed);
    }

    #[tokio::test]
    async fn test_outbound_idle_poll_clears_applied() {
        let mut clipboard = MockClipboardProvider::new();
        clipboard.expect_get_text().returning(|| Ok(String::new()));

        let (_inbound, mut outbound) = engine(clipboard).session(tokio::io::empty(), Vec::new());
        outbound.state().lock().await.last_applied =
            Some(ClipboardPayload::Text("x".to_string()));

        assert_eq!(outbound.poll_once().await.unwrap(), PollOutcome::Idle);
        assert!(outbound.state().lock().await.last_applied.is_none());
    }

    #[tokio::test]
    async fn test_outbound_clipboard_failure_is_fatal() {
        let mut clipboard = MockClipboardProvider::new();
        clipboard
            .expect_get_text()
            .returning(|| Err(ClipboardError::Platform("gone".to_string())));

        let (_inbound, outbound) = engine(clipboard).session(tokio::io::empty(), Vec::new());
        let (_tx, rx) = oneshot::channel();
        let err = outbound.run(rx).await.unwrap_err();
        assert!(matches!(err, SyncError::Clipboard(_)));
    }

    /// Mock clipboard whose reads follow its writes
    fn resident_clipboard(initial: &str) -> MockClipboardProvider {
        let content = Arc::new(std::sync::Mutex::new(initial.to_string()));
        let read = Arc::clone(&content);

        let mut clipboard = MockClipboardProvider::new();
        clipboard
            .expect_get_text()
            .returning(move || Ok(read.lock().unwrap().clone()));
        clipboard.expect_set_text().returning(move |text| {
            *content.lock().unwrap() = text.to_string();
            Ok(())
        });
        clipboard
    }

    /// Send "mine" from the local clipboard and deliver `incoming` while the
    /// send is still blocked on the peer
    async fn receive_during_send(
        incoming: ClipboardPayload,
    ) -> (
        Outbound<DuplexStream, MockClipboardProvider>,
        FrameReader<DuplexStream>,
    ) {
        let wire = sealed_frame(&incoming);
        // Smaller than one frame, so the write cannot finish on its own
        let (writer, peer) = duplex(16);
        let (mut inbound, mut outbound) =
            engine(resident_clipboard("mine")).session(&wire[..], writer);
        let mut peer = FrameReader::new(peer, DEFAULT_MAX_FRAME_SIZE);

        let (outcome, body) = tokio::join!(outbound.poll_once(), async {
            assert_eq!(inbound.receive_once().await.unwrap(), Some(incoming.clone()));
            peer.read_frame().await.unwrap()
        });

        assert_eq!(outcome.unwrap(), PollOutcome::Sent);
        let sent = protocol::decode(&cipher().decrypt(&body).unwrap()).unwrap();
        assert_eq!(sent, ClipboardPayload::Text("mine".to_string()));

        (outbound, peer)
    }

    #[tokio::test]
    async fn test_image_received_during_send_keeps_sent_text() {
        let image = ClipboardPayload::Image {
            width: 1,
            height: 1,
            pixels: vec![0; 4],
        };
        let (mut outbound, mut peer) = receive_during_send(image).await;
        assert_eq!(
            outbound.state().lock().await.last_sent_text.as_deref(),
            Some("mine")
        );

        assert_eq!(outbound.poll_once().await.unwrap(), PollOutcome::Idle);
        assert!(outbound.state().lock().await.last_applied.is_none());
        assert_eq!(outbound.poll_once().await.unwrap(), PollOutcome::Idle);

        // "mine" went out exactly once
        drop(outbound);
        assert!(peer.read_frame().await.unwrap_err().is_clean_close());
    }

    #[tokio::test]
    async fn test_text_received_during_send_wins() {
        let incoming = ClipboardPayload::Text("theirs".to_string());
        let (mut outbound, mut peer) = receive_during_send(incoming).await;
        assert_eq!(
            outbound.state().lock().await.last_sent_text.as_deref(),
            Some("theirs")
        );

        // Neither the received text nor the overwritten one is sent
        assert_eq!(outbound.poll_once().await.unwrap(), PollOutcome::Idle);
        assert_eq!(outbound.poll_once().await.unwrap(), PollOutcome::Idle);

        drop(outbound);
        assert!(peer.read_frame().await.unwrap_err().is_clean_close());
    }

    #[tokio::test]
    async fn test_outbound_stops_when_closed() {
        let clipboard = MockClipboardProvider::new();
        let (_inbound, outbound) = engine(clipboard).session(tokio::io::empty(), Vec::new());

        let (tx, rx) = oneshot::channel::<()>();
        drop(tx);
        outbound.run(rx).await.unwrap();
    }
}
