//! System clipboard backed by `arboard`

use super::{ClipboardError, ClipboardProvider};
use arboard::Clipboard;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Desktop clipboard provider
pub struct SystemClipboard {
    clipboard: Arc<Mutex<Clipboard>>,
}

impl SystemClipboard {
    /// Open the desktop clipboard
    pub fn new() -> Result<Self, ClipboardError> {
        let clipboard = Clipboard::new()
            .map_err(|e| ClipboardError::Unavailable(format!("Failed to open clipboard: {}", e)))?;

        Ok(Self {
            clipboard: Arc::new(Mutex::new(clipboard)),
        })
    }

    /// Run a clipboard call off the async workers; arboard blocks on the
    /// display server round trip.
    async fn with_clipboard<T, F>(&self, op: F) -> Result<T, ClipboardError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Clipboard) -> Result<T, ClipboardError> + Send + 'static,
    {
        let clipboard = Arc::clone(&self.clipboard);
        tokio::task::spawn_blocking(move || {
            let mut guard = clipboard
                .lock()
                .map_err(|_| ClipboardError::Platform("clipboard lock poisoned".to_string()))?;
            op(&mut guard)
        })
        .await
        .map_err(|e| ClipboardError::Platform(format!("Clipboard task failed: {}", e)))?
    }
}

#[async_trait]
impl ClipboardProvider for SystemClipboard {
    async fn get_text(&self) -> Result<String, ClipboardError> {
        self.with_clipboard(|clipboard| match clipboard.get_text() {
            Ok(text) => Ok(text),
            // Empty clipboard or non-text content (e.g. an image)
            Err(arboard::Error::ContentNotAvailable) => Ok(String::new()),
            Err(e) => Err(ClipboardError::Platform(format!(
                "Failed to read clipboard: {}",
                e
            ))),
        })
        .await
    }

    async fn set_text(&self, text: &str) -> Result<(), ClipboardError> {
        let text = text.to_owned();
        let len = text.len();
        self.with_clipboard(move |clipboard| {
            clipboard
                .set_text(text)
                .map_err(|e| ClipboardError::Platform(format!("Failed to set clipboard: {}", e)))
        })
        .await?;

        debug!("Wrote {} bytes to system clipboard", len);
        Ok(())
    }
}
