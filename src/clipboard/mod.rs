//! Clipboard abstraction for the sync engine
//!
//! The engine only needs to read the current text and to replace it; anything
//! that can do both implements [`ClipboardProvider`].

use async_trait::async_trait;
use thiserror::Error;

pub mod system;

pub use system::SystemClipboard;

/// Clipboard provider trait
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClipboardProvider: Send + Sync {
    /// Current clipboard text; empty when the clipboard holds no text
    async fn get_text(&self) -> Result<String, ClipboardError>;

    /// Replace the clipboard with the given text
    async fn set_text(&self, text: &str) -> Result<(), ClipboardError>;
}

/// Clipboard errors
#[derive(Debug, Error)]
pub enum ClipboardError {
    /// Platform-specific error
    #[error("Platform error: {0}")]
    Platform(String),

    /// Clipboard could not be opened at all
    #[error("Clipboard unavailable: {0}")]
    Unavailable(String),
}
