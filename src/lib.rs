//! # sync-clipboard
//!
//! Keeps the clipboards of two machines in sync over one TCP stream.
//!
//! Local clipboard changes are encoded ([`protocol`]), sealed with
//! AES-256-GCM ([`crypto`]) and written as length-prefixed frames
//! ([`transport`]). The [`sync`] engine runs the receive and poll loops and
//! keeps a just-received value from being echoed back. A [`relay`] server can
//! sit between clients that cannot reach each other directly.

pub mod cli;
pub mod clipboard;
pub mod config;
pub mod crypto;
pub mod protocol;
pub mod relay;
pub mod sync;
pub mod transport;

pub use config::Config;
pub use crypto::Cipher;
pub use protocol::ClipboardPayload;
pub use sync::{SyncConfig, SyncEngine};

/// Result type alias for sync-clipboard operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for sync-clipboard operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Clipboard operation error
    #[error("Clipboard error: {0}")]
    Clipboard(#[from] clipboard::ClipboardError),

    /// Sync session error
    #[error("Sync error: {0}")]
    Sync(#[from] sync::SyncError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
