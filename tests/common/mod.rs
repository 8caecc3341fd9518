#![allow(dead_code)]

use std::time::Duration;

use sync_clipboard::clipboard::{ClipboardError, ClipboardProvider};
use sync_clipboard::SyncConfig;
use tokio::time::{sleep, timeout};

/// In-memory clipboard standing in for the desktop one
pub struct TestClipboardProvider {
    content: tokio::sync::RwLock<String>,
    applied: tokio::sync::RwLock<Vec<String>>,
}

impl TestClipboardProvider {
    pub fn new() -> Self {
        Self {
            content: tokio::sync::RwLock::new(String::new()),
            applied: tokio::sync::RwLock::new(Vec::new()),
        }
    }

    /// Simulate the user copying `text` locally
    pub async fn copy(&self, text: &str) {
        *self.content.write().await = text.to_string();
    }

    pub async fn content(&self) -> String {
        self.content.read().await.clone()
    }

    /// Every value the sync engine wrote, in order
    pub async fn applied(&self) -> Vec<String> {
        self.applied.read().await.clone()
    }
}

#[async_trait::async_trait]
impl ClipboardProvider for TestClipboardProvider {
    async fn get_text(&self) -> Result<String, ClipboardError> {
        Ok(self.content.read().await.clone())
    }

    async fn set_text(&self, text: &str) -> Result<(), ClipboardError> {
        *self.content.write().await = text.to_string();
        self.applied.write().await.push(text.to_string());
        Ok(())
    }
}

/// Fast polling so tests finish quickly
pub fn fast_sync_config() -> SyncConfig {
    SyncConfig {
        poll_interval: Duration::from_millis(20),
        ..SyncConfig::default()
    }
}

/// Wait until `clipboard` holds `expected`, failing after five seconds
pub async fn wait_for_content(clipboard: &TestClipboardProvider, expected: &str) {
    timeout(Duration::from_secs(5), async {
        while clipboard.content().await != expected {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("clipboard never became {:?}", expected));
}
