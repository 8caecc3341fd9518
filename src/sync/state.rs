//! Echo-suppression state shared by the inbound and outbound loops

use crate::protocol::ClipboardPayload;

/// Per-connection sync state.
///
/// Lives behind a single mutex; every read-modify-write happens under one
/// lock acquisition.
#[derive(Debug, Default)]
pub struct SyncState {
    /// Payload most recently received and applied, consumed by the next poll
    pub last_applied: Option<ClipboardPayload>,

    /// Text most recently sent, or made resident by an inbound apply
    pub last_sent_text: Option<String>,

    /// Bumped whenever inbound text replaces `last_sent_text`, so an
    /// in-flight send can tell whether it was overtaken
    applied_generation: u64,
}

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a payload received from the peer
    pub fn record_applied(&mut self, payload: ClipboardPayload) {
        // Images never become resident text, so they cannot overtake a send
        if let ClipboardPayload::Text(text) = &payload {
            self.last_sent_text = Some(text.clone());
            self.applied_generation = self.applied_generation.wrapping_add(1);
        }
        self.last_applied = Some(payload);
    }

    pub fn applied_generation(&self) -> u64 {
        self.applied_generation
    }

    /// Turn the current clipboard text into a send candidate.
    ///
    /// Empty text and text equal to what was last sent produce nothing.
    pub fn candidate(&self, current: &str) -> Option<ClipboardPayload> {
        if current.is_empty() || self.last_sent_text.as_deref() == Some(current) {
            return None;
        }
        Some(ClipboardPayload::Text(current.to_owned()))
    }

    /// Record a completed send unless inbound text overtook it
    pub fn record_sent(&mut self, text: String, generation: u64) -> bool {
        if self.applied_generation != generation {
            return false;
        }
        self.last_sent_text = Some(text);
        true
    }
}

/// Whether `candidate` would bounce a just-applied payload back to the peer.
///
/// An applied image suppresses any candidate for one cycle; pixels are not
/// compared.
pub fn is_echo(last_applied: Option<&ClipboardPayload>, candidate: &ClipboardPayload) -> bool {
    match (last_applied, candidate) {
        (None, _) => false,
        (Some(ClipboardPayload::Image { .. }), _) => true,
        (Some(ClipboardPayload::Text(applied)), ClipboardPayload::Text(current)) => {
            applied == current
        }
        (Some(ClipboardPayload::Text(_)), ClipboardPayload::Image { .. }) => false,
    }
}
