//! Per-connection protocol session
//!
//! Pairs a tokenizer with the message router. `feed` is synchronous and
//! returns as soon as the given bytes are consumed; partial tags stay
//! buffered until the next call.

use crate::config::ServerConfig;
use crate::error::IndiResult;
use crate::property::Device;
use crate::router::{MessageRouter, RouterStats};
use crate::tokenizer::Tokenizer;
use crate::IndiPropertyState;

/// A value produced on the device side, e.g. a fresh encoder reading
#[derive(Debug, Clone, PartialEq)]
pub struct EntryUpdate {
    pub vector: String,
    pub entry: String,
    /// Wire text, parsed according to the vector's kind
    pub value: String,
    pub state: IndiPropertyState,
}

impl EntryUpdate {
    pub fn new(
        vector: impl Into<String>,
        entry: impl Into<String>,
        value: impl Into<String>,
        state: IndiPropertyState,
    ) -> Self {
        Self {
            vector: vector.into(),
            entry: entry.into(),
            value: value.into(),
            state,
        }
    }

    pub fn number(
        vector: impl Into<String>,
        entry: impl Into<String>,
        value: f64,
        state: IndiPropertyState,
    ) -> Self {
        Self::new(vector, entry, format!("{:.6}", value), state)
    }

    pub fn switch(
        vector: impl Into<String>,
        entry: impl Into<String>,
        on: bool,
        state: IndiPropertyState,
    ) -> Self {
        Self::new(vector, entry, if on { "On" } else { "Off" }, state)
    }
}

pub struct IndiSession {
    tokenizer: Tokenizer,
    router: MessageRouter,
}

impl IndiSession {
    pub fn new(device: Device) -> Self {
        Self {
            tokenizer: Tokenizer::new(),
            router: MessageRouter::new(device),
        }
    }

    pub fn with_config(device: Device, config: &ServerConfig) -> Self {
        Self {
            tokenizer: Tokenizer::with_max_token_len(config.max_token_len),
            router: MessageRouter::new(device)
                .with_strict_device_match(config.strict_device_match),
        }
    }

    /// Consume peer bytes; returns complete outbound messages
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.tokenizer.feed(bytes, &mut self.router);
        self.router.take_output()
    }

    /// Apply a device-side value; returns the `set*Vector` to send the peer
    pub fn publish(&mut self, update: &EntryUpdate) -> IndiResult<String> {
        self.router
            .publish(&update.vector, &update.entry, &update.value, update.state)
    }

    /// Clear parser and assembly state for a new peer; the device is kept
    pub fn reset(&mut self) {
        self.tokenizer.reset();
        self.router.reset();
    }

    /// True when no partial tag or message is pending
    pub fn is_idle(&self) -> bool {
        self.tokenizer.is_idle() && !self.router.is_assembling()
    }

    pub fn device(&self) -> &Device {
        self.router.device()
    }

    pub fn stats(&self) -> &RouterStats {
        self.router.stats()
    }
}
