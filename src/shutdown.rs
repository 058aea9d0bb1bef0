// SPDX-License-Identifier: Apache-2.0

//! Single-fire shutdown signalling shared by every task of the agent.
//!
//! Any task may raise an event through a cloned [`ShutdownTrigger`]. Only the
//! first event is kept; later ones are logged and discarded. The agent blocks
//! on a [`ShutdownListener`] and learns which event won.

use std::fmt;
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownEvent {
    /// An operator signal was received, carrying the signal name.
    ExternalSignal(String),
    /// One-shot tailing reached end of file.
    SourceExhausted,
    /// The followed file could not be opened or read.
    SourceError(String),
    /// The GELF transport could not be opened or a write failed.
    SinkError(String),
}

impl ShutdownEvent {
    /// True when the tailing side raised the event itself. In that case it has
    /// already persisted its position and must not be asked again.
    pub fn from_source(&self) -> bool {
        matches!(
            self,
            ShutdownEvent::SourceExhausted | ShutdownEvent::SourceError(_)
        )
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            ShutdownEvent::SourceError(_) | ShutdownEvent::SinkError(_)
        )
    }
}

impl fmt::Display for ShutdownEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownEvent::ExternalSignal(name) => write!(f, "received signal {}", name),
            ShutdownEvent::SourceExhausted => write!(f, "reached end of input"),
            ShutdownEvent::SourceError(msg) => write!(f, "tailing failed: {}", msg),
            ShutdownEvent::SinkError(msg) => write!(f, "sending failed: {}", msg),
        }
    }
}

#[derive(Clone, Default)]
pub struct ShutdownTrigger {
    event: Arc<OnceLock<ShutdownEvent>>,
    fired: CancellationToken,
}

impl ShutdownTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `event` if nothing has fired yet. Returns whether this call won.
    pub fn fire(&self, event: ShutdownEvent) -> bool {
        match self.event.set(event) {
            Ok(()) => {
                self.fired.cancel();
                true
            }
            Err(ignored) => {
                debug!(event = %ignored, "Shutdown already in progress, ignoring event");
                false
            }
        }
    }

    pub fn is_fired(&self) -> bool {
        self.event.get().is_some()
    }

    pub fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            event: self.event.clone(),
            fired: self.fired.clone(),
        }
    }
}

pub struct ShutdownListener {
    event: Arc<OnceLock<ShutdownEvent>>,
    fired: CancellationToken,
}

impl ShutdownListener {
    /// Suspends until the first event fires and returns it.
    pub async fn wait(&self) -> ShutdownEvent {
        self.fired.cancelled().await;
        // the token is only cancelled after the event was stored
        self.event
            .get()
            .cloned()
            .expect("shutdown fired without an event")
    }

    pub fn try_event(&self) -> Option<ShutdownEvent> {
        self.event.get().cloned()
    }
}
