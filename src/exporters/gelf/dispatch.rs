// SPDX-License-Identifier: Apache-2.0

use crate::bounded_channel::BoundedReceiver;
use crate::exporters::gelf::transport::Transport;
use crate::gelf;
use crate::receivers::file::RawLine;
use crate::shutdown::{ShutdownEvent, ShutdownTrigger};
use tracing::debug;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    pub sent: u64,
    /// Lines that could not be turned into an envelope
    pub dropped: u64,
    /// Envelopes the transport refused
    pub failed: u64,
}

/// Single consumer of the line queue. Lines are built and sent strictly in
/// queue order.
pub struct DispatchSink<T> {
    transport: T,
    lines_rx: BoundedReceiver<RawLine>,
    shutdown: ShutdownTrigger,
    stats: DispatchStats,
}

impl<T: Transport> DispatchSink<T> {
    pub fn new(
        transport: T,
        lines_rx: BoundedReceiver<RawLine>,
        shutdown: ShutdownTrigger,
    ) -> Self {
        Self {
            transport,
            lines_rx,
            shutdown,
            stats: DispatchStats::default(),
        }
    }

    /// Runs until the queue is closed and empty. A failed send raises a sink
    /// error but does not stop the loop.
    pub async fn run(mut self) -> DispatchStats {
        while let Some(line) = self.lines_rx.next().await {
            let envelope = match gelf::build(&line) {
                Ok(envelope) => envelope,
                Err(e) => {
                    self.stats.dropped += 1;
                    debug!(error = %e, line = %String::from_utf8_lossy(&line), "Dropping line");
                    continue;
                }
            };

            match self.transport.send(&envelope).await {
                Ok(()) => {
                    self.stats.sent += 1;
                    debug!(
                        timestamp = envelope.timestamp,
                        short_message = %envelope.short_message,
                        "Sent message"
                    );
                }
                Err(e) => {
                    self.stats.failed += 1;
                    debug!(error = %e, "Failed to send message");
                    let reason = format!("cannot send GELF message: {}", e);
                    self.shutdown.fire(ShutdownEvent::SinkError(reason));
                }
            }
        }

        debug!(
            sent = self.stats.sent,
            dropped = self.stats.dropped,
            failed = self.stats.failed,
            "Dispatch finished"
        );
        self.stats
    }
}
