// SPDX-License-Identifier: Apache-2.0

use crate::exporters::gelf::GelfExporterConfig;
use crate::receivers::file::FileReceiverConfig;
use std::time::Duration;
use tower::BoxError;

/// Time allowed for shutdown after a signal before the process is forced out.
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// How long to wait for the tailing side to acknowledge the final save.
pub const FINAL_SAVE_TIMEOUT: Duration = Duration::from_millis(500);

/// How long the dispatch sink may keep sending queued lines during shutdown.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

pub const DEFAULT_QUEUE_SIZE: usize = 1000;

/// Everything the agent needs, built once at startup.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub receiver: FileReceiverConfig,
    pub exporter: GelfExporterConfig,
    pub queue_size: usize,
    pub grace_period: Duration,
    pub final_save_timeout: Duration,
    pub drain_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            receiver: FileReceiverConfig::default(),
            exporter: GelfExporterConfig::default(),
            queue_size: DEFAULT_QUEUE_SIZE,
            grace_period: SHUTDOWN_GRACE_PERIOD,
            final_save_timeout: FINAL_SAVE_TIMEOUT,
            drain_timeout: DRAIN_TIMEOUT,
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<(), BoxError> {
        self.receiver.validate()?;
        self.exporter.validate()?;
        if self.queue_size == 0 {
            return Err("queue size must be greater than zero".into());
        }
        Ok(())
    }
}
