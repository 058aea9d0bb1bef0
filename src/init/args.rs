// SPDX-License-Identifier: Apache-2.0

use crate::exporters::gelf::{Compression, GelfExporterConfig};
use crate::init::config::AgentConfig;
use crate::receivers::file::FileReceiverConfig;
use crate::receivers::file::config::default_state_path;
use clap::{Args, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use tower::BoxError;

#[derive(Copy, Clone, Debug, Default, ValueEnum, PartialEq, Eq)]
pub enum CompressionArg {
    #[default]
    Gzip,
    Zlib,
    None,
}

impl From<CompressionArg> for Compression {
    fn from(c: CompressionArg) -> Self {
        match c {
            CompressionArg::Gzip => Compression::Gzip,
            CompressionArg::Zlib => Compression::Zlib,
            CompressionArg::None => Compression::None,
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct AgentArgs {
    /// File to follow
    #[arg(long, env = "GELFTAIL_FILE", default_value = "/var/log/syslog")]
    pub file: PathBuf,

    /// Graylog server host name or address
    #[arg(long, env = "GELFTAIL_SERVER", default_value = "localhost")]
    pub server: String,

    /// Graylog GELF UDP port
    #[arg(long, env = "GELFTAIL_PORT", default_value = "12201")]
    pub port: u16,

    /// Log every sent or dropped line and every state change
    #[arg(short, long, env = "GELFTAIL_VERBOSE", default_value = "false")]
    pub verbose: bool,

    /// Read the file once from the beginning and exit, without saving or resuming a position
    #[arg(short = 'n', long, env = "GELFTAIL_NO_FOLLOW", default_value = "false")]
    pub no_follow: bool,

    /// Where to keep the read position (default: <file>.state)
    #[arg(long, env = "GELFTAIL_STATE_FILE")]
    pub state_file: Option<PathBuf>,

    /// Interval in milliseconds between position saves
    #[arg(long, env = "GELFTAIL_SAVE_INTERVAL_MS", default_value = "2000")]
    pub save_interval_ms: u64,

    /// Interval in milliseconds between checks for new data at end of file
    #[arg(long, env = "GELFTAIL_POLL_INTERVAL_MS", default_value = "250")]
    pub poll_interval_ms: u64,

    /// Number of lines buffered between reading and sending
    #[arg(long, env = "GELFTAIL_QUEUE_SIZE", default_value = "1000")]
    pub queue_size: usize,

    /// Compression applied to every GELF message
    #[arg(value_enum, long, env = "GELFTAIL_COMPRESSION", default_value = "gzip")]
    pub compression: CompressionArg,

    /// Largest UDP datagram in bytes; bigger messages are chunked
    #[arg(long, env = "GELFTAIL_CHUNK_SIZE", default_value = "1420")]
    pub chunk_size: usize,
}

impl AgentArgs {
    pub fn build_config(&self) -> Result<AgentConfig, BoxError> {
        let receiver = FileReceiverConfig {
            path: self.file.clone(),
            follow: !self.no_follow,
            state_path: self
                .state_file
                .clone()
                .unwrap_or_else(|| default_state_path(&self.file)),
            save_interval: Duration::from_millis(self.save_interval_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        };

        let exporter = GelfExporterConfig {
            server: self.server.clone(),
            port: self.port,
            compression: self.compression.into(),
            chunk_size: self.chunk_size,
        };

        let config = AgentConfig {
            receiver,
            exporter,
            queue_size: self.queue_size,
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }
}
