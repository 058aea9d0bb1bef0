// SPDX-License-Identifier: Apache-2.0

use crate::exporters::gelf::error::Error;

/// Size of the header in front of every chunk.
pub const CHUNK_HEADER_LEN: usize = 12;

/// Largest number of chunks a collector will reassemble.
pub const MAX_CHUNKS: usize = 128;

pub const DEFAULT_CHUNK_SIZE: usize = 1420;

const MAX_DATAGRAM_SIZE: usize = 65507;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    Gzip,
    Zlib,
    None,
}

/// Configuration for the GELF exporter
#[derive(Debug, Clone)]
pub struct GelfExporterConfig {
    /// Collector host name or address
    pub server: String,
    pub port: u16,
    pub compression: Compression,
    /// Largest datagram sent, chunk header included
    pub chunk_size: usize,
}

impl Default for GelfExporterConfig {
    fn default() -> Self {
        Self {
            server: "localhost".to_string(),
            port: 12201,
            compression: Compression::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl GelfExporterConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.server.is_empty() {
            return Err(Error::Config("server must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(Error::Config("port must not be 0".to_string()));
        }
        if self.chunk_size <= CHUNK_HEADER_LEN || self.chunk_size > MAX_DATAGRAM_SIZE {
            return Err(Error::Config(format!(
                "chunk size must be between {} and {}, got {}",
                CHUNK_HEADER_LEN + 1,
                MAX_DATAGRAM_SIZE,
                self.chunk_size
            )));
        }
        Ok(())
    }
}
