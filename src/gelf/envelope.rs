// SPDX-License-Identifier: Apache-2.0

use crate::gelf::severity::SyslogLevel;
use serde_json::{Map, Value};

pub const GELF_VERSION: &str = "1.1";

/// Host reported for plain text lines.
pub const UNKNOWN_HOST: &str = "unknown";

/// Host reported for JSON lines without a usable `host` field.
pub const UNKNOWN_STRUCTURED_HOST: &str = "unknown_amqp";

/// One GELF message, ready for the transport.
///
/// `extra` holds every additional field; keys are unique. Serializing it to the
/// wire format is the transport's job.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub version: String,
    pub host: String,
    pub short_message: String,
    pub timestamp: f64,
    pub level: i32,
    pub extra: Map<String, Value>,
}

impl Envelope {
    /// Envelope for a line that is not a JSON object: the whole line becomes
    /// `short_message` and everything else takes its default.
    pub fn text(short_message: impl Into<String>) -> Self {
        Self {
            version: GELF_VERSION.to_string(),
            host: UNKNOWN_HOST.to_string(),
            short_message: short_message.into(),
            timestamp: 0.0,
            level: SyslogLevel::default().as_i32(),
            extra: Map::new(),
        }
    }
}
