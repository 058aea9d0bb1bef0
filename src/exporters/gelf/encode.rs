// SPDX-License-Identifier: Apache-2.0

//! GELF wire format: JSON body, optional compression and UDP chunking.

use crate::exporters::gelf::config::{CHUNK_HEADER_LEN, Compression, MAX_CHUNKS};
use crate::exporters::gelf::error::{Error, Result};
use crate::gelf::Envelope;
use flate2::Compression as FlateLevel;
use flate2::write::{GzEncoder, ZlibEncoder};
use serde::Serialize;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::io::Write;
use tracing::debug;

const CHUNK_MAGIC: [u8; 2] = [0x1e, 0x0f];

#[derive(Serialize)]
struct WireMessage<'a> {
    version: &'a str,
    host: &'a str,
    short_message: &'a str,
    timestamp: f64,
    level: i32,
    #[serde(flatten)]
    additional: BTreeMap<Cow<'a, str>, &'a Value>,
}

/// Additional fields must start with `_` on the wire. A bare key whose prefixed
/// form is also present is dropped, so `_status` always wins over `status`.
fn additional_fields(extra: &Map<String, Value>) -> BTreeMap<Cow<'_, str>, &Value> {
    let mut fields: BTreeMap<Cow<'_, str>, &Value> = extra
        .iter()
        .filter(|(key, _)| key.starts_with('_'))
        .map(|(key, value)| (Cow::Borrowed(key.as_str()), value))
        .collect();

    for (key, value) in extra.iter().filter(|(key, _)| !key.starts_with('_')) {
        match fields.entry(Cow::Owned(format!("_{}", key))) {
            Entry::Vacant(entry) => {
                entry.insert(value);
            }
            Entry::Occupied(_) => {
                debug!(field = %key, "Dropping field shadowed by its prefixed form");
            }
        }
    }
    fields
}

pub fn encode_json(envelope: &Envelope) -> Result<Vec<u8>> {
    let message = WireMessage {
        version: &envelope.version,
        host: &envelope.host,
        short_message: &envelope.short_message,
        timestamp: envelope.timestamp,
        level: envelope.level,
        additional: additional_fields(&envelope.extra),
    };
    Ok(serde_json::to_vec(&message)?)
}

pub fn compress(payload: Vec<u8>, compression: Compression) -> Result<Vec<u8>> {
    match compression {
        Compression::None => Ok(payload),
        Compression::Gzip => {
            let buf = Vec::with_capacity(payload.len() / 2);
            let mut encoder = GzEncoder::new(buf, FlateLevel::default());
            encoder.write_all(&payload)?;
            Ok(encoder.finish()?)
        }
        Compression::Zlib => {
            let buf = Vec::with_capacity(payload.len() / 2);
            let mut encoder = ZlibEncoder::new(buf, FlateLevel::default());
            encoder.write_all(&payload)?;
            Ok(encoder.finish()?)
        }
    }
}

/// Splits `payload` into datagrams of at most `chunk_size` bytes, each with the
/// GELF chunk header.
pub fn chunk(payload: &[u8], chunk_size: usize, message_id: [u8; 8]) -> Result<Vec<Vec<u8>>> {
    let data_len = chunk_size.saturating_sub(CHUNK_HEADER_LEN);
    if data_len == 0 {
        return Err(Error::Config(format!(
            "chunk size {} leaves no room for data",
            chunk_size
        )));
    }

    let count = payload.len().div_ceil(data_len);
    if count > MAX_CHUNKS {
        return Err(Error::TooManyChunks {
            chunks: count,
            max: MAX_CHUNKS,
        });
    }

    Ok(payload
        .chunks(data_len)
        .enumerate()
        .map(|(seq, data)| {
            let mut datagram = Vec::with_capacity(CHUNK_HEADER_LEN + data.len());
            datagram.extend_from_slice(&CHUNK_MAGIC);
            datagram.extend_from_slice(&message_id);
            // both fit: count is at most MAX_CHUNKS
            datagram.push(seq as u8);
            datagram.push(count as u8);
            datagram.extend_from_slice(data);
            datagram
        })
        .collect())
}

/// Chunked message ids, unique for the life of the process.
pub struct MessageIds {
    seed: u64,
    next: u64,
}

impl Default for MessageIds {
    fn default() -> Self {
        let now = chrono::Utc::now();
        let nanos = now.timestamp_nanos_opt().unwrap_or_default() as u64;
        Self::new(nanos ^ (u64::from(std::process::id()) << 32))
    }
}

impl MessageIds {
    pub fn new(seed: u64) -> Self {
        Self { seed, next: 0 }
    }

    pub fn next_id(&mut self) -> [u8; 8] {
        let id = self.seed.wrapping_add(self.next);
        self.next = self.next.wrapping_add(1);
        id.to_be_bytes()
    }
}
