// SPDX-License-Identifier: Apache-2.0

use crate::gelf::envelope::{Envelope, GELF_VERSION, UNKNOWN_STRUCTURED_HOST};
use crate::gelf::error::{Error, Result};
use crate::gelf::escape;
use crate::gelf::severity::SyslogLevel;
use serde_json::{Map, Number, Value};
use tracing::debug;

/// Field names the collector gives meaning to. They and their bare forms
/// (`id`, `ttl`, ...) are moved to a `renamed` key before sending.
pub const RESERVED_FIELDS: [&str; 7] = [
    "_id", "_ttl", "_source", "_all", "_index", "_type", "_score",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Structured,
    Text,
}

/// Object-like lines start with `{` and end with `}` once whitespace is trimmed.
pub fn classify(line: &[u8]) -> LineKind {
    let trimmed = line.trim_ascii();
    if trimmed.first() == Some(&b'{') && trimmed.last() == Some(&b'}') {
        LineKind::Structured
    } else {
        LineKind::Text
    }
}

/// Repairs, classifies and converts one raw line.
pub fn build(raw: &[u8]) -> Result<Envelope> {
    let repaired = escape::repair(raw);
    let line = repaired.trim_ascii();
    if line.is_empty() {
        return Err(Error::EmptyLine);
    }

    match classify(line) {
        LineKind::Structured => build_from_structured(line),
        LineKind::Text => Ok(build_from_text(line)),
    }
}

pub fn build_from_text(line: &[u8]) -> Envelope {
    Envelope::text(String::from_utf8_lossy(line.trim_ascii()))
}

/// Bytes that are not valid UTF-8, such as a decoded `\xE9`, become U+FFFD
/// instead of failing the whole line.
pub fn build_from_structured(line: &[u8]) -> Result<Envelope> {
    let text = String::from_utf8_lossy(line.trim_ascii());
    let mut fields = match serde_json::from_str::<Value>(&text)? {
        Value::Object(fields) => fields,
        _ => return Err(Error::NotAnObject),
    };

    rename_reserved_fields(&mut fields);

    let host = take_string(&mut fields, "host");
    let short_message = take_string(&mut fields, "short_message");
    let version = take_string(&mut fields, "version");
    let timestamp = take_timestamp(&mut fields);
    let level = take_level(&mut fields);

    Ok(Envelope {
        version: version.unwrap_or_else(|| GELF_VERSION.to_string()),
        host: host.unwrap_or_else(|| UNKNOWN_STRUCTURED_HOST.to_string()),
        short_message: short_message.unwrap_or_default(),
        timestamp,
        level,
        extra: fields,
    })
}

fn renamed_key(key: &str) -> Option<String> {
    if RESERVED_FIELDS.contains(&key) {
        Some(format!("renamed{}", key))
    } else if RESERVED_FIELDS.iter().any(|reserved| &reserved[1..] == key) {
        Some(format!("renamed_{}", key))
    } else {
        None
    }
}

fn rename_reserved_fields(fields: &mut Map<String, Value>) {
    let renames: Vec<(String, String)> = fields
        .keys()
        .filter_map(|key| renamed_key(key).map(|target| (key.clone(), target)))
        .collect();

    for (key, target) in renames {
        let Some(value) = fields.remove(&key) else {
            continue;
        };
        if fields.insert(target.clone(), value).is_some() {
            debug!(field = %key, target = %target, "Renamed field replaced an existing value");
        }
    }
}

/// Pulls a textual field. A value of any other type stays in the extra fields.
fn take_string(fields: &mut Map<String, Value>, key: &str) -> Option<String> {
    match fields.remove(key)? {
        Value::String(s) => Some(s),
        other => {
            debug!(field = key, value = %other, "Field is not a string, keeping it as extra");
            fields.insert(key.to_string(), other);
            None
        }
    }
}

/// Numbers are taken as they are; strings must parse as a float with no
/// surrounding whitespace.
fn take_timestamp(fields: &mut Map<String, Value>) -> f64 {
    match fields.remove("timestamp") {
        None => 0.0,
        Some(Value::Number(n)) => n.as_f64().unwrap_or_default(),
        Some(Value::String(s)) => s.parse::<f64>().unwrap_or_else(|_| {
            debug!(timestamp = %s, "Unparseable timestamp, using 0");
            0.0
        }),
        Some(other) => {
            debug!(timestamp = %other, "Unsupported timestamp type, using 0");
            0.0
        }
    }
}

fn take_level(fields: &mut Map<String, Value>) -> i32 {
    let level: Option<SyslogLevel> = match fields.remove("level") {
        None => None,
        Some(Value::Number(n)) => whole_number(&n).and_then(|n| n.try_into().ok()),
        Some(Value::String(s)) => s.parse().ok(),
        Some(other) => {
            debug!(level = %other, "Unsupported level type, using info");
            None
        }
    };
    level.unwrap_or_default().as_i32()
}

fn whole_number(n: &Number) -> Option<i64> {
    if let Some(i) = n.as_i64() {
        return Some(i);
    }
    n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)
}
