// Copyright (C) 2022-2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of otel-gelf-exporter.
//
// otel-gelf-exporter is free software: you can redistribute it and/or modify it under the terms of
// the GNU General Public License as published by the Free Software Foundation, either version 3 of
// the License, or (at your option) any later version.
//
// mpdpopm is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even
// the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details.
//
// You should have received a copy of the GNU General Public License along with mpdpopm.  If not,
// see <http://www.gnu.org/licenses/>.

//! GELF message model.
//!
//! [`Message`] is the unit handed to the wire writer: one per OpenTelemetry log record. It
//! serializes to the GELF 1.1 JSON [payload]; additional fields are emitted with the leading
//! underscore the format requires.
//!
//! [payload]: https://go2docs.graylog.org/current/getting_in_log_data/gelf.html

use crate::{
    error::{Error, Result},
    level::Level,
};

use backtrace::Backtrace;
use serde::{ser::SerializeMap, Serialize, Serializer};

use std::collections::BTreeMap;

/// The only GELF version we speak
pub const GELF_VERSION: &str = "1.1";

/// Host reported when the resource doesn't carry `host.name`
pub const UNKNOWN_HOST: &str = "UNKNOWN";

/// The value of a GELF additional field. GELF only admits strings & numbers.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
}

impl From<String> for FieldValue {
    fn from(x: String) -> Self {
        FieldValue::Text(x)
    }
}

impl From<&str> for FieldValue {
    fn from(x: &str) -> Self {
        FieldValue::Text(x.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(x: i64) -> Self {
        FieldValue::Integer(x)
    }
}

impl From<u32> for FieldValue {
    fn from(x: u32) -> Self {
        FieldValue::Integer(x as i64)
    }
}

impl From<i32> for FieldValue {
    fn from(x: i32) -> Self {
        FieldValue::Integer(x as i64)
    }
}

/// A single GELF message
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    version: &'static str,
    host: String,
    short_message: String,
    full_message: Option<String>,
    timestamp: f64,
    level: Level,
    extra: BTreeMap<String, FieldValue>,
}

impl std::default::Default for Message {
    fn default() -> Self {
        Message {
            version: GELF_VERSION,
            host: UNKNOWN_HOST.to_string(),
            short_message: String::new(),
            full_message: None,
            timestamp: 0.0,
            level: Level::LOG_DEBUG,
            extra: BTreeMap::new(),
        }
    }
}

impl Message {
    pub fn version(&self) -> &str {
        self.version
    }
    pub fn host(&self) -> &str {
        &self.host
    }
    pub fn short_message(&self) -> &str {
        &self.short_message
    }
    pub fn full_message(&self) -> Option<&str> {
        self.full_message.as_deref()
    }
    /// Seconds since the Unix epoch, with sub-second precision
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }
    pub fn level(&self) -> Level {
        self.level
    }
    /// Additional fields, keyed *without* the leading underscore
    pub fn extra(&self) -> &BTreeMap<String, FieldValue> {
        &self.extra
    }
    pub fn extra_field(&self, key: &str) -> Option<&FieldValue> {
        self.extra.get(key)
    }

    pub fn set_host<S: Into<String>>(&mut self, host: S) {
        self.host = host.into();
    }
    pub fn set_short_message<S: Into<String>>(&mut self, msg: S) {
        self.short_message = msg.into();
    }
    pub fn set_full_message<S: Into<String>>(&mut self, msg: S) {
        self.full_message = Some(msg.into());
    }
    pub fn set_timestamp(&mut self, timestamp: f64) {
        self.timestamp = timestamp;
    }
    pub fn set_level(&mut self, level: Level) {
        self.level = level;
    }
    /// Insert (or overwrite) a batch of additional fields
    pub fn update_extra_fields<I, K, V>(&mut self, fields: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        for (k, v) in fields {
            self.extra.insert(k.into(), v.into());
        }
    }

    /// Serialize this message to its GELF JSON payload (no framing).
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|err| Error::Encode {
            source: err,
            back: Backtrace::new(),
        })
    }
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("version", self.version)?;
        map.serialize_entry("host", &self.host)?;
        map.serialize_entry("short_message", &self.short_message)?;
        if let Some(full) = &self.full_message {
            map.serialize_entry("full_message", full)?;
        }
        map.serialize_entry("timestamp", &self.timestamp)?;
        map.serialize_entry("level", &(self.level as u8))?;
        // Always prefixed, even when the key already starts with '_'.
        for (key, value) in &self.extra {
            map.serialize_entry(&format!("_{}", key), value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let m = Message::default();
        assert_eq!(m.version(), "1.1");
        assert_eq!(m.host(), "UNKNOWN");
        assert!(m.full_message().is_none());
        assert!(m.extra().is_empty());
    }

    #[test]
    fn json_payload() {
        let mut m = Message::default();
        m.set_host("worker-7");
        m.set_short_message("Hello, world!");
        m.set_timestamp(1.5);
        m.set_level(Level::LOG_INFO);
        m.update_extra_fields([("otel_log_severity_number", FieldValue::from(9))]);
        m.update_extra_fields([("env", "prod"), ("_already", "prefixed")]);

        let value: serde_json::Value = serde_json::from_slice(&m.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "version": "1.1",
                "host": "worker-7",
                "short_message": "Hello, world!",
                "timestamp": 1.5,
                "level": 6,
                "_otel_log_severity_number": 9,
                "_env": "prod",
                "__already": "prefixed",
            })
        );
    }

    #[test]
    fn full_message_only_when_set() {
        let mut m = Message::default();
        let text = String::from_utf8(m.to_json().unwrap()).unwrap();
        assert!(!text.contains("full_message"));
        m.set_full_message("stack trace");
        let text = String::from_utf8(m.to_json().unwrap()).unwrap();
        assert!(text.contains("\"full_message\":\"stack trace\""));
    }

    #[test]
    fn underscored_keys_stay_distinct() {
        let mut m = Message::default();
        m.update_extra_fields([("env", "record"), ("_env", "other")]);
        let text = String::from_utf8(m.to_json().unwrap()).unwrap();
        assert_eq!(text.matches("\"_env\"").count(), 1);
        assert_eq!(text.matches("\"__env\"").count(), 1);

        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["_env"], "record");
        assert_eq!(value["__env"], "other");
    }
}
