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

//! Mapping OpenTelemetry log records to GELF messages.
//!
//! OTLP logs arrive as a tree: resources own scopes, scopes own records. Each record becomes one
//! [`Message`]; the scope & resource it hangs off contribute additional fields, prefixed with
//! `scope.` & `resource.` respectively so that an attribute of the same name at two levels yields
//! two distinct fields. Record attributes are copied unprefixed.
//!
//! Only scalar attributes are flattened. Nested maps & lists are not (yet) mapped to GELF fields
//! and are dropped.

use crate::{
    level::syslog_level,
    message::{FieldValue, Message},
};

use base64::{engine::general_purpose::STANDARD, Engine};
use opentelemetry_proto::tonic::{
    common::v1::{any_value, AnyValue, InstrumentationScope, KeyValue},
    logs::v1::{LogRecord, LogsData, ResourceLogs},
    resource::v1::Resource,
};

/// Resource attribute that, when present, overrides the message host
pub const HOST_NAME_ATTRIBUTE: &str = "host.name";

const SCOPE_PREFIX: &str = "scope";
const RESOURCE_PREFIX: &str = "resource";

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                        attribute values                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The three shapes an OTel attribute value can take, as far as GELF is concerned.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeKind {
    /// Anything that renders to a single string
    Scalar(String),
    /// A nested key/value list; not flattened
    Map,
    /// An array; not flattened
    List,
}

impl AttributeKind {
    pub fn of(value: Option<&AnyValue>) -> AttributeKind {
        match value.and_then(|v| v.value.as_ref()) {
            Some(any_value::Value::KvlistValue(_)) => AttributeKind::Map,
            Some(any_value::Value::ArrayValue(_)) => AttributeKind::List,
            other => AttributeKind::Scalar(scalar_to_string(other)),
        }
    }
}

fn scalar_to_string(value: Option<&any_value::Value>) -> String {
    match value {
        None => String::new(),
        Some(any_value::Value::StringValue(s)) => s.clone(),
        Some(any_value::Value::BoolValue(b)) => b.to_string(),
        Some(any_value::Value::IntValue(i)) => i.to_string(),
        Some(any_value::Value::DoubleValue(d)) => d.to_string(),
        Some(any_value::Value::BytesValue(bytes)) => STANDARD.encode(bytes),
        Some(other) => any_value_to_json(other).to_string(),
    }
}

fn any_value_to_json(value: &any_value::Value) -> serde_json::Value {
    use serde_json::Value as Json;
    #[allow(unreachable_patterns)]
    match value {
        any_value::Value::StringValue(s) => Json::String(s.clone()),
        any_value::Value::BoolValue(b) => Json::Bool(*b),
        any_value::Value::IntValue(i) => Json::from(*i),
        any_value::Value::DoubleValue(d) => Json::from(*d),
        any_value::Value::BytesValue(bytes) => Json::String(STANDARD.encode(bytes)),
        any_value::Value::ArrayValue(array) => Json::Array(
            array
                .values
                .iter()
                .map(|v| v.value.as_ref().map_or(Json::Null, any_value_to_json))
                .collect(),
        ),
        any_value::Value::KvlistValue(kvlist) => Json::Object(
            kvlist
                .values
                .iter()
                .map(|kv| {
                    (
                        kv.key.clone(),
                        kv.value
                            .as_ref()
                            .and_then(|v| v.value.as_ref())
                            .map_or(Json::Null, any_value_to_json),
                    )
                })
                .collect(),
        ),
        _ => Json::Null,
    }
}

/// Render a record body as text. Composite bodies are rendered as JSON.
pub fn body_to_string(body: Option<&AnyValue>) -> String {
    scalar_to_string(body.and_then(|b| b.value.as_ref()))
}

/// Flatten `attributes` into GELF additional fields, with keys prefixed by `prefix.` when `prefix`
/// is given.
pub fn attributes_to_extra(
    attributes: &[KeyValue],
    prefix: Option<&str>,
) -> Vec<(String, FieldValue)> {
    attributes
        .iter()
        .filter_map(|kv| {
            let key = match prefix {
                Some(prefix) => format!("{}.{}", prefix, kv.key),
                None => kv.key.clone(),
            };
            match AttributeKind::of(kv.value.as_ref()) {
                AttributeKind::Scalar(text) => Some((key, FieldValue::Text(text))),
                AttributeKind::Map | AttributeKind::List => None,
            }
        })
        .collect()
}

/// Pick the record timestamp (falling back to the observed timestamp when unset) & convert
/// nanoseconds since the epoch to fractional seconds.
pub fn gelf_timestamp(time_unix_nano: u64, observed_time_unix_nano: u64) -> f64 {
    let nanos = if time_unix_nano != 0 {
        time_unix_nano
    } else {
        observed_time_unix_nano
    };
    nanos as f64 / 1e9
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           conversion                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

fn from_record(record: &LogRecord) -> Message {
    let mut m = Message::default();

    m.set_short_message(body_to_string(record.body.as_ref()));
    m.set_level(syslog_level(record.severity_number));
    m.set_timestamp(gelf_timestamp(
        record.time_unix_nano,
        record.observed_time_unix_nano,
    ));

    m.update_extra_fields([
        (
            "otel_log_dropped_attributes_count",
            FieldValue::from(record.dropped_attributes_count),
        ),
        (
            "otel_log_event_name",
            FieldValue::from(record.event_name.as_str()),
        ),
        (
            "otel_log_severity_number",
            FieldValue::from(record.severity_number),
        ),
        (
            "otel_log_severity_text",
            FieldValue::from(record.severity_text.as_str()),
        ),
        (
            "otel_log_span_id",
            FieldValue::from(hex::encode(&record.span_id)),
        ),
        (
            "otel_log_trace_id",
            FieldValue::from(hex::encode(&record.trace_id)),
        ),
    ]);
    m.update_extra_fields(attributes_to_extra(&record.attributes, None));
    m
}

fn apply_scope(m: &mut Message, scope: Option<&InstrumentationScope>) {
    let (name, version, dropped, attributes) = match scope {
        Some(s) => (
            s.name.as_str(),
            s.version.as_str(),
            s.dropped_attributes_count,
            s.attributes.as_slice(),
        ),
        None => ("", "", 0, &[][..]),
    };
    m.update_extra_fields([
        (
            "otel_scope_dropped_attributes_count",
            FieldValue::from(dropped),
        ),
        ("otel_scope_name", FieldValue::from(name)),
        ("otel_scope_version", FieldValue::from(version)),
    ]);
    m.update_extra_fields(attributes_to_extra(attributes, Some(SCOPE_PREFIX)));
}

fn apply_resource(m: &mut Message, resource: Option<&Resource>) {
    let (dropped, attributes) = match resource {
        Some(r) => (r.dropped_attributes_count, r.attributes.as_slice()),
        None => (0, &[][..]),
    };
    m.update_extra_fields([(
        "otel_resource_dropped_attributes_count",
        FieldValue::from(dropped),
    )]);
    m.update_extra_fields(attributes_to_extra(attributes, Some(RESOURCE_PREFIX)));

    if let Some(host) = attributes.iter().find(|kv| kv.key == HOST_NAME_ATTRIBUTE) {
        m.set_host(body_to_string(host.value.as_ref()));
    }
}

/// Build the GELF message for a single log record.
///
/// # Panics
///
/// If the record's severity number lies outside `1..=24`; see [`syslog_level`].
pub fn convert(
    record: &LogRecord,
    scope: Option<&InstrumentationScope>,
    resource: Option<&Resource>,
) -> Message {
    let mut m = from_record(record);
    apply_scope(&mut m, scope);
    apply_resource(&mut m, resource);
    m
}

/// Convert an entire resource → scope → record tree, in document order.
pub fn convert_resource_logs(resource_logs: &[ResourceLogs]) -> Vec<Message> {
    resource_logs
        .iter()
        .flat_map(|rl| {
            rl.scope_logs.iter().flat_map(move |sl| {
                sl.log_records
                    .iter()
                    .map(move |lr| convert(lr, sl.scope.as_ref(), rl.resource.as_ref()))
            })
        })
        .collect()
}

/// Convenience wrapper over [`convert_resource_logs`]
pub fn convert_logs_data(logs: &LogsData) -> Vec<Message> {
    convert_resource_logs(&logs.resource_logs)
}

/// Total number of log records in a batch
pub fn log_record_count(resource_logs: &[ResourceLogs]) -> usize {
    resource_logs
        .iter()
        .flat_map(|rl| rl.scope_logs.iter())
        .map(|sl| sl.log_records.len())
        .sum()
}
