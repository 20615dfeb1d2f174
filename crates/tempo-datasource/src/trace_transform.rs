// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Conversion of decoded OTLP traces into the tabular frame consumed by the
//! dashboard frontend.
//!
//! The frame holds one row per span. Complex span metadata (resource
//! attributes, span attributes, events) is carried as JSON-encoded string
//! columns so the frontend can render it without knowing the OTLP schema.

use std::fmt::Write as _;

use otlp_protobuf::pb;
use serde_json::{json, Value};
use thiserror::Error;

const NANOS_PER_MILLI: f64 = 1_000_000.0;

/// Column names, in frame order.
const COLUMN_TRACE_ID: &str = "traceID";
const COLUMN_SPAN_ID: &str = "spanID";
const COLUMN_PARENT_SPAN_ID: &str = "parentSpanID";
const COLUMN_OPERATION_NAME: &str = "operationName";
const COLUMN_SERVICE_NAME: &str = "serviceName";
const COLUMN_SERVICE_TAGS: &str = "serviceTags";
const COLUMN_START_TIME: &str = "startTime";
const COLUMN_DURATION: &str = "duration";
const COLUMN_LOGS: &str = "logs";
const COLUMN_TAGS: &str = "tags";

/// Error raised when a decoded trace cannot be tabulated.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("span has malformed trace id ({0} bytes)")]
    MalformedTraceId(usize),
    #[error("span has malformed span id ({0} bytes)")]
    MalformedSpanId(usize),
    #[error("span has malformed parent span id ({0} bytes)")]
    MalformedParentSpanId(usize),
    #[error("failed to serialize span metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// Values of one frame column.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValues {
    Strings(Vec<String>),
    Floats(Vec<f64>),
}

impl FieldValues {
    pub fn len(&self) -> usize {
        match self {
            FieldValues::Strings(values) => values.len(),
            FieldValues::Floats(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A named, typed frame column.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub name: String,
    pub values: FieldValues,
}

/// Tabular query result: an ordered set of equal-length columns, tagged with
/// the reference identifier of the query that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub name: String,
    pub ref_id: String,
    pub fields: Vec<Field>,
}

impl Frame {
    pub fn row_count(&self) -> usize {
        self.fields.first().map_or(0, |field| field.values.len())
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }
}

#[derive(Default)]
struct Columns {
    trace_ids: Vec<String>,
    span_ids: Vec<String>,
    parent_span_ids: Vec<String>,
    operation_names: Vec<String>,
    service_names: Vec<String>,
    service_tags: Vec<String>,
    start_times: Vec<f64>,
    durations: Vec<f64>,
    logs: Vec<String>,
    tags: Vec<String>,
}

/// Flattens a decoded trace into one frame with a row per span.
///
/// An empty trace produces an empty frame; a span with identifier bytes of
/// the wrong length is structurally invalid and fails the whole conversion.
pub fn trace_to_frame(traces: &pb::TracesData) -> Result<Frame, TransformError> {
    let mut columns = Columns::default();

    for resource_spans in &traces.resource_spans {
        let resource_attributes = resource_spans
            .resource
            .as_ref()
            .map(|resource| resource.attributes.as_slice())
            .unwrap_or_default();
        let service_name = find_string_attribute(resource_attributes, "service.name");
        let service_tags = serde_json::to_string(&attributes_json(resource_attributes))?;

        for scope_spans in &resource_spans.scope_spans {
            for span in &scope_spans.spans {
                append_span(&mut columns, span, &service_name, &service_tags)?;
            }
        }
    }

    Ok(Frame {
        name: "Trace".to_string(),
        ref_id: String::new(),
        fields: vec![
            string_field(COLUMN_TRACE_ID, columns.trace_ids),
            string_field(COLUMN_SPAN_ID, columns.span_ids),
            string_field(COLUMN_PARENT_SPAN_ID, columns.parent_span_ids),
            string_field(COLUMN_OPERATION_NAME, columns.operation_names),
            string_field(COLUMN_SERVICE_NAME, columns.service_names),
            string_field(COLUMN_SERVICE_TAGS, columns.service_tags),
            float_field(COLUMN_START_TIME, columns.start_times),
            float_field(COLUMN_DURATION, columns.durations),
            string_field(COLUMN_LOGS, columns.logs),
            string_field(COLUMN_TAGS, columns.tags),
        ],
    })
}

fn append_span(
    columns: &mut Columns,
    span: &pb::Span,
    service_name: &str,
    service_tags: &str,
) -> Result<(), TransformError> {
    if span.trace_id.len() != 16 {
        return Err(TransformError::MalformedTraceId(span.trace_id.len()));
    }
    if span.span_id.len() != 8 {
        return Err(TransformError::MalformedSpanId(span.span_id.len()));
    }
    if !span.parent_span_id.is_empty() && span.parent_span_id.len() != 8 {
        return Err(TransformError::MalformedParentSpanId(
            span.parent_span_id.len(),
        ));
    }

    let start_ms = span.start_time_unix_nano as f64 / NANOS_PER_MILLI;
    let duration_ms =
        span.end_time_unix_nano.saturating_sub(span.start_time_unix_nano) as f64 / NANOS_PER_MILLI;

    columns.trace_ids.push(hex_id(&span.trace_id));
    columns.span_ids.push(hex_id(&span.span_id));
    columns.parent_span_ids.push(hex_id(&span.parent_span_id));
    columns.operation_names.push(span.name.clone());
    columns.service_names.push(service_name.to_string());
    columns.service_tags.push(service_tags.to_string());
    columns.start_times.push(start_ms);
    columns.durations.push(duration_ms);
    columns
        .logs
        .push(serde_json::to_string(&events_json(&span.events))?);
    columns
        .tags
        .push(serde_json::to_string(&attributes_json(&span.attributes))?);
    Ok(())
}

fn string_field(name: &str, values: Vec<String>) -> Field {
    Field {
        name: name.to_string(),
        values: FieldValues::Strings(values),
    }
}

fn float_field(name: &str, values: Vec<f64>) -> Field {
    Field {
        name: name.to_string(),
        values: FieldValues::Floats(values),
    }
}

fn hex_id(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        // Writing to a String cannot fail.
        let _ = write!(out, "{byte:02x}");
    }
    out
}

fn find_string_attribute(attributes: &[pb::KeyValue], key: &str) -> String {
    attributes
        .iter()
        .find(|attribute| attribute.key == key)
        .and_then(|attribute| attribute.value.as_ref())
        .and_then(|value| match &value.value {
            Some(pb::any_value::Value::StringValue(text)) => Some(text.clone()),
            _ => None,
        })
        .unwrap_or_default()
}

fn attributes_json(attributes: &[pb::KeyValue]) -> Value {
    let entries = attributes
        .iter()
        .map(|attribute| {
            (
                attribute.key.clone(),
                any_value_json(attribute.value.as_ref()),
            )
        })
        .collect::<serde_json::Map<String, Value>>();
    Value::Object(entries)
}

fn any_value_json(value: Option<&pb::AnyValue>) -> Value {
    match value.and_then(|value| value.value.as_ref()) {
        Some(pb::any_value::Value::StringValue(text)) => json!(text),
        Some(pb::any_value::Value::BoolValue(flag)) => json!(flag),
        Some(pb::any_value::Value::IntValue(number)) => json!(number),
        Some(pb::any_value::Value::DoubleValue(number)) => json!(number),
        Some(pb::any_value::Value::ArrayValue(array)) => Value::Array(
            array
                .values
                .iter()
                .map(|element| any_value_json(Some(element)))
                .collect(),
        ),
        Some(pb::any_value::Value::KvlistValue(list)) => attributes_json(&list.values),
        Some(pb::any_value::Value::BytesValue(bytes)) => json!(hex_id(bytes)),
        None => Value::Null,
    }
}

fn events_json(events: &[pb::span::Event]) -> Value {
    Value::Array(
        events
            .iter()
            .map(|event| {
                json!({
                    "timestamp": event.time_unix_nano as f64 / NANOS_PER_MILLI,
                    "name": event.name,
                    "fields": attributes_json(&event.attributes),
                })
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use otlp_protobuf::pb;

    use super::{trace_to_frame, FieldValues, TransformError};

    fn string_attribute(key: &str, value: &str) -> pb::KeyValue {
        pb::KeyValue {
            key: key.to_string(),
            value: Some(pb::AnyValue {
                value: Some(pb::any_value::Value::StringValue(value.to_string())),
            }),
        }
    }

    fn int_attribute(key: &str, value: i64) -> pb::KeyValue {
        pb::KeyValue {
            key: key.to_string(),
            value: Some(pb::AnyValue {
                value: Some(pb::any_value::Value::IntValue(value)),
            }),
        }
    }

    fn test_span(span_id: u8, parent_span_id: Option<u8>) -> pb::Span {
        pb::Span {
            trace_id: vec![0xab; 16],
            span_id: vec![span_id; 8],
            parent_span_id: parent_span_id.map(|id| vec![id; 8]).unwrap_or_default(),
            name: format!("operation-{span_id}"),
            start_time_unix_nano: 1_700_000_000_000_000_000,
            end_time_unix_nano: 1_700_000_000_042_000_000,
            attributes: vec![int_attribute("http.status_code", 200)],
            events: vec![pb::span::Event {
                time_unix_nano: 1_700_000_000_001_000_000,
                name: "exception".to_string(),
                attributes: vec![string_attribute("exception.message", "boom")],
                dropped_attributes_count: 0,
            }],
            ..Default::default()
        }
    }

    fn test_trace() -> pb::TracesData {
        pb::TracesData {
            resource_spans: vec![pb::ResourceSpans {
                resource: Some(pb::Resource {
                    attributes: vec![
                        string_attribute("service.name", "checkout"),
                        string_attribute("deployment.environment", "staging"),
                    ],
                    dropped_attributes_count: 0,
                }),
                scope_spans: vec![pb::ScopeSpans {
                    scope: None,
                    spans: vec![test_span(0x01, None), test_span(0x02, Some(0x01))],
                    schema_url: String::new(),
                }],
                schema_url: String::new(),
            }],
        }
    }

    fn string_column<'a>(frame: &'a super::Frame, name: &str) -> &'a [String] {
        match &frame.field(name).expect("missing column").values {
            FieldValues::Strings(values) => values,
            FieldValues::Floats(_) => panic!("column {name} is not a string column"),
        }
    }

    fn float_column<'a>(frame: &'a super::Frame, name: &str) -> &'a [f64] {
        match &frame.field(name).expect("missing column").values {
            FieldValues::Floats(values) => values,
            FieldValues::Strings(_) => panic!("column {name} is not a float column"),
        }
    }

    #[test]
    fn test_frame_has_one_row_per_span() {
        let frame = trace_to_frame(&test_trace()).unwrap();

        assert_eq!(frame.name, "Trace");
        assert_eq!(frame.row_count(), 2);
        for field in &frame.fields {
            assert_eq!(field.values.len(), 2, "column {} length", field.name);
        }
    }

    #[test]
    fn test_span_identifiers_are_hex_encoded() {
        let frame = trace_to_frame(&test_trace()).unwrap();

        assert_eq!(string_column(&frame, "traceID")[0], "ab".repeat(16));
        assert_eq!(string_column(&frame, "spanID")[0], "01".repeat(8));
        // The root span has no parent; its child references it.
        assert_eq!(string_column(&frame, "parentSpanID")[0], "");
        assert_eq!(string_column(&frame, "parentSpanID")[1], "01".repeat(8));
    }

    #[test]
    fn test_timings_are_reported_in_milliseconds() {
        let frame = trace_to_frame(&test_trace()).unwrap();

        assert_eq!(float_column(&frame, "startTime")[0], 1_700_000_000_000.0);
        assert_eq!(float_column(&frame, "duration")[0], 42.0);
    }

    #[test]
    fn test_service_columns_come_from_resource_attributes() {
        let frame = trace_to_frame(&test_trace()).unwrap();

        assert_eq!(string_column(&frame, "serviceName")[0], "checkout");
        let tags: serde_json::Value =
            serde_json::from_str(&string_column(&frame, "serviceTags")[0]).unwrap();
        assert_eq!(tags["service.name"], "checkout");
        assert_eq!(tags["deployment.environment"], "staging");
    }

    #[test]
    fn test_span_metadata_columns_are_json() {
        let frame = trace_to_frame(&test_trace()).unwrap();

        let tags: serde_json::Value =
            serde_json::from_str(&string_column(&frame, "tags")[0]).unwrap();
        assert_eq!(tags["http.status_code"], 200);

        let logs: serde_json::Value =
            serde_json::from_str(&string_column(&frame, "logs")[0]).unwrap();
        assert_eq!(logs[0]["name"], "exception");
        assert_eq!(logs[0]["fields"]["exception.message"], "boom");
    }

    #[test]
    fn test_empty_trace_produces_empty_frame() {
        let frame = trace_to_frame(&pb::TracesData::default()).unwrap();
        assert_eq!(frame.row_count(), 0);
        assert_eq!(frame.fields.len(), 10);
    }

    #[test]
    fn test_malformed_trace_id_fails_conversion() {
        let mut traces = test_trace();
        traces.resource_spans[0].scope_spans[0].spans[0].trace_id = vec![0xab; 3];

        match trace_to_frame(&traces) {
            Err(TransformError::MalformedTraceId(3)) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_parent_span_id_fails_conversion() {
        let mut traces = test_trace();
        traces.resource_spans[0].scope_spans[0].spans[1].parent_span_id = vec![0x01; 4];

        assert!(matches!(
            trace_to_frame(&traces),
            Err(TransformError::MalformedParentSpanId(4))
        ));
    }

    #[test]
    fn test_missing_resource_yields_empty_service_columns() {
        let mut traces = test_trace();
        traces.resource_spans[0].resource = None;

        let frame = trace_to_frame(&traces).unwrap();
        assert_eq!(string_column(&frame, "serviceName")[0], "");
        assert_eq!(string_column(&frame, "serviceTags")[0], "{}");
    }
}
