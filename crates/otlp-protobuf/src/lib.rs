// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Protobuf models for the OpenTelemetry trace-exchange protocol.
//!
//! The message definitions mirror `opentelemetry/proto/trace/v1/trace.proto`
//! and its `common`/`resource` dependencies, and are checked in rather than
//! generated at build time so consumers do not need `protoc` on the build
//! host. Decode a backend payload with `prost::Message`:
//!
//! ```
//! use prost::Message;
//! use otlp_protobuf::pb::TracesData;
//!
//! let traces = TracesData::decode(&b""[..]).unwrap();
//! assert!(traces.resource_spans.is_empty());
//! ```

pub mod pb;
