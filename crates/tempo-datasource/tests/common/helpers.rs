// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use std::net::SocketAddr;

use otlp_protobuf::pb;
use prost::Message;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

fn string_attribute(key: &str, value: &str) -> pb::KeyValue {
    pb::KeyValue {
        key: key.to_string(),
        value: Some(pb::AnyValue {
            value: Some(pb::any_value::Value::StringValue(value.to_string())),
        }),
    }
}

/// Creates a single-span OTLP trace payload as protobuf bytes.
pub fn create_test_trace_payload(service_name: &str) -> Vec<u8> {
    let traces = pb::TracesData {
        resource_spans: vec![pb::ResourceSpans {
            resource: Some(pb::Resource {
                attributes: vec![string_attribute("service.name", service_name)],
                dropped_attributes_count: 0,
            }),
            scope_spans: vec![pb::ScopeSpans {
                scope: None,
                spans: vec![pb::Span {
                    trace_id: vec![0x0a; 16],
                    span_id: vec![0x0b; 8],
                    name: "GET /checkout".to_string(),
                    start_time_unix_nano: 1_700_000_000_000_000_000,
                    end_time_unix_nano: 1_700_000_000_100_000_000,
                    attributes: vec![string_attribute("http.method", "GET")],
                    ..Default::default()
                }],
                schema_url: String::new(),
            }],
            schema_url: String::new(),
        }],
    };
    traces.encode_to_vec()
}

/// Starts a server that accepts connections and reads requests but never
/// responds, for exercising cancellation of in-flight calls.
pub async fn start_black_hole_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind black-hole server");
    let addr = listener.local_addr().expect("failed to get local addr");

    tokio::spawn(async move {
        loop {
            let (mut stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            tokio::spawn(async move {
                // Keep the connection open and silent.
                let mut sink = [0u8; 1024];
                while let Ok(read) = stream.read(&mut sink).await {
                    if read == 0 {
                        break;
                    }
                }
            });
        }
    });

    addr
}
