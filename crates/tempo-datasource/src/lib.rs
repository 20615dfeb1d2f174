// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Backend components for a Tempo trace datasource.
//!
//! Given a trace identifier, [`query_executor::TraceQueryExecutor`] fetches
//! the trace from a Tempo-compatible backend over HTTP, decodes the OTLP
//! protobuf payload, and converts it into a tabular [`trace_transform::Frame`]
//! for the dashboard frontend. [`request_registry::RequestRegistry`] carries
//! the inbound web request's auth context across the fixed plugin-host call
//! boundary so delegated OAuth credentials can be forwarded to the backend.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod http_utils;
pub mod oauth;
pub mod query_executor;
pub mod request_registry;
pub mod trace_transform;

pub use config::TempoDatasourceSettings;
pub use oauth::{OAuthToken, OAuthTokenProvider, RequestContext, SignedInUser};
pub use query_executor::{QueryError, QueryResponse, QueryResult, TraceQueryExecutor};
pub use request_registry::{QueryContext, RegistryScope, RequestRegistry};
pub use trace_transform::{Frame, TransformError};
