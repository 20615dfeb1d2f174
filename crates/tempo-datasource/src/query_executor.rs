// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Trace query execution against a Tempo-compatible backend.
//!
//! Each query is an independent transaction: build the outbound request
//! (injecting credentials as configured), dispatch it bound to the caller's
//! cancellation scope, then decode and tabulate the payload. A non-200
//! backend response is not a hard error: it is returned as a per-query
//! error result so one rejected trace does not abort sibling queries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use otlp_protobuf::pb;
use prost::Message;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::TempoDatasourceSettings;
use crate::http_utils::{build_client, redact_headers};
use crate::oauth::{OAuthTokenProvider, RequestContext};
use crate::request_registry::{QueryContext, RequestRegistry};
use crate::trace_transform::{self, Frame, TransformError};

const PROTOBUF_CONTENT_TYPE: &str = "application/protobuf";

/// Hard failures of a trace query.
///
/// Backend rejections (non-200 statuses) are deliberately absent: they are
/// reported through [`QueryResult::error`] instead.
#[derive(Debug, Error)]
pub enum QueryError {
    /// OAuth pass-through is enabled but the web layer never registered the
    /// request's auth context for this query's scope.
    #[error("request context not found; unable to configure oauth passthru")]
    RequestContextNotFound,
    #[error("failed to build tempo request: {0}")]
    Request(#[source] reqwest::Error),
    #[error("failed get to tempo: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("query cancelled while awaiting tempo response")]
    Cancelled,
    #[error("failed to convert tempo response to Otlp: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("failed to transform trace {trace_id} to data frame: {source}")]
    Transform {
        trace_id: String,
        #[source]
        source: TransformError,
    },
}

/// Outcome of one query: a frame, or the backend's rejection message.
#[derive(Clone, Debug, Default)]
pub struct QueryResult {
    pub frame: Option<Frame>,
    pub error: Option<String>,
}

/// Query results keyed by the caller-supplied reference identifier, so a
/// batch dispatcher can correlate each result to its originating query.
#[derive(Clone, Debug, Default)]
pub struct QueryResponse {
    pub results: HashMap<String, QueryResult>,
}

/// Executes trace queries for one datasource instance.
///
/// Holds no mutable state beyond the shared HTTP client; concurrent
/// `execute` calls on one instance are safe.
pub struct TraceQueryExecutor {
    http_client: reqwest::Client,
    registry: Arc<RequestRegistry<RequestContext>>,
    oauth_provider: Arc<dyn OAuthTokenProvider>,
}

impl TraceQueryExecutor {
    /// Builds an executor whose HTTP client honors the datasource's proxy
    /// and timeout settings.
    pub fn new(
        settings: &TempoDatasourceSettings,
        registry: Arc<RequestRegistry<RequestContext>>,
        oauth_provider: Arc<dyn OAuthTokenProvider>,
    ) -> Result<Self, reqwest::Error> {
        let http_client = build_client(
            settings.proxy_url.as_deref(),
            Duration::from_secs(settings.request_timeout_secs),
        )?;
        Ok(TraceQueryExecutor {
            http_client,
            registry,
            oauth_provider,
        })
    }

    /// Fetches the trace with `trace_id` and returns it as a frame tagged
    /// with `ref_id`.
    ///
    /// `trace_id` is forwarded verbatim; a malformed identifier surfaces as
    /// a backend rejection, not a local error. Cancelling `ctx` aborts the
    /// in-flight call.
    pub async fn execute(
        &self,
        ctx: &QueryContext,
        settings: &TempoDatasourceSettings,
        trace_id: &str,
        ref_id: &str,
    ) -> Result<QueryResponse, QueryError> {
        let request = self.create_request(ctx, settings, trace_id).await?;

        // Cancellation must cover the whole exchange, including the body
        // read, not just the initial dispatch.
        tokio::select! {
            _ = ctx.cancelled() => Err(QueryError::Cancelled),
            result = self.round_trip(request, trace_id, ref_id) => result,
        }
    }

    async fn round_trip(
        &self,
        request: reqwest::Request,
        trace_id: &str,
        ref_id: &str,
    ) -> Result<QueryResponse, QueryError> {
        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(QueryError::Transport)?;

        let status = response.status();
        if status != StatusCode::OK {
            // Drain the body regardless of status so the connection can be
            // reused; a read failure here must not mask the rejection.
            let body = match response.bytes().await {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(err) => {
                    warn!(error = %err, "failed to read tempo error response body");
                    String::new()
                }
            };
            debug!(trace_id, status = %status, "tempo rejected trace query");
            return Ok(single_result(
                ref_id,
                QueryResult {
                    frame: None,
                    error: Some(format!(
                        "failed to get trace with id: {trace_id} Status: {status} Body: {body}"
                    )),
                },
            ));
        }

        let body = response.bytes().await.map_err(QueryError::Transport)?;
        let traces = pb::TracesData::decode(body.as_ref())?;

        let mut frame =
            trace_transform::trace_to_frame(&traces).map_err(|source| QueryError::Transform {
                trace_id: trace_id.to_string(),
                source,
            })?;
        frame.ref_id = ref_id.to_string();

        Ok(single_result(
            ref_id,
            QueryResult {
                frame: Some(frame),
                error: None,
            },
        ))
    }

    async fn create_request(
        &self,
        ctx: &QueryContext,
        settings: &TempoDatasourceSettings,
        trace_id: &str,
    ) -> Result<reqwest::Request, QueryError> {
        let url = format!(
            "{}/api/traces/{}",
            settings.url.trim_end_matches('/'),
            trace_id
        );
        let mut builder = self.http_client.get(url);

        if settings.basic_auth {
            builder = builder.basic_auth(
                &settings.basic_auth_user,
                Some(&settings.basic_auth_password),
            );
        }

        if settings.oauth_pass_thru {
            debug!("configuring oauth passthru");
            let request_context = self
                .registry
                .get(ctx)
                .ok_or(QueryError::RequestContextNotFound)?;

            if let Some(token) = self
                .oauth_provider
                .current_oauth_token(&request_context.signed_in_user)
                .await
            {
                debug!("setting authorization header from oauth credentials");
                builder = builder.header(AUTHORIZATION, token.authorization_header());
            }
        }

        let request = builder
            .header(ACCEPT, PROTOBUF_CONTENT_TYPE)
            .build()
            .map_err(QueryError::Request)?;

        debug!(
            url = %request.url(),
            headers = ?redact_headers(request.headers()),
            "tempo request"
        );
        Ok(request)
    }
}

fn single_result(ref_id: &str, result: QueryResult) -> QueryResponse {
    QueryResponse {
        results: HashMap::from([(ref_id.to_string(), result)]),
    }
}
