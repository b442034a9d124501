//! Streaming HTTP MCP client used toward upstream servers
//!
//! Requests are JSON POSTs; responses are either a single JSON object or an
//! SSE stream of `data:` events, each a complete JSON-RPC message.

use std::pin::Pin;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tracing::trace;

use crate::error::{McpError, McpResult};
use crate::proto::MCP_PROTOCOL_VERSION;
use crate::session::SESSION_ID_HEADER;
use crate::wire::{JsonRpcRequest, JsonRpcResponse};

const ACCEPT_VALUE: &str = "application/json, text/event-stream";
const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";

/// Outcome of a unary upstream call
#[derive(Debug)]
pub struct CallOutcome {
    pub response: JsonRpcResponse,
    /// Session id the upstream issued or echoed, if any
    pub session_id: Option<String>,
}

/// Messages flowing back from a streaming upstream call
pub struct UpstreamStream {
    /// True when the upstream answered with an SSE stream rather than a
    /// single JSON object
    pub streaming: bool,
    pub messages: Pin<Box<dyn Stream<Item = McpResult<JsonRpcResponse>> + Send>>,
}

/// HTTP client toward upstream MCP servers
#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    call_timeout: Duration,
}

impl UpstreamClient {
    pub fn new(call_timeout: Duration) -> McpResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| McpError::internal(format!("http client: {}", e)))?;
        Ok(Self { http, call_timeout })
    }

    /// Issue a request and wait for its single response. SSE responses are
    /// drained until the first complete JSON-RPC message.
    pub async fn call(
        &self,
        url: &str,
        session_id: Option<&str>,
        request: &JsonRpcRequest,
    ) -> McpResult<CallOutcome> {
        tokio::time::timeout(self.call_timeout, self.call_inner(url, session_id, request))
            .await
            .map_err(|_| McpError::UpstreamTimeout)?
    }

    async fn call_inner(
        &self,
        url: &str,
        session_id: Option<&str>,
        request: &JsonRpcRequest,
    ) -> McpResult<CallOutcome> {
        let response = self.post(url, session_id, request).await?;
        let issued_session = header_string(&response, SESSION_ID_HEADER);

        if !response.status().is_success() {
            return Err(McpError::upstream(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }

        if is_event_stream(&response) {
            let stream = sse_payloads(response.bytes_stream());
            futures_util::pin_mut!(stream);
            while let Some(payload) = stream.next().await {
                let payload = payload?;
                let message: JsonRpcResponse = serde_json::from_str(&payload)
                    .map_err(|e| McpError::upstream(format!("invalid SSE payload: {}", e)))?;
                if message.result.is_some() || message.error.is_some() {
                    return Ok(CallOutcome {
                        response: message,
                        session_id: issued_session,
                    });
                }
            }
            Err(McpError::upstream("SSE stream ended without a response"))
        } else {
            let message: JsonRpcResponse = response
                .json()
                .await
                .map_err(|e| McpError::upstream(format!("invalid response body: {}", e)))?;
            Ok(CallOutcome {
                response: message,
                session_id: issued_session,
            })
        }
    }

    /// Send a notification; no response body is expected
    pub async fn notify(
        &self,
        url: &str,
        session_id: Option<&str>,
        request: &JsonRpcRequest,
    ) -> McpResult<()> {
        let response = tokio::time::timeout(
            self.call_timeout,
            self.post(url, session_id, request),
        )
        .await
        .map_err(|_| McpError::UpstreamTimeout)??;

        if !response.status().is_success() && response.status().as_u16() != 202 {
            return Err(McpError::upstream(format!(
                "notification to {} returned {}",
                url,
                response.status()
            )));
        }
        Ok(())
    }

    /// Issue a request and surface every JSON-RPC message the upstream
    /// emits. A plain JSON response becomes a one-item stream.
    pub async fn call_streaming(
        &self,
        url: &str,
        session_id: Option<&str>,
        request: &JsonRpcRequest,
    ) -> McpResult<UpstreamStream> {
        let response = tokio::time::timeout(
            self.call_timeout,
            self.post(url, session_id, request),
        )
        .await
        .map_err(|_| McpError::UpstreamTimeout)??;

        if !response.status().is_success() {
            return Err(McpError::upstream(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }

        let streaming = is_event_stream(&response);
        let stream = async_stream::try_stream! {
            if streaming {
                let payloads = sse_payloads(response.bytes_stream());
                futures_util::pin_mut!(payloads);
                while let Some(payload) = payloads.next().await {
                    let payload = payload?;
                    let message: JsonRpcResponse = serde_json::from_str(&payload)
                        .map_err(|e| McpError::upstream(format!("invalid SSE payload: {}", e)))?;
                    yield message;
                }
            } else {
                let message: JsonRpcResponse = response
                    .json()
                    .await
                    .map_err(|e| McpError::upstream(format!("invalid response body: {}", e)))?;
                yield message;
            }
        };
        Ok(UpstreamStream {
            streaming,
            messages: Box::pin(stream),
        })
    }

    async fn post(
        &self,
        url: &str,
        session_id: Option<&str>,
        request: &JsonRpcRequest,
    ) -> McpResult<reqwest::Response> {
        let mut builder = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, ACCEPT_VALUE)
            .header(PROTOCOL_VERSION_HEADER, MCP_PROTOCOL_VERSION)
            .json(request);
        if let Some(session_id) = session_id {
            builder = builder.header(SESSION_ID_HEADER, session_id);
        }
        trace!(url, method = %request.method, "upstream request");
        Ok(builder.send().await?)
    }
}

fn is_event_stream(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("text/event-stream"))
        .unwrap_or(false)
}

fn header_string(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Parse an SSE byte stream into the `data:` payload of each event
pub(crate) fn sse_payloads<S, E>(bytes: S) -> impl Stream<Item = McpResult<String>> + Send
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    async_stream::try_stream! {
        let mut buffer = String::new();
        futures_util::pin_mut!(bytes);
        while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(|e| McpError::upstream(format!("stream read: {}", e)))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            // Events are separated by a blank line
            while let Some(boundary) = buffer.find("\n\n") {
                let event: String = buffer.drain(..boundary + 2).collect();
                let mut data_lines = Vec::new();
                for line in event.lines() {
                    if let Some(rest) = line.strip_prefix("data:") {
                        data_lines.push(rest.trim_start().to_string());
                    }
                }
                if !data_lines.is_empty() {
                    yield data_lines.join("\n");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn chunks(parts: &[&str]) -> impl Stream<Item = Result<bytes::Bytes, std::io::Error>> {
        let owned: Vec<Result<bytes::Bytes, std::io::Error>> = parts
            .iter()
            .map(|p| Ok(bytes::Bytes::copy_from_slice(p.as_bytes())))
            .collect();
        stream::iter(owned)
    }

    #[tokio::test]
    async fn test_sse_events_split_on_blank_line() {
        let stream = sse_payloads(chunks(&[
            "data: {\"a\":1}\n\ndata: {\"b\":2}\n\n",
        ]));
        let payloads: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(payloads, vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[tokio::test]
    async fn test_sse_event_split_across_chunks() {
        let stream = sse_payloads(chunks(&["data: {\"a\"", ":1}\n", "\n"]));
        let payloads: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(payloads, vec!["{\"a\":1}"]);
    }

    #[tokio::test]
    async fn test_sse_ignores_comments_and_event_names() {
        let stream = sse_payloads(chunks(&[
            ": keep-alive\n\nevent: message\ndata: {\"x\":true}\n\n",
        ]));
        let payloads: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(payloads, vec!["{\"x\":true}"]);
    }
}
