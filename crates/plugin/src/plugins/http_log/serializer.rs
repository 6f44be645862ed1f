//! Log entry serialization
//!
//! The delivery side treats the payload as opaque bytes; [`JsonSerializer`]
//! is the default encoding and can be swapped per hook.

use super::capture::CapturedExchange;
use crate::context::PluginContext;
use crate::hooks::{RequestInfo, ResponseInfo};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Everything known about a finished request
pub struct Snapshot<'a> {
    pub request: &'a RequestInfo,
    pub response: Option<&'a ResponseInfo>,
    pub error: Option<&'a str>,
    pub ctx: &'a PluginContext,
    pub exchange: &'a CapturedExchange,
}

/// Encodes a snapshot into a delivery payload
pub trait Serializer: Send + Sync {
    fn serialize(&self, snapshot: &Snapshot<'_>) -> Result<Vec<u8>, serde_json::Error>;
}

/// One JSON object per request
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

#[derive(Serialize)]
struct LogEntry<'a> {
    request: RequestEntry<'a>,
    response: ResponseEntry<'a>,
    latencies: Latencies,
    client_ip: Option<String>,
    upstream: Option<&'a str>,
    request_id: Option<&'a str>,
    started_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

#[derive(Serialize)]
struct RequestEntry<'a> {
    method: &'a str,
    uri: String,
    querystring: BTreeMap<String, String>,
    host: Option<&'a str>,
    headers: &'a HashMap<String, String>,
    size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<String>,
    truncated: bool,
}

#[derive(Serialize)]
struct ResponseEntry<'a> {
    status: u16,
    headers: Option<&'a HashMap<String, String>>,
    size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<String>,
    truncated: bool,
}

#[derive(Serialize)]
struct Latencies {
    request: u64,
}

fn body_text(body: Option<&[u8]>) -> Option<String> {
    body.map(|b| String::from_utf8_lossy(b).into_owned())
}

impl Serializer for JsonSerializer {
    fn serialize(&self, snapshot: &Snapshot<'_>) -> Result<Vec<u8>, serde_json::Error> {
        let Snapshot {
            request,
            response,
            error,
            ctx,
            exchange,
        } = snapshot;

        let uri = match &request.query {
            Some(query) if !query.is_empty() => format!("{}?{}", request.path, query),
            _ => request.path.clone(),
        };
        let querystring = request
            .query
            .as_deref()
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();

        let entry = LogEntry {
            request: RequestEntry {
                method: &request.method,
                uri,
                querystring,
                host: request.host.as_deref().or(ctx.host.as_deref()),
                headers: &request.headers,
                size: exchange.request_body().map_or(0, <[u8]>::len),
                body: body_text(exchange.request_body()),
                truncated: exchange.request_truncated(),
            },
            response: ResponseEntry {
                status: response
                    .map(|r| r.status)
                    .or(ctx.response_status)
                    .unwrap_or(0),
                headers: response.map(|r| &r.headers),
                size: exchange.response_body().map_or(0, <[u8]>::len),
                body: body_text(exchange.response_body()),
                truncated: exchange.response_truncated(),
            },
            latencies: Latencies {
                request: ctx.elapsed().as_millis() as u64,
            },
            client_ip: ctx.client_ip_str(),
            upstream: ctx.upstream.as_deref(),
            request_id: ctx.metadata.request_id.as_deref(),
            started_at: ctx.started_at.timestamp_millis(),
            error: *error,
        };

        serde_json::to_vec(&entry)
    }
}
