//! The proxy relay's wire endpoint: `GET|HEAD|OPTIONS /proxy`. Forwards
//! requests to an origin that may refuse CORS or HEAD, rewrites Range
//! semantics for query-parameter-driven callers, and can perform
//! server-side DEFLATE or MediaGateway remapping on the way back.

use std::io::Read;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, head, options};
use axum::{Json, Router, body::Body};
use flate2::read::DeflateDecoder;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::config::PolicyConfig;
use crate::media::{parse_virtual_range, response_headers, to_absolute};

/// Shared state for the relay's axum router.
#[derive(Clone)]
pub struct GatewayState {
    pub client: Client,
    pub policy: PolicyConfig,
}

impl GatewayState {
    pub fn new(policy: PolicyConfig) -> Self {
        Self {
            client: Client::new(),
            policy,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    pub url: String,
    pub start: Option<u64>,
    pub end: Option<u64>,
    pub download: Option<String>,
    pub inflate: Option<u8>,
    pub size: Option<u64>,
    pub media: Option<u8>,
    #[serde(rename = "type")]
    pub mime: Option<String>,
}

/// Build the `/proxy` router.
pub fn create_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/proxy", get(proxy_get))
        .route("/proxy", head(proxy_head))
        .route("/proxy", options(proxy_options))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn validate_url(raw: &str) -> Result<url::Url, Response> {
    url::Url::parse(raw).map_err(|_| error_response(StatusCode::BAD_REQUEST, "invalid url"))
}

async fn proxy_options() -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, HEAD, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Range"),
    );
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static(
            "Content-Length, Content-Range, Accept-Ranges, Content-Disposition, X-File-Size, X-Range-Support",
        ),
    );
    headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
    (StatusCode::NO_CONTENT, headers).into_response()
}

async fn proxy_head(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<ProxyQuery>,
) -> Response {
    if validate_url(&query.url).is_err() {
        return error_response(StatusCode::BAD_REQUEST, "invalid url");
    }

    let upstream = state.client.head(&query.url).send().await;
    let mut headers = HeaderMap::new();

    let (content_length, supports_ranges) = match upstream {
        Ok(resp) => {
            let len = resp
                .headers()
                .get(header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            let ranges = resp
                .headers()
                .get(header::ACCEPT_RANGES)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.contains("bytes"));
            (len, ranges)
        }
        Err(_) => (None, false),
    };

    if let Some(len) = content_length {
        headers.insert(
            header::CONTENT_LENGTH,
            HeaderValue::from_str(&len.to_string()).unwrap(),
        );
        if let Ok(v) = HeaderValue::from_str(&len.to_string()) {
            headers.insert("x-file-size", v);
        }
    }
    headers.insert(
        "x-range-support",
        HeaderValue::from_static(if supports_ranges { "true" } else { "false" }),
    );

    (StatusCode::OK, headers).into_response()
}

async fn proxy_get(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<ProxyQuery>,
    headers: HeaderMap,
) -> Response {
    let url = match validate_url(&query.url) {
        Ok(u) => u,
        Err(resp) => return resp,
    };

    if query.media.unwrap_or(0) == 1 {
        return handle_media(&state, url.as_str(), &query, &headers).await;
    }

    // Determine the Range header to send upstream.
    let explicit_range = match (query.start, query.end) {
        (Some(s), Some(e)) => Some(format!("bytes={s}-{e}")),
        _ => headers
            .get(header::RANGE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };

    let mut req = state.client.get(url.as_str());
    if let Some(range) = &explicit_range {
        req = req.header(header::RANGE, range.clone());
    }

    let upstream = match req.send().await {
        Ok(r) => r,
        Err(e) => return error_response(StatusCode::BAD_GATEWAY, e.to_string()),
    };

    if upstream.status().as_u16() >= 400 {
        let status = upstream.status();
        return error_response(
            StatusCode::BAD_GATEWAY,
            format!("upstream returned {status}"),
        );
    }

    let upstream_status = upstream.status();
    let upstream_headers = upstream.headers().clone();

    if let Some(len) = upstream_headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        && len > state.policy.proxy_max_response_bytes
    {
        return error_response(StatusCode::PAYLOAD_TOO_LARGE, "resource exceeds size limit");
    }

    if query.inflate.unwrap_or(0) == 1 {
        let Some(declared_size) = query.size else {
            return error_response(StatusCode::BAD_REQUEST, "inflate=1 requires size");
        };
        let compressed = match upstream.bytes().await {
            Ok(b) => b,
            Err(e) => return error_response(StatusCode::BAD_GATEWAY, e.to_string()),
        };
        let mut decoder = DeflateDecoder::new(&compressed[..]);
        let mut out = Vec::with_capacity(declared_size as usize);
        if decoder.read_to_end(&mut out).is_err() {
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "decompression failed");
        }
        let mut resp_headers = HeaderMap::new();
        resp_headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );
        resp_headers.insert(
            header::CONTENT_LENGTH,
            HeaderValue::from_str(&out.len().to_string()).unwrap(),
        );
        return (StatusCode::OK, resp_headers, Body::from(out)).into_response();
    }

    let mut resp_headers = HeaderMap::new();
    for name in [
        header::CONTENT_TYPE,
        header::CONTENT_LENGTH,
        header::CONTENT_RANGE,
        header::ACCEPT_RANGES,
        header::CONTENT_DISPOSITION,
    ] {
        if let Some(v) = upstream_headers.get(&name) {
            resp_headers.insert(name, v.clone());
        }
    }

    let mut status = upstream_status;

    if let Some(basename) = &query.download {
        status = StatusCode::OK;
        resp_headers.remove(header::CONTENT_RANGE);
        let encoded = percent_encoding::utf8_percent_encode(
            basename,
            percent_encoding::NON_ALPHANUMERIC,
        );
        if let Ok(v) = HeaderValue::from_str(&format!(
            "attachment; filename=\"{encoded}\""
        )) {
            resp_headers.insert(header::CONTENT_DISPOSITION, v);
        }
        if let (Some(s), Some(e)) = (query.start, query.end) {
            resp_headers.insert(
                header::CONTENT_LENGTH,
                HeaderValue::from_str(&(e - s + 1).to_string()).unwrap(),
            );
        }
    }

    let body = match upstream.bytes().await {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_GATEWAY, e.to_string()),
    };

    (status, resp_headers, Body::from(body)).into_response()
}

/// `media=1&type=<mime>`: treat `start`/`end` as the absolute data region
/// of a STORED entry and the inbound `Range` header as relative to that
/// virtual file.
async fn handle_media(
    state: &GatewayState,
    origin_url: &str,
    query: &ProxyQuery,
    inbound_headers: &HeaderMap,
) -> Response {
    let (Some(data_start), Some(data_end_inclusive)) = (query.start, query.end) else {
        return error_response(StatusCode::BAD_REQUEST, "media=1 requires start and end");
    };
    let virtual_size = data_end_inclusive - data_start + 1;
    let mime = query
        .mime
        .clone()
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let range_header = inbound_headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok());
    let (relative, is_partial) = parse_virtual_range(range_header, virtual_size);
    let absolute = to_absolute(data_start, relative);

    let upstream = match state
        .client
        .get(origin_url)
        .header(
            header::RANGE,
            format!("bytes={}-{}", absolute.start(), absolute.end()),
        )
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => return error_response(StatusCode::BAD_GATEWAY, e.to_string()),
    };

    if !upstream.status().is_success() {
        let status = upstream.status();
        return error_response(StatusCode::BAD_GATEWAY, format!("upstream returned {status}"));
    }

    let body = match upstream.bytes().await {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_GATEWAY, e.to_string()),
    };

    let (status, resp_headers) = response_headers(relative, virtual_size, &mime, is_partial);
    (status, resp_headers, Body::from(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower::ServiceExt;

    #[tokio::test]
    async fn options_advertises_cors() {
        let state = Arc::new(GatewayState::new(PolicyConfig::default()));
        let router = create_router(state);
        let req = axum::http::Request::builder()
            .method("OPTIONS")
            .uri("/proxy")
            .body(Body::empty())
            .unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert!(resp.headers().contains_key(header::ACCESS_CONTROL_ALLOW_METHODS));
    }

    #[tokio::test]
    async fn get_rejects_invalid_url() {
        let state = Arc::new(GatewayState::new(PolicyConfig::default()));
        let router = create_router(state);
        let req = axum::http::Request::builder()
            .method("GET")
            .uri("/proxy?url=not-a-url")
            .body(Body::empty())
            .unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
