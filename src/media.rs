//! Sub-range media streaming gateway.
//!
//! Presents a STORED entry's data region within the enclosing archive as a
//! standalone, randomly seekable "virtual file" to an HTTP client (a media
//! player issuing `Range` requests). DEFLATE entries cannot be served this
//! way since decoding isn't random-access.
//!
//! The range-header parsing and response-header construction below follow
//! a standard HTTP range-serving shape, adapted to the virtual-file remap
//! formula: an absolute offset is the entry's data-region start plus the
//! client's requested relative offset.

use std::ops::RangeInclusive;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Router, body::Body};

use crate::source::ByteSource;

/// A byte range relative to the virtual file, always clamped to
/// `[0, virtual_size - 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualRange {
    pub start: u64,
    pub end_inclusive: u64,
}

impl VirtualRange {
    pub fn len(&self) -> u64 {
        self.end_inclusive - self.start + 1
    }
}

/// Parse a client's `Range` header against a virtual file of `virtual_size`
/// bytes. Returns the clamped range and whether the request was a ranged
/// one at all. A syntactically invalid header, or no header, is treated as
/// a request for the full file.
pub fn parse_virtual_range(header_value: Option<&str>, virtual_size: u64) -> (VirtualRange, bool) {
    let full = VirtualRange {
        start: 0,
        end_inclusive: virtual_size.saturating_sub(1),
    };
    let Some(raw) = header_value else {
        return (full, false);
    };
    let Some(spec) = raw.trim().strip_prefix("bytes=") else {
        return (full, false);
    };
    let Some((start_str, end_str)) = spec.split_once('-') else {
        return (full, false);
    };

    let start = if start_str.is_empty() {
        // Suffix range: "-N" means the last N bytes.
        match end_str.parse::<u64>() {
            Ok(n) if n > 0 => virtual_size.saturating_sub(n),
            _ => return (full, false),
        }
    } else {
        match start_str.parse::<u64>() {
            Ok(s) => s,
            Err(_) => return (full, false),
        }
    };

    let end_inclusive = if start_str.is_empty() {
        virtual_size.saturating_sub(1)
    } else if end_str.is_empty() {
        virtual_size.saturating_sub(1)
    } else {
        match end_str.parse::<u64>() {
            Ok(e) => e.min(virtual_size.saturating_sub(1)),
            Err(_) => return (full, false),
        }
    };

    if start >= virtual_size || start > end_inclusive {
        return (full, false);
    }

    (
        VirtualRange {
            start,
            end_inclusive,
        },
        true,
    )
}

/// Translate a virtual-file range into the absolute range within the
/// enclosing archive.
pub fn to_absolute(data_start: u64, relative: VirtualRange) -> RangeInclusive<u64> {
    (data_start + relative.start)..=(data_start + relative.end_inclusive)
}

/// Build the response headers for a given virtual range: 206 +
/// `Content-Range` for a partial request, 200 for a full one. Always
/// advertises `Accept-Ranges: bytes` and marks the response immutable for
/// the ZIP's lifetime.
pub fn response_headers(
    relative: VirtualRange,
    virtual_size: u64,
    mime: &str,
    is_partial: bool,
) -> (StatusCode, HeaderMap) {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("max-age=3600, immutable"),
    );
    if let Ok(ct) = HeaderValue::from_str(mime) {
        headers.insert(header::CONTENT_TYPE, ct);
    }
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&relative.len().to_string()).unwrap(),
    );

    if is_partial {
        headers.insert(
            header::CONTENT_RANGE,
            HeaderValue::from_str(&format!(
                "bytes {}-{}/{}",
                relative.start, relative.end_inclusive, virtual_size
            ))
            .unwrap(),
        );
        (StatusCode::PARTIAL_CONTENT, headers)
    } else {
        (StatusCode::OK, headers)
    }
}

/// Shared state for an in-process MediaGateway route: the archive's byte
/// source plus the absolute bounds of one STORED entry's data region.
#[derive(Clone)]
pub struct MediaGatewayState {
    pub source: Arc<dyn ByteSource>,
    pub data_start: u64,
    pub data_end_inclusive: u64,
    pub mime: String,
}

impl MediaGatewayState {
    pub fn virtual_size(&self) -> u64 {
        self.data_end_inclusive - self.data_start + 1
    }
}

/// Build an axum router exposing a single STORED entry as a virtual file
/// at `path`, for local/in-process testing of the gateway without a
/// separate relay deployment.
pub fn router(path: &str, state: MediaGatewayState) -> Router {
    Router::new().route(path, get(serve)).with_state(Arc::new(state))
}

async fn serve(
    State(state): State<Arc<MediaGatewayState>>,
    headers: HeaderMap,
) -> Response {
    let virtual_size = state.virtual_size();
    let range_header = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok());
    let (relative, is_partial) = parse_virtual_range(range_header, virtual_size);
    let absolute = to_absolute(state.data_start, relative);

    let bytes = match state
        .source
        .read_range(*absolute.start(), *absolute.end())
        .await
    {
        Ok(b) => b,
        Err(e) => {
            return (StatusCode::BAD_GATEWAY, format!("{e}")).into_response();
        }
    };

    let (status, resp_headers) =
        response_headers(relative, virtual_size, &state.mime, is_partial);
    (status, resp_headers, Body::from(bytes)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_request_with_no_range_header() {
        let (range, partial) = parse_virtual_range(None, 10_400_000);
        assert!(!partial);
        assert_eq!(range.start, 0);
        assert_eq!(range.end_inclusive, 10_400_000 - 1);
    }

    #[test]
    fn media_gateway_seek_scenario() {
        let virtual_size = 10_400_000u64;
        let (range, partial) = parse_virtual_range(Some("bytes=500-999"), virtual_size);
        assert!(partial);
        assert_eq!(range.start, 500);
        assert_eq!(range.end_inclusive, 999);

        let absolute = to_absolute(100_000, range);
        assert_eq!(*absolute.start(), 100_500);
        assert_eq!(*absolute.end(), 100_999);

        let (status, headers) = response_headers(range, virtual_size, "video/mp4", partial);
        assert_eq!(status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            headers.get(header::CONTENT_RANGE).unwrap(),
            "bytes 500-999/10400000"
        );
        assert_eq!(headers.get(header::CONTENT_LENGTH).unwrap(), "500");
    }

    #[test]
    fn boundary_clamping_truncates_rather_than_rejects() {
        let (range, partial) = parse_virtual_range(Some("bytes=0-99999999"), 1000);
        assert!(partial);
        assert_eq!(range.end_inclusive, 999);
    }

    #[test]
    fn invalid_range_header_falls_back_to_full_file() {
        let (range, partial) = parse_virtual_range(Some("not-a-range"), 1000);
        assert!(!partial);
        assert_eq!(range.start, 0);
        assert_eq!(range.end_inclusive, 999);
    }

    #[test]
    fn suffix_range_is_supported() {
        let (range, partial) = parse_virtual_range(Some("bytes=-100"), 1000);
        assert!(partial);
        assert_eq!(range.start, 900);
        assert_eq!(range.end_inclusive, 999);
    }
}
