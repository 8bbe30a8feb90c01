//! HTTP(S) `ByteSource`, optionally relayed through a proxy.
//!
//! Retry with exponential backoff and a transfer counter drive every
//! read; reads distinguish "the server ignored our Range header" (200
//! on a ranged request) from a genuine transport error, and can be
//! routed through a proxy's `start`/`end` query parameters instead of a
//! `Range` header.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;

use super::probe::ProbeOutcome;
use super::{ByteSource, Capability, RangeSupport};
use crate::error::ByteSourceError;

const NO_LENGTH: u64 = u64::MAX;

/// HTTP Range reader for a remote resource, direct or proxied.
pub struct RemoteByteSource {
    client: Client,
    origin_url: String,
    proxy_base: Option<String>,
    via_proxy: bool,
    /// `NO_LENGTH` sentinel when unknown; updated from an authoritative
    /// `Content-Range` total if it disagrees with the probed value — a
    /// 206's `Content-Range` is trusted over a HEAD's `Content-Length`.
    size: AtomicU64,
    supports_ranges: RangeSupport,
    transferred_bytes: AtomicU64,
    max_retry: u32,
}

impl RemoteByteSource {
    /// Build a reader from the outcome of [`super::probe_capabilities`].
    pub fn from_probe(client: Client, outcome: ProbeOutcome) -> Self {
        Self {
            client,
            origin_url: outcome.endpoint.origin_url,
            proxy_base: outcome.endpoint.proxy_base,
            via_proxy: outcome.endpoint.via_proxy,
            size: AtomicU64::new(outcome.capability.total_size.unwrap_or(NO_LENGTH)),
            supports_ranges: outcome.capability.supports_ranges,
            transferred_bytes: AtomicU64::new(0),
            max_retry: 10,
        }
    }

    /// Cumulative bytes transferred from the network, for bandwidth
    /// reporting, surfaced in the CLI's transfer summary.
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }

    fn request_url(&self, start: u64, end_inclusive: u64) -> (String, bool) {
        match (&self.proxy_base, self.via_proxy) {
            (Some(base), true) => (
                format!(
                    "{base}?url={}&start={start}&end={end_inclusive}",
                    percent_encoding::utf8_percent_encode(
                        &self.origin_url,
                        percent_encoding::NON_ALPHANUMERIC
                    )
                ),
                true,
            ),
            _ => (self.origin_url.clone(), false),
        }
    }

    fn update_length_from_content_range(&self, header: &str) {
        if let Some((_, total)) = header.rsplit_once('/')
            && let Ok(total) = total.parse::<u64>()
        {
            self.size.store(total, Ordering::Relaxed);
        }
    }

}

#[async_trait]
impl ByteSource for RemoteByteSource {
    fn length(&self) -> Option<u64> {
        let v = self.size.load(Ordering::Relaxed);
        (v != NO_LENGTH).then_some(v)
    }

    fn capability(&self) -> Capability {
        Capability {
            total_size: self.length(),
            supports_ranges: self.supports_ranges,
        }
    }

    async fn read_range(&self, start: u64, end_inclusive: u64) -> Result<Bytes, ByteSourceError> {
        if let Some(len) = self.length()
            && end_inclusive >= len
        {
            return Err(ByteSourceError::OutOfBounds {
                start,
                end: end_inclusive,
                length: len,
            });
        }

        let mut out = Vec::with_capacity((end_inclusive - start + 1) as usize);
        let mut received = 0u64;
        let expected = end_inclusive - start + 1;
        let mut retry_count = 0u32;

        while received < expected {
            let current_start = start + received;
            let (url, via_query_params) = self.request_url(current_start, end_inclusive);

            let mut req = self.client.get(&url);
            if !via_query_params {
                req = req.header(
                    "Range",
                    format!("bytes={current_start}-{end_inclusive}"),
                );
            }

            match req.send().await {
                Ok(resp) if resp.status() == reqwest::StatusCode::PARTIAL_CONTENT => {
                    if let Some(cr) = resp
                        .headers()
                        .get(reqwest::header::CONTENT_RANGE)
                        .and_then(|v| v.to_str().ok())
                    {
                        self.update_length_from_content_range(cr);
                    }
                    let bytes = resp
                        .bytes()
                        .await
                        .map_err(|e| ByteSourceError::Io(e.to_string()))?;
                    out.extend_from_slice(&bytes);
                    received += bytes.len() as u64;
                    self.transferred_bytes
                        .fetch_add(bytes.len() as u64, Ordering::Relaxed);
                }
                Ok(resp) if resp.status() == reqwest::StatusCode::OK => {
                    // Server ignored our Range header: don't drain the
                    // full body, just report unsupported.
                    drop(resp);
                    return Err(ByteSourceError::RangeUnsupported);
                }
                Ok(resp) => {
                    return Err(ByteSourceError::Io(format!(
                        "unexpected status: {}",
                        resp.status()
                    )));
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    retry_count += 1;
                    if retry_count >= self.max_retry {
                        return Err(ByteSourceError::Io(format!(
                            "max retries exceeded: {e}"
                        )));
                    }
                    tokio::time::sleep(Duration::from_millis(500 * retry_count as u64)).await;
                }
                Err(e) => return Err(ByteSourceError::Io(e.to_string())),
            }
        }

        Ok(Bytes::from(out))
    }

    /// Plain GET with no `Range` header at all. For origins that answer
    /// every ranged request with a full 200 (`supports_ranges ==
    /// RangeSupport::No`), this is the only way to get bytes out of them.
    async fn read_full(&self) -> Result<Bytes, ByteSourceError> {
        let url = match (&self.proxy_base, self.via_proxy) {
            (Some(base), true) => format!(
                "{base}?url={}",
                percent_encoding::utf8_percent_encode(
                    &self.origin_url,
                    percent_encoding::NON_ALPHANUMERIC
                )
            ),
            _ => self.origin_url.clone(),
        };
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ByteSourceError::Io(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ByteSourceError::Io(format!(
                "unexpected status: {}",
                resp.status()
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ByteSourceError::Io(e.to_string()))?;
        self.transferred_bytes
            .fetch_add(bytes.len() as u64, Ordering::Relaxed);
        self.size.store(bytes.len() as u64, Ordering::Relaxed);
        Ok(bytes)
    }
}

/// Construct a direct (non-proxied) `RemoteByteSource` from a known size,
/// skipping the probe sequence. Used when a caller already knows the
/// resource supports ranges (e.g. chained from a prior probe).
pub fn from_known(client: Client, url: String, size: u64) -> Arc<RemoteByteSource> {
    Arc::new(RemoteByteSource {
        client,
        origin_url: url,
        proxy_base: None,
        via_proxy: false,
        size: AtomicU64::new(size),
        supports_ranges: RangeSupport::Yes,
        transferred_bytes: AtomicU64::new(0),
        max_retry: 10,
    })
}
