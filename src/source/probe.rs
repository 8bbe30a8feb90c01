//! Capability probing.
//!
//! Classifies a URL's range-request support without ever downloading the
//! full resource: a direct HEAD, a proxied HEAD fallback, and finally a
//! 1-byte confirming ranged GET. Every body the probe doesn't intend to
//! consume is dropped unread rather than drained.

use std::time::Duration;

use reqwest::Client;

use super::{Capability, RangeSupport};
use crate::config::PolicyConfig;
use crate::error::ByteSourceError;

/// Where subsequent reads should be issued: straight to the origin, or
/// relayed through a proxy base URL.
#[derive(Debug, Clone)]
pub struct EffectiveEndpoint {
    /// The origin URL (always the original, unmodified URL).
    pub origin_url: String,
    /// The proxy base URL to relay through, if `via_proxy` is set.
    pub proxy_base: Option<String>,
    /// Whether reads should go through the proxy.
    pub via_proxy: bool,
}

/// Outcome of the full probe sequence.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub capability: Capability,
    pub endpoint: EffectiveEndpoint,
}

struct HeadInfo {
    content_length: Option<u64>,
    accept_ranges_bytes: bool,
}

async fn try_head(client: &Client, url: &str, timeout: Duration) -> Option<HeadInfo> {
    let resp = tokio::time::timeout(timeout, client.head(url).send())
        .await
        .ok()?
        .ok()?;
    if !resp.status().is_success() {
        return None;
    }
    let content_length = resp
        .headers()
        .get(reqwest::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok());
    let accept_ranges_bytes = resp
        .headers()
        .get(reqwest::header::ACCEPT_RANGES)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("bytes"));
    Some(HeadInfo {
        content_length,
        accept_ranges_bytes,
    })
}

/// Issue a 1-byte ranged GET and, on a 206, return the total length from
/// `Content-Range`. The body is dropped without being read in every case.
async fn try_confirm_range(client: &Client, url: &str, timeout: Duration) -> Option<u64> {
    let resp = tokio::time::timeout(
        timeout,
        client.get(url).header("Range", "bytes=0-0").send(),
    )
    .await
    .ok()?
    .ok()?;

    if resp.status() != reqwest::StatusCode::PARTIAL_CONTENT {
        // Body dropped unread: we only wanted to know the status.
        return None;
    }

    resp.headers()
        .get(reqwest::header::CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.rsplit_once('/'))
        .map(|(_, total)| total)
        .and_then(|s| s.parse().ok())
}

fn proxy_head_url(proxy_base: &str, origin_url: &str) -> String {
    format!(
        "{proxy_base}?url={}",
        percent_encoding::utf8_percent_encode(origin_url, percent_encoding::NON_ALPHANUMERIC)
    )
}

/// Run the four-step probe sequence against `origin_url`, optionally
/// falling back to `proxy_base` when the origin refuses direct access.
pub async fn probe_capabilities(
    origin_url: &str,
    proxy_base: Option<&str>,
    client: &Client,
    policy: &PolicyConfig,
) -> Result<ProbeOutcome, ByteSourceError> {
    // Step 1: direct HEAD.
    let direct_head = try_head(client, origin_url, policy.head_probe_timeout).await;
    if let Some(info) = &direct_head
        && info.accept_ranges_bytes
        && info.content_length.is_some()
    {
        return Ok(ProbeOutcome {
            capability: Capability {
                total_size: info.content_length,
                supports_ranges: RangeSupport::Yes,
            },
            endpoint: EffectiveEndpoint {
                origin_url: origin_url.to_string(),
                proxy_base: proxy_base.map(str::to_string),
                via_proxy: false,
            },
        });
    }

    // Step 2: proxied HEAD, if a proxy is configured.
    let mut best_known_length = direct_head.as_ref().and_then(|i| i.content_length);
    if let Some(base) = proxy_base {
        let proxied_url = proxy_head_url(base, origin_url);
        if let Some(info) = try_head(client, &proxied_url, policy.head_probe_timeout).await {
            best_known_length = best_known_length.or(info.content_length);
            if info.accept_ranges_bytes && info.content_length.is_some() {
                return Ok(ProbeOutcome {
                    capability: Capability {
                        total_size: info.content_length,
                        supports_ranges: RangeSupport::Yes,
                    },
                    endpoint: EffectiveEndpoint {
                        origin_url: origin_url.to_string(),
                        proxy_base: proxy_base.map(str::to_string),
                        via_proxy: true,
                    },
                });
            }
        }
    }

    // Step 3: confirming 1-byte ranged GET. Prefer the proxy when direct
    // HEAD didn't succeed and a proxy is available.
    let use_proxy_for_confirm = proxy_base.is_some() && direct_head.is_none();
    let confirm_url = if use_proxy_for_confirm {
        proxy_head_url(proxy_base.unwrap(), origin_url)
    } else {
        origin_url.to_string()
    };
    if let Some(total) = try_confirm_range(client, &confirm_url, policy.range_probe_timeout).await
    {
        return Ok(ProbeOutcome {
            capability: Capability {
                total_size: Some(total),
                supports_ranges: RangeSupport::Yes,
            },
            endpoint: EffectiveEndpoint {
                origin_url: origin_url.to_string(),
                proxy_base: proxy_base.map(str::to_string),
                via_proxy: use_proxy_for_confirm,
            },
        });
    }

    // If the direct path never even responded and a proxy exists, try the
    // confirm GET once more through the proxy before giving up.
    if !use_proxy_for_confirm && proxy_base.is_some() {
        let proxied_confirm = proxy_head_url(proxy_base.unwrap(), origin_url);
        if let Some(total) =
            try_confirm_range(client, &proxied_confirm, policy.range_probe_timeout).await
        {
            return Ok(ProbeOutcome {
                capability: Capability {
                    total_size: Some(total),
                    supports_ranges: RangeSupport::Yes,
                },
                endpoint: EffectiveEndpoint {
                    origin_url: origin_url.to_string(),
                    proxy_base: proxy_base.map(str::to_string),
                    via_proxy: true,
                },
            });
        }
    }

    // Step 4: no step yielded a 206.
    Ok(ProbeOutcome {
        capability: Capability {
            total_size: best_known_length,
            supports_ranges: RangeSupport::No,
        },
        endpoint: EffectiveEndpoint {
            origin_url: origin_url.to_string(),
            proxy_base: proxy_base.map(str::to_string),
            via_proxy: direct_head.is_none() && proxy_base.is_some(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_head_url_encodes_origin() {
        let url = proxy_head_url("https://relay.example/proxy", "https://a.example/x y.zip");
        assert!(url.starts_with("https://relay.example/proxy?url="));
        assert!(url.contains("x%20y.zip") || url.contains("x+y.zip"));
    }
}
