//! ProxyClient: capability probing plus the fallback relay used when an
//! origin refuses direct browser/CORS-less access.
//!
//! The relay server itself (the wire endpoint) lives in [`relay`]; this
//! module is the client-side half that decides, for a given URL, whether
//! reads should go direct or through that relay.

pub mod relay;

use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use crate::config::PolicyConfig;
use crate::error::ByteSourceError;
use crate::source::{ByteSource, Capability, RemoteByteSource, probe_capabilities};

/// Client-side capability negotiation and `ByteSource` construction for a
/// remote URL, with an optional proxy relay base URL as fallback.
pub struct ProxyClient {
    client: Client,
    proxy_base: Option<String>,
    policy: PolicyConfig,
}

impl ProxyClient {
    /// Build a client. `proxy_base` is the base URL of a deployed
    /// `zipreach-gateway` (or equivalent) `/proxy` endpoint.
    pub fn new(proxy_base: Option<String>, policy: PolicyConfig) -> Result<Self, ByteSourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ByteSourceError::Io(e.to_string()))?;
        Ok(Self {
            client,
            proxy_base,
            policy,
        })
    }

    /// Probe `url` and construct a [`ByteSource`] for it, preferring a
    /// direct connection and falling back to the proxy relay per the probe
    /// sequence. Returns the source along with whether it ended up routed
    /// through the proxy.
    pub async fn open(&self, url: &str) -> Result<(Arc<dyn ByteSource>, Capability, bool), ByteSourceError> {
        let outcome =
            probe_capabilities(url, self.proxy_base.as_deref(), &self.client, &self.policy)
                .await?;
        let capability = outcome.capability;
        let is_proxied = outcome.endpoint.via_proxy;
        let source = Arc::new(RemoteByteSource::from_probe(self.client.clone(), outcome));
        Ok((source, capability, is_proxied))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn construction_does_not_require_network() {
        let client = ProxyClient::new(None, PolicyConfig::default());
        assert!(client.is_ok());
    }
}
