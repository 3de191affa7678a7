//! HTTP health probing
//!
//! One shared client for every probe and eviction call. A probe is healthy
//! only on a 2xx answer; transport failures and non-2xx statuses both read
//! as "not ready" so that callers retry until their own deadline expires.

use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Per-probe deadline
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP prober shared across all lifecycle operations
#[derive(Debug, Clone)]
pub struct HealthProber {
    client: reqwest::Client,
}

impl HealthProber {
    /// Create a prober with its own connection pool
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// One health check against `url`. True only for 2xx.
    pub async fn probe(&self, url: &Url) -> bool {
        match self
            .client
            .get(url.clone())
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("health probe failed for {}: {}", url, e);
                false
            }
        }
    }

    /// Ask a service to release its GPU allocation without shutting down.
    ///
    /// Best-effort: failures are logged and swallowed, the hard stop
    /// proceeds either way.
    pub async fn request_eviction(&self, url: &Url) {
        let payload = serde_json::json!({ "keep_alive": "0s" });
        match self
            .client
            .post(url.clone())
            .json(&payload)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(_) => info!("graceful eviction requested at {}", url),
            Err(e) => debug!("graceful eviction skipped for {}: {}", url, e),
        }
    }
}

impl Default for HealthProber {
    fn default() -> Self {
        Self::new()
    }
}
