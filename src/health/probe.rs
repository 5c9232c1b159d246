//! Active health probes.
//!
//! An unhealthy backend is never selected, so it can only earn the
//! consecutive successes it needs to recover through an out-of-band probe.

use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::BoxFuture;

/// Checks whether a backend is reachable.
pub trait HealthProbe: Send + Sync {
    /// Whether this probe knows how to reach `backend_id`.
    fn has_target(&self, backend_id: &str) -> bool;

    /// Probe `backend_id`. The caller bounds the call with a timeout.
    fn probe<'a>(&'a self, backend_id: &'a str) -> BoxFuture<'a, bool>;
}

/// Probes backends with `GET <health_url>`; any 2xx counts as healthy.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    targets: DashMap<String, String>,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("agent-balancer-health-check")
            .build()?;
        Ok(Self {
            client,
            targets: DashMap::new(),
        })
    }

    pub fn add_target(&self, backend_id: impl Into<String>, url: impl Into<String>) {
        self.targets.insert(backend_id.into(), url.into());
    }

    pub fn remove_target(&self, backend_id: &str) {
        self.targets.remove(backend_id);
    }
}

impl HealthProbe for HttpProbe {
    fn has_target(&self, backend_id: &str) -> bool {
        self.targets.contains_key(backend_id)
    }

    fn probe<'a>(&'a self, backend_id: &'a str) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            let Some(url) = self.targets.get(backend_id).map(|u| u.value().clone()) else {
                return false;
            };
            match self.client.get(&url).send().await {
                Ok(response) => {
                    let success = response.status().is_success();
                    if !success {
                        tracing::warn!(backend = %backend_id, status = %response.status(), "Health probe failed: non-success status");
                    }
                    success
                }
                Err(e) => {
                    tracing::warn!(backend = %backend_id, error = %e, "Health probe failed: connection error");
                    false
                }
            }
        })
    }
}
