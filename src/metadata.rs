use std::time::Duration;

use serde::Deserialize;

use crate::cache::TtlCache;
use crate::config::Endpoints;
use crate::domain::{ResourceId, ResourceMeta};
use crate::error::ExplorerError;
use crate::transport::{ApiEnvelope, PortalTransport};

#[derive(Debug, Deserialize)]
struct ResourceShow {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CountProbe {
    #[serde(default)]
    total: Option<usize>,
}

/// Resolves display metadata and row counts. Never fails: lookups degrade to
/// a fallback and are retried on the next call.
pub struct ResourceMetadataResolver<T: PortalTransport> {
    transport: T,
    resource_show: String,
    datastore_search: String,
    timeout: Duration,
    ttl: Duration,
    meta: TtlCache<ResourceId, ResourceMeta>,
    counts: TtlCache<ResourceId, usize>,
}

impl<T: PortalTransport> ResourceMetadataResolver<T> {
    pub fn new(transport: T, endpoints: &Endpoints) -> Self {
        Self {
            transport,
            resource_show: endpoints.resource_show.clone(),
            datastore_search: endpoints.datastore_search.clone(),
            timeout: Duration::from_secs(15),
            ttl: Duration::from_secs(30 * 60),
            meta: TtlCache::new(),
            counts: TtlCache::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn resolve_meta(&self, id: &ResourceId) -> ResourceMeta {
        self.meta
            .get_or_try_compute(id.clone(), self.ttl, || self.lookup_meta(id))
            .unwrap_or_else(|err| {
                tracing::warn!(resource = %id, error = %err, "using fallback metadata");
                ResourceMeta::fallback(id)
            })
    }

    pub fn resolve_total_count(&self, id: &ResourceId) -> Option<usize> {
        self.counts
            .get_or_try_compute(id.clone(), self.ttl, || self.probe_count(id))
            .map_err(|err| {
                tracing::warn!(resource = %id, error = %err, "row count unavailable");
            })
            .ok()
    }

    /// Drops cached entries for `id` so the next call goes to the portal.
    pub fn forget(&self, id: &ResourceId) {
        self.meta.invalidate(id);
        self.counts.invalidate(id);
    }

    fn lookup_meta(&self, id: &ResourceId) -> Result<ResourceMeta, ExplorerError> {
        let reply = self
            .transport
            .get(&self.resource_show, &[("id", id.to_string())], self.timeout)
            .map_err(|err| ExplorerError::MetadataResolution(err.to_string()))?;
        if !reply.is_success() {
            return Err(ExplorerError::MetadataResolution(format!(
                "HTTP {}",
                reply.status
            )));
        }
        let envelope: ApiEnvelope<ResourceShow> = reply
            .json()
            .map_err(|err| ExplorerError::MetadataResolution(err.to_string()))?;
        let result = match (envelope.success, envelope.result) {
            (true, Some(result)) => result,
            _ => {
                return Err(ExplorerError::MetadataResolution(
                    "resource_show reported failure".to_string(),
                ));
            }
        };

        let display_name = result
            .name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| id.to_string());
        Ok(ResourceMeta {
            format: result.format.unwrap_or_default().trim().to_string(),
            download_url: result.url.unwrap_or_default(),
            display_name,
        })
    }

    fn probe_count(&self, id: &ResourceId) -> Result<usize, ExplorerError> {
        let query = [("resource_id", id.to_string()), ("limit", "1".to_string())];
        let reply = self
            .transport
            .get(&self.datastore_search, &query, self.timeout)
            .map_err(|err| ExplorerError::MetadataResolution(err.to_string()))?;
        if !reply.is_success() {
            return Err(ExplorerError::MetadataResolution(format!(
                "HTTP {}",
                reply.status
            )));
        }
        let envelope: ApiEnvelope<CountProbe> = reply
            .json()
            .map_err(|err| ExplorerError::MetadataResolution(err.to_string()))?;
        match (envelope.success, envelope.result.and_then(|r| r.total)) {
            (true, Some(total)) => Ok(total),
            _ => Err(ExplorerError::MetadataResolution(
                "datastore_search reported no total".to_string(),
            )),
        }
    }
}
