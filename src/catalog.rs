use std::thread;
use std::time::Duration;

use serde::Deserialize;

use crate::cache::TtlCache;
use crate::config::CATALOG_PAGE_SIZE;
use crate::domain::{CatalogEntry, CatalogResource};
use crate::error::ExplorerError;
use crate::transport::{ApiEnvelope, PortalTransport};

const CATALOG_SORT: &str = "metadata_modified desc";

#[derive(Debug, Deserialize)]
struct PackageSearch {
    #[serde(default)]
    count: usize,
    #[serde(default)]
    results: Vec<Package>,
}

#[derive(Debug, Deserialize)]
struct Package {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    organization: Option<Organization>,
    #[serde(default)]
    num_resources: Option<usize>,
    #[serde(default)]
    metadata_modified: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    resources: Vec<PackageResource>,
}

#[derive(Debug, Deserialize)]
struct Organization {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PackageResource {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

impl From<Package> for CatalogEntry {
    fn from(package: Package) -> Self {
        let resources: Vec<CatalogResource> = package
            .resources
            .into_iter()
            .map(|res| CatalogResource {
                name: res.name.unwrap_or_default(),
                format: res.format.unwrap_or_default(),
                id: res.id,
                url: res.url.unwrap_or_default(),
            })
            .collect();
        Self {
            title: package
                .title
                .or(package.name)
                .unwrap_or_default(),
            organization: package
                .organization
                .and_then(|org| org.title.or(org.name))
                .unwrap_or_default(),
            resource_count: package.num_resources.unwrap_or(resources.len()),
            last_modified: package.metadata_modified.unwrap_or_default(),
            notes: package.notes.unwrap_or_default(),
            resources,
        }
    }
}

/// Pages through `package_search`, newest first. Only complete loads are cached.
pub struct CatalogLoader<T: PortalTransport> {
    transport: T,
    endpoint: String,
    timeout: Duration,
    page_pause: Duration,
    ttl: Duration,
    cache: TtlCache<(), Vec<CatalogEntry>>,
}

impl<T: PortalTransport> CatalogLoader<T> {
    pub fn new(transport: T, endpoint: impl Into<String>) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(30),
            page_pause: Duration::from_millis(200),
            ttl: Duration::from_secs(60 * 60),
            cache: TtlCache::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_page_pause(mut self, page_pause: Duration) -> Self {
        self.page_pause = page_pause;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn load_catalog(&self) -> Vec<CatalogEntry> {
        self.cache
            .get_or_try_compute((), self.ttl, || self.fetch_catalog())
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, "catalog unavailable");
                Vec::new()
            })
    }

    pub fn refresh(&self) -> Vec<CatalogEntry> {
        self.cache.clear();
        self.load_catalog()
    }

    fn fetch_catalog(&self) -> Result<Vec<CatalogEntry>, ExplorerError> {
        let mut entries: Vec<CatalogEntry> = Vec::new();
        let mut start = 0usize;
        loop {
            let query = [
                ("rows", CATALOG_PAGE_SIZE.to_string()),
                ("start", start.to_string()),
                ("sort", CATALOG_SORT.to_string()),
            ];
            let reply = self
                .transport
                .get(&self.endpoint, &query, self.timeout)
                .map_err(|err| ExplorerError::MetadataResolution(err.to_string()))?;
            if !reply.is_success() {
                return Err(ExplorerError::MetadataResolution(format!(
                    "package_search HTTP {}",
                    reply.status
                )));
            }
            let envelope: ApiEnvelope<PackageSearch> = reply
                .json()
                .map_err(|err| ExplorerError::MetadataResolution(err.to_string()))?;
            let page = match (envelope.success, envelope.result) {
                (true, Some(page)) => page,
                _ => {
                    return Err(ExplorerError::MetadataResolution(
                        "package_search reported failure".to_string(),
                    ));
                }
            };

            if page.results.is_empty() {
                break;
            }
            start += page.results.len();
            entries.extend(page.results.into_iter().map(CatalogEntry::from));
            tracing::debug!(loaded = entries.len(), count = page.count, "catalog page");
            if entries.len() >= page.count {
                break;
            }
            thread::sleep(self.page_pause);
        }
        tracing::info!(datasets = entries.len(), "catalog loaded");
        Ok(entries)
    }
}

/// Case-insensitive match on title, organization, notes and resource names.
pub fn filter_catalog<'a>(entries: &'a [CatalogEntry], needle: &str) -> Vec<&'a CatalogEntry> {
    let needle = needle.trim().to_lowercase();
    if needle.is_empty() {
        return entries.iter().collect();
    }
    entries
        .iter()
        .filter(|entry| {
            entry.title.to_lowercase().contains(&needle)
                || entry.organization.to_lowercase().contains(&needle)
                || entry.notes.to_lowercase().contains(&needle)
                || entry
                    .resources
                    .iter()
                    .any(|res| res.name.to_lowercase().contains(&needle))
        })
        .collect()
}
