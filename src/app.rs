use std::path::PathBuf;
use std::time::{Duration, Instant};

use camino::Utf8Path;
use serde::Serialize;

use crate::catalog::CatalogLoader;
use crate::collector::{BulkRecordCollector, CancelToken, CollectedRecords};
use crate::config::ResolvedConfig;
use crate::datastore::{DatastoreClient, RetryPolicy};
use crate::domain::{
    CatalogEntry, FetchProgress, Record, ResourceFormat, ResourceId, ResourceMeta,
};
use crate::error::ExplorerError;
use crate::export::{self, RawDownloader};
use crate::metadata::ResourceMetadataResolver;
use crate::table::{self, ColumnStats};
use crate::transport::PortalTransport;

#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub resource_id: String,
    pub display_name: String,
    pub format: String,
    pub rows: usize,
    pub total: Option<usize>,
    pub pages: usize,
    pub columns: Vec<String>,
    pub dropped_internal_id: bool,
    pub estimated_bytes: u64,
    pub column_stats: Vec<ColumnStats>,
    pub preview: Vec<Record>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InfoResult {
    pub resource_id: String,
    pub display_name: String,
    pub format: String,
    pub tabular: bool,
    pub mime: String,
    pub download_url: String,
    pub total_rows: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogResult {
    pub count: usize,
    pub datasets: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    Csv,
    Raw,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadResult {
    pub resource_id: String,
    pub kind: ExportKind,
    pub path: String,
    pub mime: String,
    pub bytes: usize,
    pub rows: Option<usize>,
}

/// How a resource leaves the app: tabular formats go through the datastore
/// and become CSV, anything else is passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportPlan {
    Csv,
    Raw(ResourceFormat),
}

/// A completed bulk fetch together with the metadata it was resolved under.
#[derive(Debug, Clone)]
pub struct FetchedResource {
    pub id: ResourceId,
    pub meta: ResourceMeta,
    pub collected: CollectedRecords,
}

impl FetchedResource {
    pub fn summary(&self, preview_rows: usize) -> FetchResult {
        let records = &self.collected.records;
        FetchResult {
            resource_id: self.id.to_string(),
            display_name: self.meta.display_name.clone(),
            format: self.meta.format.clone(),
            rows: records.len(),
            total: self.collected.total,
            pages: self.collected.pages,
            columns: records.columns().to_vec(),
            dropped_internal_id: self.collected.dropped_internal_id,
            estimated_bytes: records.estimated_bytes(),
            column_stats: table::column_stats(records),
            preview: records.records().iter().take(preview_rows).cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressSinkKind {
    Fetch,
    Info,
    Catalog,
    Download,
}

impl ProgressSinkKind {
    pub fn label(self) -> &'static str {
        match self {
            ProgressSinkKind::Fetch => "Fetch",
            ProgressSinkKind::Info => "Info",
            ProgressSinkKind::Catalog => "Catalog",
            ProgressSinkKind::Download => "Download",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
    pub progress: Option<FetchProgress>,
}

impl ProgressEvent {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            elapsed: None,
            progress: None,
        }
    }

    /// `phase=<name>; <detail>`, the form dashboards key their phase display on.
    pub fn phase(name: &str, detail: impl AsRef<str>) -> Self {
        Self::message(format!("phase={name}; {}", detail.as_ref()))
    }

    pub fn progress(progress: FetchProgress) -> Self {
        let total = progress
            .total
            .map(|total| total.to_string())
            .unwrap_or_else(|| "?".to_string());
        Self {
            message: format!("progress fetched={} total={total}", progress.fetched),
            elapsed: None,
            progress: Some(progress),
        }
    }
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<T: PortalTransport + Clone> {
    collector: BulkRecordCollector<DatastoreClient<T>>,
    resolver: ResourceMetadataResolver<T>,
    catalog: CatalogLoader<T>,
    downloader: RawDownloader<T>,
    export_dir: Option<PathBuf>,
}

impl<T: PortalTransport + Clone> App<T> {
    pub fn new(transport: T, config: &ResolvedConfig) -> Self {
        let datastore =
            DatastoreClient::new(transport.clone(), config.endpoints.datastore_search.clone())
                .with_retry(RetryPolicy {
                    max_attempts: config.max_attempts,
                    base_wait: config.backoff_base,
                })
                .with_timeout(config.timeouts.page);
        let collector = BulkRecordCollector::new(datastore)
            .with_page_size(config.page_size)
            .with_page_pause(config.page_pause);
        let resolver = ResourceMetadataResolver::new(transport.clone(), &config.endpoints)
            .with_timeout(config.timeouts.metadata)
            .with_ttl(config.metadata_ttl);
        let catalog =
            CatalogLoader::new(transport.clone(), config.endpoints.package_search.clone())
                .with_timeout(config.timeouts.catalog)
                .with_page_pause(config.catalog_pause)
                .with_ttl(config.catalog_ttl);
        let downloader = RawDownloader::new(transport).with_timeout(config.timeouts.download);
        Self {
            collector,
            resolver,
            catalog,
            downloader,
            export_dir: config.export_dir.clone(),
        }
    }

    pub fn resolve_meta(&self, id: &ResourceId) -> ResourceMeta {
        self.resolver.resolve_meta(id)
    }

    pub fn fetch(
        &self,
        id: &ResourceId,
        max_rows: Option<usize>,
        sink: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<FetchedResource, ExplorerError> {
        sink.event(ProgressEvent::phase("Resolve", format!("resource {id}")));
        let meta = self.resolver.resolve_meta(id);
        let collected = self.collector.fetch_all(id, max_rows, sink, cancel)?;
        Ok(FetchedResource {
            id: id.clone(),
            meta,
            collected,
        })
    }

    pub fn info(&self, id: &ResourceId, sink: &dyn ProgressSink) -> InfoResult {
        sink.event(ProgressEvent::phase("Resolve", format!("metadata for {id}")));
        let started = Instant::now();
        let meta = self.resolver.resolve_meta(id);
        let total_rows = self.resolver.resolve_total_count(id);
        sink.event(ProgressEvent::message(format!(
            "portal.response latency_ms={}",
            started.elapsed().as_millis()
        )));
        let format = meta.resource_format();
        InfoResult {
            resource_id: id.to_string(),
            display_name: meta.display_name,
            format: meta.format,
            tabular: format.is_tabular(),
            mime: export::mime_for_format(&format).to_string(),
            download_url: meta.download_url,
            total_rows,
        }
    }

    pub fn catalog(&self, refresh: bool, sink: &dyn ProgressSink) -> CatalogResult {
        sink.event(ProgressEvent::phase("Fetch", "loading dataset catalog"));
        let started = Instant::now();
        let datasets = if refresh {
            self.catalog.refresh()
        } else {
            self.catalog.load_catalog()
        };
        sink.event(ProgressEvent {
            message: format!("phase=Verify; {} datasets", datasets.len()),
            elapsed: Some(started.elapsed()),
            progress: None,
        });
        CatalogResult {
            count: datasets.len(),
            datasets,
        }
    }

    pub fn export_plan(meta: &ResourceMeta) -> ExportPlan {
        match meta.resource_format() {
            // fallback metadata carries no format
            ResourceFormat::Unknown => ExportPlan::Csv,
            format if format.is_tabular() => ExportPlan::Csv,
            format => ExportPlan::Raw(format),
        }
    }

    /// Resolves metadata, then either bulk-fetches and writes CSV or downloads
    /// the original file, into `dir` (or the configured export directory).
    pub fn export(
        &self,
        id: &ResourceId,
        max_rows: Option<usize>,
        dir: Option<&Utf8Path>,
        sink: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<DownloadResult, ExplorerError> {
        let meta = self.resolver.resolve_meta(id);
        match Self::export_plan(&meta) {
            ExportPlan::Csv => {
                let fetched = self.fetch(id, max_rows, sink, cancel)?;
                self.save_csv(&fetched, "", dir, sink)
            }
            ExportPlan::Raw(_) => self.save_raw(id, &meta, dir, sink),
        }
    }

    /// Writes the rows of `fetched` that match `filter` as CSV.
    pub fn save_csv(
        &self,
        fetched: &FetchedResource,
        filter: &str,
        dir: Option<&Utf8Path>,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadResult, ExplorerError> {
        let records = &fetched.collected.records;
        let rows = table::filter_rows(records, filter);
        let bytes = export::csv_rows(records.columns(), rows.iter().copied())?;
        let name = export::export_filename(&fetched.meta.display_name, &fetched.id, "csv");
        let path = self.target_dir(dir)?.join(name);
        sink.event(ProgressEvent::phase("Store", format!("writing {path}")));
        export::write_atomic(&path, &bytes)?;
        tracing::info!(path = %path, rows = rows.len(), "csv export written");
        Ok(DownloadResult {
            resource_id: fetched.id.to_string(),
            kind: ExportKind::Csv,
            path: path.to_string(),
            mime: export::mime_for_format(&ResourceFormat::Csv).to_string(),
            bytes: bytes.len(),
            rows: Some(rows.len()),
        })
    }

    pub fn save_raw(
        &self,
        id: &ResourceId,
        meta: &ResourceMeta,
        dir: Option<&Utf8Path>,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadResult, ExplorerError> {
        let format = meta.resource_format();
        sink.event(ProgressEvent::phase(
            "Fetch",
            format!("downloading original {format} file"),
        ));
        let started = Instant::now();
        let bytes = self.downloader.download(meta)?;
        sink.event(ProgressEvent::message(format!(
            "download.response latency_ms={}",
            started.elapsed().as_millis()
        )));
        let name = export::export_filename(&meta.display_name, id, &format.extension());
        let path = self.target_dir(dir)?.join(name);
        sink.event(ProgressEvent::phase("Store", format!("writing {path}")));
        export::write_atomic(&path, &bytes)?;
        Ok(DownloadResult {
            resource_id: id.to_string(),
            kind: ExportKind::Raw,
            path: path.to_string(),
            mime: export::mime_for_format(&format).to_string(),
            bytes: bytes.len(),
            rows: None,
        })
    }

    fn target_dir(&self, dir: Option<&Utf8Path>) -> Result<camino::Utf8PathBuf, ExplorerError> {
        match dir {
            Some(dir) => Ok(dir.to_path_buf()),
            None => export::export_dir(self.export_dir.as_deref()),
        }
    }
}
