use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::app::{ProgressEvent, ProgressSink};
use crate::config::DEFAULT_PAGE_SIZE;
use crate::datastore::PageSource;
use crate::domain::{FetchProgress, Record, RecordSet, ResourceId};
use crate::error::ExplorerError;

const PAUSE_SLICE: Duration = Duration::from_millis(50);

/// Advisory cancellation flag, observed between pages and during pauses.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), ExplorerError> {
        if self.is_cancelled() {
            return Err(ExplorerError::Cancelled);
        }
        Ok(())
    }
}

/// Sleeps for `duration` in short slices so a cancel is noticed promptly.
pub fn pause(duration: Duration, cancel: &CancelToken) -> Result<(), ExplorerError> {
    let deadline = Instant::now() + duration;
    loop {
        cancel.check()?;
        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }
        thread::sleep((deadline - now).min(PAUSE_SLICE));
    }
}

/// A complete (or capped) record set and how it was obtained.
#[derive(Debug, Clone)]
pub struct CollectedRecords {
    pub records: RecordSet,
    pub total: Option<usize>,
    pub pages: usize,
    pub dropped_internal_id: bool,
}

#[derive(Clone)]
pub struct BulkRecordCollector<S: PageSource> {
    source: S,
    page_size: usize,
    page_pause: Duration,
}

impl<S: PageSource> BulkRecordCollector<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            page_size: DEFAULT_PAGE_SIZE,
            page_pause: Duration::from_millis(300),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_page_pause(mut self, page_pause: Duration) -> Self {
        self.page_pause = page_pause;
        self
    }

    /// Pages through the datastore until an empty page, `total` or `max_rows`.
    ///
    /// Any page failure aborts the whole fetch; records collected before the
    /// failure are discarded. `max_rows` of `None` or `Some(0)` means no cap.
    pub fn fetch_all(
        &self,
        id: &ResourceId,
        max_rows: Option<usize>,
        sink: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<CollectedRecords, ExplorerError> {
        let max_rows = max_rows.filter(|max| *max > 0);
        let started = Instant::now();
        let mut offset = 0usize;
        let mut accumulated: Vec<Record> = Vec::new();
        let mut total: Option<usize> = None;
        let mut fields: Vec<String> = Vec::new();
        let mut pages = 0usize;

        sink.event(ProgressEvent::phase(
            "Fetch",
            format!("requesting {id} (page size {})", self.page_size),
        ));
        sink.event(ProgressEvent::progress(FetchProgress {
            fetched: 0,
            total: None,
        }));

        loop {
            cancel.check()?;
            sink.event(ProgressEvent::message(format!(
                "datastore.request offset={offset}"
            )));
            let page_started = Instant::now();
            let page = self
                .source
                .fetch_page(id, offset, self.page_size)
                .inspect_err(|err| {
                    tracing::warn!(resource = %id, offset, error = %err, "bulk fetch aborted");
                })?;
            cancel.check()?;
            pages += 1;
            sink.event(ProgressEvent::message(format!(
                "datastore.response latency_ms={}",
                page_started.elapsed().as_millis()
            )));
            if page.attempts > 1 {
                sink.event(ProgressEvent::message(format!(
                    "retry: page at offset {offset} needed {} attempts",
                    page.attempts
                )));
            }

            if pages == 1 {
                total = page.total;
                fields = page.fields;
            }

            if page.records.is_empty() {
                tracing::debug!(resource = %id, offset, "empty page, end of data");
                break;
            }

            let received = page.records.len();
            accumulated.extend(page.records);
            offset += received;

            let mut fetched = accumulated.len();
            if let Some(max) = max_rows {
                fetched = fetched.min(max);
            }
            if let Some(total) = total {
                fetched = fetched.min(total);
            }
            sink.event(ProgressEvent::progress(FetchProgress { fetched, total }));

            if let Some(max) = max_rows {
                if accumulated.len() >= max {
                    accumulated.truncate(max);
                    tracing::debug!(resource = %id, max, "row cap reached");
                    break;
                }
            }
            if let Some(total) = total {
                if offset >= total {
                    break;
                }
            }

            pause(self.page_pause, cancel)?;
        }

        if accumulated.is_empty() {
            return Err(ExplorerError::EmptyResult(id.to_string()));
        }

        let mut records = RecordSet::new(accumulated, &fields);
        let dropped_internal_id = records.drop_internal_id();
        tracing::info!(
            resource = %id,
            rows = records.len(),
            columns = records.columns().len(),
            pages,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "bulk fetch complete"
        );
        sink.event(ProgressEvent {
            message: format!(
                "phase=Verify; {} rows, {} columns",
                records.len(),
                records.columns().len()
            ),
            elapsed: Some(started.elapsed()),
            progress: None,
        });

        Ok(CollectedRecords {
            records,
            total,
            pages,
            dropped_internal_id,
        })
    }
}
