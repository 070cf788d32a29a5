use std::thread;
use std::time::Duration;

use serde::Deserialize;

use crate::domain::{Record, ResourceId};
use crate::error::ExplorerError;
use crate::transport::{ApiEnvelope, PortalTransport};

/// Attempt budget and exponential backoff shared by 429s and transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_wait: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// `base_wait * 2^attempt`, attempt counted from zero.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_wait.saturating_mul(factor)
    }
}

/// One page of datastore rows.
#[derive(Debug, Clone, PartialEq)]
pub struct PageResult {
    pub total: Option<usize>,
    pub records: Vec<Record>,
    /// Declared field order, when the datastore reports it.
    pub fields: Vec<String>,
    /// Requests spent on this page, including the successful one.
    pub attempts: u32,
}

pub trait PageSource: Send + Sync {
    fn fetch_page(
        &self,
        id: &ResourceId,
        offset: usize,
        limit: usize,
    ) -> Result<PageResult, ExplorerError>;
}

impl<S: PageSource + ?Sized> PageSource for &S {
    fn fetch_page(
        &self,
        id: &ResourceId,
        offset: usize,
        limit: usize,
    ) -> Result<PageResult, ExplorerError> {
        (**self).fetch_page(id, offset, limit)
    }
}

#[derive(Debug, Deserialize)]
struct DatastoreResult {
    #[serde(default)]
    total: Option<usize>,
    #[serde(default)]
    records: Vec<Record>,
    #[serde(default)]
    fields: Vec<DatastoreField>,
}

#[derive(Debug, Deserialize)]
struct DatastoreField {
    id: String,
}

#[derive(Clone)]
pub struct DatastoreClient<T: PortalTransport> {
    transport: T,
    endpoint: String,
    retry: RetryPolicy,
    timeout: Duration,
}

impl<T: PortalTransport> DatastoreClient<T> {
    pub fn new(transport: T, endpoint: impl Into<String>) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn into_page(
        id: &ResourceId,
        envelope: ApiEnvelope<DatastoreResult>,
        attempts: u32,
    ) -> Result<PageResult, ExplorerError> {
        if !envelope.success {
            return Err(ExplorerError::DataRetrieval(id.to_string()));
        }
        let result = envelope
            .result
            .ok_or_else(|| ExplorerError::DataRetrieval(id.to_string()))?;
        Ok(PageResult {
            total: result.total,
            records: result.records,
            fields: result.fields.into_iter().map(|field| field.id).collect(),
            attempts,
        })
    }
}

impl<T: PortalTransport> PageSource for DatastoreClient<T> {
    fn fetch_page(
        &self,
        id: &ResourceId,
        offset: usize,
        limit: usize,
    ) -> Result<PageResult, ExplorerError> {
        let query = [
            ("resource_id", id.to_string()),
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
        ];
        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_failure: Option<ExplorerError> = None;

        for attempt in 0..max_attempts {
            let failure = match self.transport.get(&self.endpoint, &query, self.timeout) {
                Ok(reply) if !reply.is_success() => {
                    if reply.is_rate_limited() {
                        tracing::debug!(resource = %id, offset, "rate limited");
                    }
                    ExplorerError::Status {
                        status: reply.status,
                    }
                }
                Ok(reply) => match reply.json::<ApiEnvelope<DatastoreResult>>() {
                    Ok(envelope) => return Self::into_page(id, envelope, attempt + 1),
                    Err(err) => err,
                },
                Err(err) => err,
            };

            if attempt + 1 < max_attempts {
                let delay = self.retry.delay_for(attempt);
                tracing::warn!(
                    resource = %id,
                    offset,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    reason = %failure,
                    "datastore page failed, backing off"
                );
                thread::sleep(delay);
            }
            last_failure = Some(failure);
        }

        Err(ExplorerError::Network {
            attempts: max_attempts,
            message: last_failure
                .map(|failure| failure.to_string())
                .unwrap_or_default(),
        })
    }
}
