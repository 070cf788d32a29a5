use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ExplorerError {
    #[error("invalid resource id: {0:?}")]
    #[diagnostic(help("the resource id appears in the dataset URL: .../resource/<resource-id>"))]
    InvalidResourceId(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("portal request failed: {0}")]
    Transport(String),

    #[error("portal returned status {status}")]
    Status { status: u16 },

    #[error("network failure after {attempts} attempts: {message}")]
    Network { attempts: u32, message: String },

    #[error("failed to retrieve data for resource {0}")]
    DataRetrieval(String),

    #[error("no records found for resource {0}")]
    EmptyResult(String),

    #[error("metadata lookup failed: {0}")]
    MetadataResolution(String),

    #[error("download failed: {0}")]
    Download(String),

    #[error("fetch cancelled")]
    Cancelled,

    #[error("unexpected response payload: {0}")]
    Payload(String),

    #[error("CSV export failed: {0}")]
    Export(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl ExplorerError {
    /// Failures that abort a bulk fetch without surfacing partial records.
    pub fn is_retrieval_failure(&self) -> bool {
        matches!(
            self,
            ExplorerError::Network { .. } | ExplorerError::DataRetrieval(_)
        )
    }
}
