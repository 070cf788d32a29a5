use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ExplorerError;

/// Server-internal row id added by the datastore to every record.
pub const INTERNAL_ID_COLUMN: &str = "_id";

static RESOURCE_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/resource/([0-9A-Za-z][0-9A-Za-z_-]*)").expect("static regex is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, used to disambiguate export file names.
    pub fn short(&self) -> String {
        self.0.chars().take(8).collect()
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ResourceId {
    type Err = ExplorerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ExplorerError::InvalidResourceId(value.to_string()));
        }
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            let id = RESOURCE_URL_RE
                .captures(trimmed)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
                .ok_or_else(|| ExplorerError::InvalidResourceId(value.to_string()))?;
            return Ok(Self(id));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(ExplorerError::InvalidResourceId(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// One datastore row: column name to scalar, in server order.
pub type Record = Map<String, Value>;

/// Records of one resource plus the column list derived when it was built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordSet {
    columns: Vec<String>,
    records: Vec<Record>,
}

impl RecordSet {
    /// Builds the column list from `declared` first, then from keys as first
    /// seen across `records`.
    pub fn new(records: Vec<Record>, declared: &[String]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for name in declared {
            if !columns.contains(name) {
                columns.push(name.clone());
            }
        }
        for record in &records {
            for key in record.keys() {
                if !columns.iter().any(|col| col == key) {
                    columns.push(key.clone());
                }
            }
        }
        Self { columns, records }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|col| col == name)
    }

    /// Drops the datastore row id unless it is the only column.
    pub(crate) fn drop_internal_id(&mut self) -> bool {
        if !self.has_column(INTERNAL_ID_COLUMN) || self.columns.len() <= 1 {
            return false;
        }
        self.columns.retain(|col| col != INTERNAL_ID_COLUMN);
        for record in &mut self.records {
            record.shift_remove(INTERNAL_ID_COLUMN);
        }
        true
    }

    /// Rough in-memory footprint: key and value text plus per-cell overhead.
    pub fn estimated_bytes(&self) -> u64 {
        const CELL_OVERHEAD: u64 = 24;
        let mut total = 0u64;
        for record in &self.records {
            for (key, value) in record {
                let value_len = match value {
                    Value::Null => 0,
                    Value::Bool(_) => 1,
                    Value::Number(_) => 8,
                    Value::String(text) => text.len() as u64,
                    other => other.to_string().len() as u64,
                };
                total += key.len() as u64 + value_len + CELL_OVERHEAD;
            }
        }
        total
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FetchProgress {
    pub fetched: usize,
    pub total: Option<usize>,
}

impl FetchProgress {
    pub fn percent(&self) -> u8 {
        match self.total {
            Some(total) if total > 0 => {
                let pct = (self.fetched as u128 * 100) / total as u128;
                pct.min(100) as u8
            }
            _ => 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMeta {
    pub format: String,
    pub download_url: String,
    pub display_name: String,
}

impl ResourceMeta {
    pub fn fallback(id: &ResourceId) -> Self {
        Self {
            format: String::new(),
            download_url: String::new(),
            display_name: id.as_str().to_string(),
        }
    }

    pub fn resource_format(&self) -> ResourceFormat {
        self.format.parse().unwrap_or(ResourceFormat::Unknown)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceFormat {
    Csv,
    Tsv,
    Xls,
    Xlsx,
    Json,
    GeoJson,
    Other(String),
    Unknown,
}

impl ResourceFormat {
    /// Formats the datastore exposes as structured rows.
    pub fn is_tabular(&self) -> bool {
        matches!(
            self,
            ResourceFormat::Csv | ResourceFormat::Tsv | ResourceFormat::Xls | ResourceFormat::Xlsx
        )
    }

    pub fn extension(&self) -> String {
        match self {
            ResourceFormat::Csv => "csv".to_string(),
            ResourceFormat::Tsv => "tsv".to_string(),
            ResourceFormat::Xls => "xls".to_string(),
            ResourceFormat::Xlsx => "xlsx".to_string(),
            ResourceFormat::Json => "json".to_string(),
            ResourceFormat::GeoJson => "geojson".to_string(),
            ResourceFormat::Other(value) => value.to_lowercase(),
            ResourceFormat::Unknown => "bin".to_string(),
        }
    }
}

impl FromStr for ResourceFormat {
    type Err = ExplorerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().trim_start_matches('.').to_lowercase();
        Ok(match normalized.as_str() {
            "" => ResourceFormat::Unknown,
            "csv" => ResourceFormat::Csv,
            "tsv" => ResourceFormat::Tsv,
            "xls" => ResourceFormat::Xls,
            "xlsx" => ResourceFormat::Xlsx,
            "json" => ResourceFormat::Json,
            "geojson" => ResourceFormat::GeoJson,
            other if other.chars().all(|ch| ch.is_ascii_alphanumeric()) => {
                ResourceFormat::Other(other.to_string())
            }
            _ => ResourceFormat::Unknown,
        })
    }
}

impl fmt::Display for ResourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceFormat::Unknown => write!(f, "unknown"),
            other => write!(f, "{}", other.extension().to_uppercase()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogResource {
    pub name: String,
    pub format: String,
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub title: String,
    pub organization: String,
    pub resource_count: usize,
    pub last_modified: String,
    pub notes: String,
    pub resources: Vec<CatalogResource>,
}
