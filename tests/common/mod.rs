#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::{Value, json};

use mtl_data_explorer::app::{ProgressEvent, ProgressSink};
use mtl_data_explorer::config::{Config, ConfigLoader, FetchSection, ResolvedConfig};
use mtl_data_explorer::error::ExplorerError;
use mtl_data_explorer::transport::{HttpReply, PortalTransport};

pub const API_BASE: &str = "http://portal.test/api/3/action";

/// In-memory CKAN portal: `resource_show`, `datastore_search`,
/// `package_search` and plain file URLs.
#[derive(Default)]
pub struct FakePortal {
    pub resources: HashMap<String, FakeResource>,
    pub packages: Vec<Value>,
    pub files: HashMap<String, Vec<u8>>,
    /// Status returned by every `resource_show` / `package_search` call when set.
    pub metadata_status: Mutex<Option<u16>>,
    pub calls: Mutex<Vec<(String, Vec<(String, String)>)>>,
}

pub struct FakeResource {
    pub name: String,
    pub format: String,
    pub url: String,
    pub rows: Vec<Value>,
}

impl FakePortal {
    pub fn with_resource(mut self, id: &str, resource: FakeResource) -> Self {
        self.resources.insert(id.to_string(), resource);
        self
    }

    pub fn with_file(mut self, url: &str, bytes: &[u8]) -> Self {
        self.files.insert(url.to_string(), bytes.to_vec());
        self
    }

    pub fn with_packages(mut self, packages: Vec<Value>) -> Self {
        self.packages = packages;
        self
    }

    pub fn fail_metadata(&self, status: Option<u16>) {
        *self.metadata_status.lock().unwrap() = status;
    }

    pub fn calls_to(&self, action: &str) -> Vec<Vec<(String, String)>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(url, _)| url.ends_with(action))
            .map(|(_, query)| query.clone())
            .collect()
    }

    fn param<'a>(query: &'a [(&str, String)], name: &str) -> Option<&'a str> {
        query
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    fn reply(status: u16, body: Value) -> Result<HttpReply, ExplorerError> {
        Ok(HttpReply {
            status,
            body: body.to_string().into_bytes(),
        })
    }
}

impl PortalTransport for FakePortal {
    fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
        _timeout: Duration,
    ) -> Result<HttpReply, ExplorerError> {
        self.calls.lock().unwrap().push((
            url.to_string(),
            query
                .iter()
                .map(|(key, value)| (key.to_string(), value.clone()))
                .collect(),
        ));
        let metadata_status = *self.metadata_status.lock().unwrap();

        if url.ends_with("/resource_show") {
            if let Some(status) = metadata_status {
                return Self::reply(status, json!({"success": false}));
            }
            let id = Self::param(query, "id").unwrap_or_default();
            return match self.resources.get(id) {
                Some(res) => Self::reply(
                    200,
                    json!({"success": true, "result": {
                        "id": id, "name": res.name, "format": res.format, "url": res.url
                    }}),
                ),
                None => Self::reply(404, json!({"success": false, "error": {"message": "Not found"}})),
            };
        }

        if url.ends_with("/datastore_search") {
            let id = Self::param(query, "resource_id").unwrap_or_default();
            let Some(res) = self.resources.get(id) else {
                return Self::reply(404, json!({"success": false}));
            };
            let limit: usize = Self::param(query, "limit").unwrap_or("100").parse().unwrap();
            let offset: usize = Self::param(query, "offset").unwrap_or("0").parse().unwrap();
            let page: Vec<Value> = res.rows.iter().skip(offset).take(limit).cloned().collect();
            let fields: Vec<Value> = res
                .rows
                .first()
                .and_then(Value::as_object)
                .map(|row| row.keys().map(|key| json!({"id": key})).collect())
                .unwrap_or_default();
            return Self::reply(
                200,
                json!({"success": true, "result": {
                    "total": res.rows.len(), "records": page, "fields": fields
                }}),
            );
        }

        if url.ends_with("/package_search") {
            if let Some(status) = metadata_status {
                return Self::reply(status, json!({"success": false}));
            }
            let rows: usize = Self::param(query, "rows").unwrap_or("10").parse().unwrap();
            let start: usize = Self::param(query, "start").unwrap_or("0").parse().unwrap();
            let results: Vec<Value> = self.packages.iter().skip(start).take(rows).cloned().collect();
            return Self::reply(
                200,
                json!({"success": true, "result": {"count": self.packages.len(), "results": results}}),
            );
        }

        match self.files.get(url) {
            Some(bytes) => Ok(HttpReply {
                status: 200,
                body: bytes.clone(),
            }),
            None => Self::reply(404, json!({})),
        }
    }
}

/// `n` datastore rows shaped like a small city inventory.
pub fn inventory_rows(n: usize) -> Vec<Value> {
    (0..n)
        .map(|i| {
            let borough = if i % 2 == 0 {
                "Verdun"
            } else {
                "Plateau-Mont-Royal"
            };
            json!({"_id": i + 1, "arrondissement": borough, "count": i * 10})
        })
        .collect()
}

pub fn package(name: &str, title: &str, modified: &str, resources: Value) -> Value {
    json!({
        "name": name,
        "title": title,
        "organization": {"name": "ville-de-montreal", "title": "Ville de Montréal"},
        "metadata_modified": modified,
        "notes": format!("Notes for {title}"),
        "resources": resources,
    })
}

/// Fast config against [`API_BASE`]: page size 2, no pauses, no backoff.
pub fn test_config(export_dir: Option<&str>) -> ResolvedConfig {
    ConfigLoader::resolve_config(Config {
        api_base: Some(API_BASE.to_string()),
        export_dir: export_dir.map(str::to_string),
        fetch: FetchSection {
            page_size: Some(2),
            max_attempts: Some(2),
            backoff_base_secs: Some(0),
            page_pause_ms: Some(0),
            catalog_pause_ms: Some(0),
            ..FetchSection::default()
        },
        ..Config::default()
    })
    .unwrap()
}

#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|event| event.message.clone())
            .collect()
    }
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}
