use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use directories::UserDirs;

use crate::domain::{Record, RecordSet, ResourceFormat, ResourceId, ResourceMeta};
use crate::error::ExplorerError;
use crate::table::display_value;
use crate::transport::PortalTransport;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Full record set as CSV: BOM, header row, one line per record.
pub fn csv_bytes(set: &RecordSet) -> Result<Vec<u8>, ExplorerError> {
    csv_rows(set.columns(), set.records())
}

/// CSV of an arbitrary row selection, e.g. a filtered view.
pub fn csv_rows<'a, I>(columns: &[String], rows: I) -> Result<Vec<u8>, ExplorerError>
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut writer = csv::Writer::from_writer(UTF8_BOM.to_vec());
    writer
        .write_record(columns)
        .map_err(|err| ExplorerError::Export(err.to_string()))?;
    for record in rows {
        writer
            .write_record(columns.iter().map(|column| display_value(record.get(column))))
            .map_err(|err| ExplorerError::Export(err.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|err| ExplorerError::Export(err.to_string()))
}

/// `{display_name}_{first 8 chars of id}.{ext}` with spaces and path
/// separators replaced by `_`.
pub fn export_filename(display_name: &str, id: &ResourceId, ext: &str) -> String {
    let mut name: String = display_name
        .trim()
        .chars()
        .map(|ch| match ch {
            ' ' | '/' | '\\' => '_',
            other => other,
        })
        .collect();
    if name.is_empty() {
        name = id.short();
    }
    format!("{name}_{}.{ext}", id.short())
}

pub fn mime_for_format(format: &ResourceFormat) -> &'static str {
    match format {
        ResourceFormat::Csv => "text/csv",
        ResourceFormat::Tsv => "text/tab-separated-values",
        ResourceFormat::Xls => "application/vnd.ms-excel",
        ResourceFormat::Xlsx => {
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        }
        ResourceFormat::Json => "application/json",
        ResourceFormat::GeoJson => "application/geo+json",
        ResourceFormat::Other(ext) => match ext.as_str() {
            "pdf" => "application/pdf",
            "zip" => "application/zip",
            "xml" => "application/xml",
            "kml" => "application/vnd.google-earth.kml+xml",
            "txt" => "text/plain",
            _ => "application/octet-stream",
        },
        ResourceFormat::Unknown => "application/octet-stream",
    }
}

/// Byte-for-byte passthrough of a resource's original file.
pub struct RawDownloader<T: PortalTransport> {
    transport: T,
    timeout: Duration,
}

impl<T: PortalTransport> RawDownloader<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn download(&self, meta: &ResourceMeta) -> Result<Vec<u8>, ExplorerError> {
        if meta.download_url.trim().is_empty() {
            return Err(ExplorerError::Download(format!(
                "{} has no download URL",
                meta.display_name
            )));
        }
        tracing::info!(url = %meta.download_url, "raw download");
        let reply = self
            .transport
            .get(&meta.download_url, &[], self.timeout)
            .map_err(|err| ExplorerError::Download(err.to_string()))?;
        if !reply.is_success() {
            return Err(ExplorerError::Download(format!("HTTP {}", reply.status)));
        }
        Ok(reply.body)
    }
}

/// Writes through a temp file in the destination directory, then renames.
pub fn write_atomic(path: &Utf8Path, bytes: &[u8]) -> Result<(), ExplorerError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or(Utf8Path::new("."));
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| ExplorerError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".mtl-data-export")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| ExplorerError::Filesystem(err.to_string()))?;
    temp.write_all(bytes)
        .map_err(|err| ExplorerError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| ExplorerError::Filesystem(err.to_string()))?;
    Ok(())
}

/// Configured export directory, else the user's download directory, else cwd.
pub fn export_dir(configured: Option<&Path>) -> Result<Utf8PathBuf, ExplorerError> {
    let dir = match configured {
        Some(dir) => dir.to_path_buf(),
        None => match UserDirs::new().and_then(|dirs| dirs.download_dir().map(Path::to_path_buf)) {
            Some(dir) => dir,
            None => std::env::current_dir()
                .map_err(|err| ExplorerError::Filesystem(err.to_string()))?,
        },
    };
    Utf8PathBuf::from_path_buf(dir)
        .map_err(|_| ExplorerError::Filesystem("non-utf8 export directory".to_string()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn csv_has_bom_header_and_blank_nulls() {
        let records = vec![
            json!({"name": "Rosemont, La Petite-Patrie", "pop": 139590, "tags": ["a"], "x": null})
                .as_object()
                .cloned()
                .unwrap(),
        ];
        let set = RecordSet::new(records, &[]);
        let bytes = csv_bytes(&set).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
        let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("name,pop,tags,x"));
        assert_eq!(
            lines.next(),
            Some("\"Rosemont, La Petite-Patrie\",139590,\"[\"\"a\"\"]\",")
        );
    }

    #[test]
    fn filename_replaces_spaces_and_separators() {
        let id: ResourceId = "cc41b532-f12d-40fb-9f55-eb58c9a2b12b".parse().unwrap();
        assert_eq!(
            export_filename("Arbres publics / ville", &id, "csv"),
            "Arbres_publics___ville_cc41b532.csv"
        );
        assert_eq!(export_filename("  ", &id, "bin"), "cc41b532_cc41b532.bin");
    }

    #[test]
    fn mime_types() {
        assert_eq!(mime_for_format(&ResourceFormat::Csv), "text/csv");
        assert_eq!(
            mime_for_format(&ResourceFormat::Other("pdf".to_string())),
            "application/pdf"
        );
        assert_eq!(
            mime_for_format(&ResourceFormat::Unknown),
            "application/octet-stream"
        );
    }

    #[test]
    fn write_atomic_replaces_existing_file() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let path = dir.join("nested").join("out.csv");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(fs::read(path.as_std_path()).unwrap(), b"second");
    }
}
