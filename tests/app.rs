mod common;

use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use serde_json::json;

use mtl_data_explorer::app::{App, ExportKind};
use mtl_data_explorer::collector::CancelToken;
use mtl_data_explorer::domain::ResourceId;
use mtl_data_explorer::error::ExplorerError;

use common::{FakePortal, FakeResource, RecordingSink, inventory_rows, package, test_config};

const TREES: &str = "64e28fe6-ef37-437a-972d-d1d3f1f7d891";
const LIMITS: &str = "f1d3c2a9-0b7e-4c55-9d1e-5a2b8c7e6f40";

fn portal() -> FakePortal {
    FakePortal::default()
        .with_resource(
            TREES,
            FakeResource {
                name: "Arbres publics".to_string(),
                format: "CSV".to_string(),
                url: "http://portal.test/files/arbres.csv".to_string(),
                rows: inventory_rows(5),
            },
        )
        .with_resource(
            LIMITS,
            FakeResource {
                name: "Limites administratives".to_string(),
                format: "GeoJSON".to_string(),
                url: "http://portal.test/files/limites.geojson".to_string(),
                rows: Vec::new(),
            },
        )
        .with_file(
            "http://portal.test/files/limites.geojson",
            br#"{"type":"FeatureCollection","features":[]}"#,
        )
        .with_packages(vec![package(
            "arbres",
            "Arbres publics",
            "2024-06-12T08:30:00.123456",
            json!([{"id": TREES, "name": "Arbres", "format": "CSV", "url": ""}]),
        )])
}

fn temp_dir() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, dir)
}

#[test]
fn fetch_collects_all_pages_with_metadata() {
    let portal = portal();
    let app = App::new(&portal, &test_config(None));
    let sink = RecordingSink::default();
    let id: ResourceId = TREES.parse().unwrap();

    let fetched = app.fetch(&id, None, &sink, &CancelToken::new()).unwrap();

    assert_eq!(fetched.meta.display_name, "Arbres publics");
    assert_eq!(fetched.collected.records.len(), 5);
    assert_eq!(fetched.collected.pages, 3);
    assert_eq!(fetched.collected.records.columns(), ["arrondissement", "count"]);

    let summary = fetched.summary(2);
    assert_eq!(summary.rows, 5);
    assert_eq!(summary.total, Some(5));
    assert_eq!(summary.preview.len(), 2);
    assert!(summary.dropped_internal_id);

    let messages = sink.messages();
    assert!(messages.iter().any(|m| m.starts_with("phase=Resolve;")));
    assert!(messages.iter().any(|m| m == "progress fetched=5 total=5"));
}

#[test]
fn fetch_of_unknown_resource_is_a_retrieval_failure() {
    let portal = portal();
    let app = App::new(&portal, &test_config(None));
    let id: ResourceId = "unknown-resource".parse().unwrap();

    let err = app
        .fetch(&id, None, &RecordingSink::default(), &CancelToken::new())
        .unwrap_err();

    assert!(err.is_retrieval_failure());
    assert_matches!(err, ExplorerError::Network { attempts: 2, .. });
}

#[test]
fn info_reports_format_mime_and_row_count() {
    let portal = portal();
    let app = App::new(&portal, &test_config(None));
    let id: ResourceId = TREES.parse().unwrap();

    let info = app.info(&id, &RecordingSink::default());

    assert!(info.tabular);
    assert_eq!(info.mime, "text/csv");
    assert_eq!(info.total_rows, Some(5));

    let geo: ResourceId = LIMITS.parse().unwrap();
    let info = app.info(&geo, &RecordingSink::default());
    assert!(!info.tabular);
    assert_eq!(info.mime, "application/geo+json");
}

#[test]
fn export_of_tabular_resource_writes_csv() {
    let (_temp, dir) = temp_dir();
    let portal = portal();
    let app = App::new(&portal, &test_config(None));
    let id: ResourceId = TREES.parse().unwrap();

    let saved = app
        .export(&id, None, Some(&dir), &RecordingSink::default(), &CancelToken::new())
        .unwrap();

    assert_eq!(saved.kind, ExportKind::Csv);
    assert_eq!(saved.rows, Some(5));
    assert!(saved.path.ends_with("Arbres_publics_64e28fe6.csv"));
    let bytes = fs::read(&saved.path).unwrap();
    assert!(bytes.starts_with(b"\xEF\xBB\xBF"));
    let text = String::from_utf8(bytes[3..].to_vec()).unwrap();
    assert_eq!(text.lines().next(), Some("arrondissement,count"));
    assert_eq!(text.lines().count(), 6);
}

#[test]
fn export_of_non_tabular_resource_passes_file_through() {
    let (_temp, dir) = temp_dir();
    let portal = portal();
    let app = App::new(&portal, &test_config(Some(dir.as_str())));
    let id: ResourceId = LIMITS.parse().unwrap();

    let saved = app
        .export(&id, None, None, &RecordingSink::default(), &CancelToken::new())
        .unwrap();

    assert_eq!(saved.kind, ExportKind::Raw);
    assert_eq!(saved.mime, "application/geo+json");
    assert_eq!(saved.path, dir.join("Limites_administratives_f1d3c2a9.geojson").as_str());
    assert_eq!(
        fs::read(&saved.path).unwrap(),
        br#"{"type":"FeatureCollection","features":[]}"#
    );
    assert!(portal.calls_to("/datastore_search").is_empty());
}

#[test]
fn raw_download_of_missing_file_fails() {
    let (_temp, dir) = temp_dir();
    let portal = portal();
    let app = App::new(&portal, &test_config(None));
    let id: ResourceId = TREES.parse().unwrap();
    let meta = app.resolve_meta(&id);

    let err = app
        .save_raw(&id, &meta, Some(&dir), &RecordingSink::default())
        .unwrap_err();

    assert_matches!(err, ExplorerError::Download(_));
    assert!(fs::read_dir(dir.as_std_path()).unwrap().next().is_none());
}

#[test]
fn filtered_csv_keeps_matching_rows_only() {
    let (_temp, dir) = temp_dir();
    let portal = portal();
    let app = App::new(&portal, &test_config(None));
    let id: ResourceId = TREES.parse().unwrap();
    let sink = RecordingSink::default();
    let fetched = app.fetch(&id, None, &sink, &CancelToken::new()).unwrap();

    let saved = app.save_csv(&fetched, "verdun", Some(&dir), &sink).unwrap();

    assert_eq!(saved.rows, Some(3));
    let text = fs::read_to_string(&saved.path).unwrap();
    assert_eq!(text.lines().filter(|line| line.contains("Verdun")).count(), 3);
    assert!(!text.contains("Plateau"));
}

#[test]
fn row_cap_limits_fetch() {
    let portal = portal();
    let app = App::new(&portal, &test_config(None));
    let id: ResourceId = TREES.parse().unwrap();

    let fetched = app
        .fetch(&id, Some(3), &RecordingSink::default(), &CancelToken::new())
        .unwrap();

    assert_eq!(fetched.collected.records.len(), 3);
    assert_eq!(fetched.collected.pages, 2);
}

#[test]
fn catalog_lists_datasets() {
    let portal = portal();
    let app = App::new(&portal, &test_config(None));

    let result = app.catalog(false, &RecordingSink::default());

    assert_eq!(result.count, 1);
    assert_eq!(result.datasets[0].resources[0].id, TREES);
}
