use std::fs;
use std::time::Duration;

use assert_matches::assert_matches;

use mtl_data_explorer::config::{Config, ConfigLoader, FetchSection};
use mtl_data_explorer::error::ExplorerError;
use mtl_data_explorer::i18n::Lang;

#[test]
fn load_config_file_overrides_defaults() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("mtl-data.json");
    fs::write(
        &path,
        r#"{
            "schema_version": 1,
            "api_base": "http://localhost:5000/api/3/action",
            "language": "fr",
            "default_max_rows": 5000,
            "export_dir": "/tmp/exports",
            "fetch": {"page_size": 500, "max_attempts": 3, "page_pause_ms": 0},
            "cache": {"catalog_ttl_secs": 60}
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();

    assert_eq!(resolved.language, Lang::Fr);
    assert_eq!(resolved.default_max_rows, Some(5000));
    assert_eq!(resolved.page_size, 500);
    assert_eq!(resolved.max_attempts, 3);
    assert_eq!(resolved.page_pause, Duration::ZERO);
    assert_eq!(resolved.catalog_ttl, Duration::from_secs(60));
    assert_eq!(resolved.metadata_ttl, Duration::from_secs(30 * 60));
    assert_eq!(
        resolved.endpoints.resource_show,
        "http://localhost:5000/api/3/action/resource_show"
    );
    assert_eq!(
        resolved.export_dir.as_deref(),
        Some(std::path::Path::new("/tmp/exports"))
    );
}

#[test]
fn missing_explicit_config_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");

    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();

    assert_matches!(err, ExplorerError::ConfigRead(ref missing) if missing == &path);
}

#[test]
fn malformed_config_is_a_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("broken.json");
    fs::write(&path, "{ \"fetch\": { \"page_size\": \"many\" } }").unwrap();

    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();

    assert_matches!(err, ExplorerError::ConfigParse(_));
}

#[test]
fn zero_page_size_is_rejected() {
    let config = Config {
        fetch: FetchSection {
            page_size: Some(0),
            ..FetchSection::default()
        },
        ..Config::default()
    };

    assert_matches!(
        ConfigLoader::resolve_config(config),
        Err(ExplorerError::ConfigParse(_))
    );
}

#[test]
fn zero_default_max_rows_is_rejected() {
    let config = Config {
        default_max_rows: Some(0),
        ..Config::default()
    };

    assert_matches!(
        ConfigLoader::resolve_config(config),
        Err(ExplorerError::ConfigParse(_))
    );
}
