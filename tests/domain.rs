use assert_matches::assert_matches;
use serde_json::json;

use mtl_data_explorer::domain::{RecordSet, ResourceFormat, ResourceId, ResourceMeta};
use mtl_data_explorer::error::ExplorerError;

#[test]
fn resource_id_from_url_with_query() {
    let id: ResourceId =
        "https://donnees.montreal.ca/dataset/arbres/resource/64e28fe6-ef37-437a-972d-d1d3f1f7d891?view=table"
            .parse()
            .unwrap();
    assert_eq!(id.as_str(), "64e28fe6-ef37-437a-972d-d1d3f1f7d891");
}

#[test]
fn resource_id_rejects_url_without_resource() {
    let err = "https://donnees.montreal.ca/dataset/arbres"
        .parse::<ResourceId>()
        .unwrap_err();
    assert_matches!(err, ExplorerError::InvalidResourceId(_));
}

#[test]
fn resource_id_rejects_inner_whitespace() {
    assert_matches!(
        "abc 123".parse::<ResourceId>(),
        Err(ExplorerError::InvalidResourceId(_))
    );
}

#[test]
fn fallback_meta_uses_id_as_name() {
    let id: ResourceId = "abc-123".parse().unwrap();
    let meta = ResourceMeta::fallback(&id);
    assert_eq!(meta.display_name, "abc-123");
    assert_eq!(meta.resource_format(), ResourceFormat::Unknown);
    assert!(meta.download_url.is_empty());
}

#[test]
fn format_display_and_extension() {
    assert_eq!(ResourceFormat::Xlsx.to_string(), "XLSX");
    assert_eq!(ResourceFormat::Unknown.to_string(), "unknown");
    let pdf: ResourceFormat = "PDF".parse().unwrap();
    assert_eq!(pdf.extension(), "pdf");
    let odd: ResourceFormat = "text/csv; charset".parse().unwrap();
    assert_eq!(odd, ResourceFormat::Unknown);
}

#[test]
fn estimated_bytes_grows_with_content() {
    let small = RecordSet::new(vec![json!({"a": "x"}).as_object().cloned().unwrap()], &[]);
    let large = RecordSet::new(
        vec![json!({"a": "x".repeat(1_000)}).as_object().cloned().unwrap()],
        &[],
    );
    assert!(small.estimated_bytes() > 0);
    assert!(large.estimated_bytes() > small.estimated_bytes() + 900);
}
