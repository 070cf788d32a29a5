mod common;

use mtl_data_explorer::config::Endpoints;
use mtl_data_explorer::domain::{ResourceFormat, ResourceId, ResourceMeta};
use mtl_data_explorer::metadata::ResourceMetadataResolver;

use common::{API_BASE, FakePortal, FakeResource, inventory_rows};

const TREES: &str = "64e28fe6-ef37-437a-972d-d1d3f1f7d891";

fn portal() -> FakePortal {
    FakePortal::default().with_resource(
        TREES,
        FakeResource {
            name: "Arbres publics sur le territoire de la Ville".to_string(),
            format: "CSV".to_string(),
            url: "http://portal.test/files/arbres.csv".to_string(),
            rows: inventory_rows(7),
        },
    )
}

#[test]
fn resolves_name_format_and_url() {
    let portal = portal();
    let resolver = ResourceMetadataResolver::new(&portal, &Endpoints::from_base(API_BASE));
    let id: ResourceId = TREES.parse().unwrap();

    let meta = resolver.resolve_meta(&id);

    assert_eq!(meta.display_name, "Arbres publics sur le territoire de la Ville");
    assert_eq!(meta.resource_format(), ResourceFormat::Csv);
    assert_eq!(meta.download_url, "http://portal.test/files/arbres.csv");
    assert_eq!(portal.calls_to("/resource_show"), vec![vec![("id".to_string(), TREES.to_string())]]);
}

#[test]
fn successful_lookup_is_cached() {
    let portal = portal();
    let resolver = ResourceMetadataResolver::new(&portal, &Endpoints::from_base(API_BASE));
    let id: ResourceId = TREES.parse().unwrap();

    let first = resolver.resolve_meta(&id);
    let second = resolver.resolve_meta(&id);

    assert_eq!(first, second);
    assert_eq!(portal.calls_to("/resource_show").len(), 1);

    resolver.forget(&id);
    resolver.resolve_meta(&id);
    assert_eq!(portal.calls_to("/resource_show").len(), 2);
}

#[test]
fn unknown_resource_falls_back_to_id() {
    let portal = portal();
    let resolver = ResourceMetadataResolver::new(&portal, &Endpoints::from_base(API_BASE));
    let id: ResourceId = "does-not-exist".parse().unwrap();

    let meta = resolver.resolve_meta(&id);

    assert_eq!(meta, ResourceMeta::fallback(&id));
    assert_eq!(meta.display_name, "does-not-exist");
    assert_eq!(meta.resource_format(), ResourceFormat::Unknown);
}

#[test]
fn failed_lookup_is_retried_next_time() {
    let portal = portal();
    let resolver = ResourceMetadataResolver::new(&portal, &Endpoints::from_base(API_BASE));
    let id: ResourceId = TREES.parse().unwrap();

    portal.fail_metadata(Some(503));
    assert_eq!(resolver.resolve_meta(&id), ResourceMeta::fallback(&id));

    portal.fail_metadata(None);
    let meta = resolver.resolve_meta(&id);
    assert_eq!(meta.resource_format(), ResourceFormat::Csv);
    assert_eq!(portal.calls_to("/resource_show").len(), 2);
}

#[test]
fn total_count_probes_a_single_row() {
    let portal = portal();
    let resolver = ResourceMetadataResolver::new(&portal, &Endpoints::from_base(API_BASE));
    let id: ResourceId = TREES.parse().unwrap();

    assert_eq!(resolver.resolve_total_count(&id), Some(7));
    assert_eq!(resolver.resolve_total_count(&id), Some(7));

    let probes = portal.calls_to("/datastore_search");
    assert_eq!(probes.len(), 1);
    assert!(probes[0].contains(&("limit".to_string(), "1".to_string())));
}

#[test]
fn total_count_of_unknown_resource_is_none() {
    let portal = portal();
    let resolver = ResourceMetadataResolver::new(&portal, &Endpoints::from_base(API_BASE));
    let id: ResourceId = "missing".parse().unwrap();

    assert_eq!(resolver.resolve_total_count(&id), None);
}
