mod support;

use serde_json::Value;

use anicat_server::static_build::StaticBuilder;
use support::TestApp;

fn read(path: &std::path::Path) -> Value {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

#[tokio::test]
async fn build_writes_manifest_catalog_pages_and_metas() {
    let app = TestApp::new(&[(16498, "Shingeki no Kyojin"), (1, "Cowboy Bebop")], &[]);
    let out = tempfile::tempdir().unwrap();

    let report = StaticBuilder::new(app.orchestrator.clone(), app.manifest(), out.path(), 3)
        .run()
        .await
        .unwrap();

    // Five browsable catalogs, each with one non-empty page.
    assert_eq!(report.catalog_pages, 5);
    assert_eq!(report.metas, 2);
    assert_eq!(report.missing_metas, 0);

    let manifest = read(&out.path().join("manifest.json"));
    assert_eq!(manifest["id"], "org.anicat.addon");

    let trending = read(&out.path().join("catalog/anime/trending.json"));
    assert_eq!(trending["metas"][0]["id"], "anilist:16498");
    assert!(!out.path().join("catalog/anime/trending/skip=20.json").exists());
    assert!(!out.path().join("catalog/anime/search.json").exists());

    let meta = read(&out.path().join("meta/series/anilist:1.json"));
    assert_eq!(meta["meta"]["name"], "Cowboy Bebop");
}
