//! Pre-render the addon to static JSON files laid out like the HTTP routes,
//! so any static file host can serve it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use futures::{StreamExt, stream};
use serde::Serialize;
use tracing::{info, warn};

use anicat_core::orchestrator::{CatalogFilters, Orchestrator};
use anicat_core::types::ContentType;

use crate::handlers::{CatalogResponse, MetaResponse};
use crate::manifest::Manifest;

const META_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub catalog_pages: usize,
    pub metas: usize,
    pub missing_metas: usize,
}

#[derive(Debug)]
pub struct StaticBuilder {
    orchestrator: Arc<Orchestrator>,
    manifest: Manifest,
    out: PathBuf,
    pages: u32,
}

impl StaticBuilder {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        manifest: Manifest,
        out: impl Into<PathBuf>,
        pages: u32,
    ) -> Self {
        Self {
            orchestrator,
            manifest,
            out: out.into(),
            pages,
        }
    }

    /// Write the manifest, the first `pages` pages of every browsable
    /// catalog and the meta of every item listed on them.
    pub async fn run(&self) -> anyhow::Result<BuildReport> {
        let mut report = BuildReport::default();
        write_json(&self.out.join("manifest.json"), &self.manifest).await?;

        let mut listed: BTreeMap<String, ContentType> = BTreeMap::new();
        for catalog in self.manifest.catalogs.iter() {
            let Some(definition) = self.orchestrator.catalog(catalog.id) else {
                continue;
            };
            if definition.is_search() {
                continue;
            }

            for index in 0..self.pages {
                let skip = index * definition.page_size;
                let metas = self
                    .orchestrator
                    .catalog_page(definition.id, &CatalogFilters::default(), skip)
                    .await;
                if metas.is_empty() {
                    break;
                }

                for item in &metas {
                    listed.insert(item.id.to_string(), item.kind);
                }
                let path = catalog_path(&self.out, catalog.kind, definition.id, skip);
                write_json(&path, &CatalogResponse { metas }).await?;
                report.catalog_pages += 1;
            }
        }

        let results: Vec<anyhow::Result<bool>> = stream::iter(listed)
            .map(|(id, kind)| async move {
                let meta = self.orchestrator.meta(&id).await;
                let found = meta.is_some();
                if !found {
                    warn!(identifier = %id, "no meta available; skipping");
                    return anyhow::Ok(false);
                }
                let path = self
                    .out
                    .join("meta")
                    .join(kind.as_str())
                    .join(format!("{id}.json"));
                write_json(&path, &MetaResponse { meta }).await?;
                anyhow::Ok(found)
            })
            .buffer_unordered(META_CONCURRENCY)
            .collect()
            .await;

        for result in results {
            if result? {
                report.metas += 1;
            } else {
                report.missing_metas += 1;
            }
        }

        info!(
            out = %self.out.display(),
            catalog_pages = report.catalog_pages,
            metas = report.metas,
            missing_metas = report.missing_metas,
            "static build finished"
        );
        Ok(report)
    }
}

/// First page at `catalog/{kind}/{id}.json`, later ones under the extra
/// segment the live route would receive.
pub fn catalog_path(out: &Path, kind: &str, catalog_id: &str, skip: u32) -> PathBuf {
    let dir = out.join("catalog").join(kind);
    if skip == 0 {
        dir.join(format!("{catalog_id}.json"))
    } else {
        dir.join(catalog_id).join(format!("skip={skip}.json"))
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let bytes = serde_json::to_vec(value)?;
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("failed to write {}", path.display()))
}
