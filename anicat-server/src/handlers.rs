//! Addon endpoints. Every route answers 200 with JSON; upstream trouble shows
//! up as an empty `metas` list or a `null` meta.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use tracing::debug;

use anicat_core::orchestrator::{CacheStats, CatalogFilters};
use anicat_core::types::{CatalogItem, MetaRecord};

use crate::{AppState, manifest::Manifest};

#[derive(Debug, Serialize)]
pub struct CatalogResponse {
    pub metas: Vec<CatalogItem>,
}

#[derive(Debug, Serialize)]
pub struct MetaResponse {
    pub meta: Option<MetaRecord>,
}

#[derive(Debug, Serialize)]
pub struct TableHealth {
    pub entries: usize,
    pub loaded_at: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: u64,
    pub cache: CacheStats,
    pub fribb: TableHealth,
    pub manami: TableHealth,
    pub resolved_ids: usize,
    pub unmatched_ids: usize,
}

/// Strip the `.json` suffix addon clients append to the last path segment.
pub fn strip_json(segment: &str) -> &str {
    segment.strip_suffix(".json").unwrap_or(segment)
}

/// Parse an extra segment such as `genre=Action&skip=20` into filters and
/// the skip offset. Unparsable skips count as zero.
pub fn parse_extra(extra: &str) -> (CatalogFilters, u32) {
    let mut skip = 0;
    let mut pairs = Vec::new();
    for (key, value) in url::form_urlencoded::parse(extra.as_bytes()) {
        if key == "skip" {
            skip = value.trim().parse().unwrap_or(0);
        } else {
            pairs.push((key.into_owned(), value.into_owned()));
        }
    }
    (CatalogFilters::from_pairs(pairs), skip)
}

pub async fn manifest_handler(State(state): State<AppState>) -> Json<Manifest> {
    Json(state.manifest.as_ref().clone())
}

pub async fn catalog_handler(
    State(state): State<AppState>,
    Path((kind, catalog)): Path<(String, String)>,
) -> Json<CatalogResponse> {
    let catalog_id = strip_json(&catalog);
    debug!(%kind, catalog = catalog_id, "catalog request");
    let metas = state
        .orchestrator
        .catalog_page(catalog_id, &CatalogFilters::default(), 0)
        .await;
    Json(CatalogResponse { metas })
}

pub async fn catalog_extra_handler(
    State(state): State<AppState>,
    Path((kind, catalog_id, extra)): Path<(String, String, String)>,
) -> Json<CatalogResponse> {
    let (filters, skip) = parse_extra(strip_json(&extra));
    debug!(
        %kind,
        catalog = %catalog_id,
        filters = %filters.cache_fragment(),
        skip,
        "catalog request"
    );
    let metas = state
        .orchestrator
        .catalog_page(&catalog_id, &filters, skip)
        .await;
    Json(CatalogResponse { metas })
}

pub async fn meta_handler(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> Json<MetaResponse> {
    let identifier = strip_json(&id);
    debug!(%kind, identifier, "meta request");
    let meta = state.orchestrator.meta(identifier).await;
    Json(MetaResponse { meta })
}

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let orchestrator = &state.orchestrator;
    let resolver = orchestrator.resolver();
    let fribb = resolver.tmdb_table();
    let manami = resolver.mal_table();

    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.started_at.elapsed().as_secs(),
        cache: orchestrator.cache_stats(),
        fribb: TableHealth {
            entries: fribb.len(),
            loaded_at: fribb.loaded_at().map(|at| at.to_rfc3339()),
        },
        manami: TableHealth {
            entries: manami.len(),
            loaded_at: manami.loaded_at().map(|at| at.to_rfc3339()),
        },
        resolved_ids: resolver.memo_len(),
        unmatched_ids: resolver.negative_len(),
    })
}
