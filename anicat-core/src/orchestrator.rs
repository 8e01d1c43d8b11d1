//! Catalog pages and detail records, assembled from the upstreams and kept
//! in TTL caches.
//!
//! Nothing here returns an error to the caller. A failed page is logged and
//! comes back empty, a failed detail lookup comes back as `None`, and
//! neither outcome is cached.

use std::{any::type_name_of_val, collections::BTreeMap, fmt, sync::Arc, time::Duration};

use chrono::{Datelike, NaiveDate, Utc};
use futures::future::try_join_all;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{debug, error, info, warn};

use crate::cache::TtlCache;
use crate::error::{FetchError, Result};
use crate::identifier::MediaIdentifier;
use crate::providers::anilist::{
    self, AnimeItem, MediaData, PageData,
};
use crate::providers::{EpisodeSource, SeriesDetailSource};
use crate::queue::QueryQueue;
use crate::resolver::IdResolver;
use crate::types::{CatalogItem, MetaRecord, TmdbBundle};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const DEFAULT_META_TTL: Duration = Duration::from_secs(6 * 3600);

/// AniList's genre vocabulary, offered as catalog filter options.
pub const GENRES: &[&str] = &[
    "Action",
    "Adventure",
    "Comedy",
    "Drama",
    "Ecchi",
    "Fantasy",
    "Horror",
    "Mahou Shoujo",
    "Mecha",
    "Music",
    "Mystery",
    "Psychological",
    "Romance",
    "Sci-Fi",
    "Slice of Life",
    "Sports",
    "Supernatural",
    "Thriller",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Fall,
}

impl Season {
    const ALL: [Season; 4] =
        [Self::Winter, Self::Spring, Self::Summer, Self::Fall];

    pub fn as_anilist(self) -> &'static str {
        match self {
            Self::Winter => "WINTER",
            Self::Spring => "SPRING",
            Self::Summer => "SUMMER",
            Self::Fall => "FALL",
        }
    }

    /// Broadcast season `offset` seasons away from the one containing
    /// `today`. December already belongs to the next year's winter.
    pub fn relative_to(today: NaiveDate, offset: i32) -> (Season, i32) {
        let (index, year) = match today.month() {
            12 => (0, today.year() + 1),
            1 | 2 => (0, today.year()),
            3..=5 => (1, today.year()),
            6..=8 => (2, today.year()),
            _ => (3, today.year()),
        };
        let absolute = year * 4 + index + offset;
        let season = Self::ALL[absolute.rem_euclid(4) as usize];
        (season, absolute.div_euclid(4))
    }
}

/// How a catalog asks AniList for its items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogQuery {
    Sorted {
        sort: &'static str,
        status: Option<&'static str>,
    },
    /// Most popular items of a season relative to the current one.
    Seasonal { offset: i32 },
    /// Free-text search; pages without a `search` filter are empty.
    Search,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub query: CatalogQuery,
    pub page_size: u32,
    pub ttl: Duration,
}

impl CatalogDefinition {
    const fn new(
        id: &'static str,
        name: &'static str,
        query: CatalogQuery,
        ttl_secs: u64,
    ) -> Self {
        Self {
            id,
            name,
            query,
            page_size: DEFAULT_PAGE_SIZE,
            ttl: Duration::from_secs(ttl_secs),
        }
    }

    pub fn defaults() -> Vec<Self> {
        use CatalogQuery::*;
        vec![
            Self::new(
                "trending",
                "Trending Now",
                Sorted {
                    sort: "TRENDING_DESC",
                    status: None,
                },
                3600,
            ),
            Self::new(
                "popular",
                "All Time Popular",
                Sorted {
                    sort: "POPULARITY_DESC",
                    status: None,
                },
                6 * 3600,
            ),
            Self::new(
                "top_rated",
                "Top Rated",
                Sorted {
                    sort: "SCORE_DESC",
                    status: None,
                },
                12 * 3600,
            ),
            Self::new("airing", "Airing This Season", Seasonal { offset: 0 }, 3600),
            Self::new("upcoming", "Upcoming Next Season", Seasonal { offset: 1 }, 6 * 3600),
            Self::new("search", "Search", Search, 1800),
        ]
    }

    pub fn is_search(&self) -> bool {
        self.query == CatalogQuery::Search
    }

    /// 1-based page for an addon `skip` offset.
    pub fn page_for_skip(&self, skip: u32) -> u32 {
        skip / self.page_size.max(1) + 1
    }

    /// Query template and variables for one page.
    pub fn request(
        &self,
        page: u32,
        filters: &CatalogFilters,
        today: NaiveDate,
    ) -> (String, Value) {
        let mut variables = Map::new();
        variables.insert("page".into(), json!(page));
        variables.insert("perPage".into(), json!(self.page_size));
        if let Some(genre) = filters.get("genre") {
            variables.insert("genre".into(), json!(genre));
        }
        if let Some(format) = filters.get("format") {
            variables.insert("format".into(), json!(format.to_ascii_uppercase()));
        }

        let query = match self.query {
            CatalogQuery::Sorted { sort, status } => {
                variables.insert("sort".into(), json!([sort]));
                if let Some(status) = status {
                    variables.insert("status".into(), json!(status));
                }
                if let Some(year) = filters.year() {
                    variables.insert("year".into(), json!(format!("{year}%")));
                }
                anilist::media_page_query()
            }
            CatalogQuery::Seasonal { offset } => {
                let (season, year) = Season::relative_to(today, offset);
                variables.insert("sort".into(), json!(["POPULARITY_DESC"]));
                variables.insert("season".into(), json!(season.as_anilist()));
                variables.insert("seasonYear".into(), json!(year));
                anilist::seasonal_page_query()
            }
            CatalogQuery::Search => {
                variables.insert(
                    "search".into(),
                    json!(filters.get("search").unwrap_or_default()),
                );
                anilist::search_page_query()
            }
        };

        (query, Value::Object(variables))
    }
}

/// Filters a catalog page was requested with. Unsupported keys and empty
/// values are dropped on construction, so two requests differing only in
/// ignored filters share a cache entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogFilters(BTreeMap<String, String>);

impl CatalogFilters {
    pub const SUPPORTED: [&'static str; 4] = ["genre", "search", "format", "year"];

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let filters = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into().trim().to_owned()))
            .filter(|(k, v)| {
                Self::SUPPORTED.contains(&k.as_str()) && !v.is_empty()
            })
            .collect();
        Self(filters)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn year(&self) -> Option<u16> {
        self.get("year")?.parse().ok()
    }

    /// `k=v&k=v` in key order.
    pub fn cache_fragment(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    }
}

pub fn catalog_cache_key(
    catalog_id: &str,
    page: u32,
    filters: &CatalogFilters,
) -> String {
    format!("catalog:{catalog_id}:{page}:{}", filters.cache_fragment())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub catalog_entries: usize,
    pub catalog_pending: usize,
    pub meta_entries: usize,
    pub meta_pending: usize,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub catalogs: Vec<CatalogDefinition>,
    pub meta_ttl: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            catalogs: CatalogDefinition::defaults(),
            meta_ttl: DEFAULT_META_TTL,
        }
    }
}

/// Handles the fetch tasks need; cheap to clone into each task.
#[derive(Clone)]
pub struct Upstreams {
    pub queue: QueryQueue,
    pub resolver: Arc<IdResolver>,
    /// `None` when no TMDB key is configured.
    pub details: Option<Arc<dyn SeriesDetailSource>>,
    pub episodes: Arc<dyn EpisodeSource>,
}

impl fmt::Debug for Upstreams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upstreams")
            .field("queue", &self.queue)
            .field("resolver", &self.resolver)
            .field(
                "details",
                &self.details.as_ref().map(|d| type_name_of_val(d.as_ref())),
            )
            .field("episodes", &type_name_of_val(self.episodes.as_ref()))
            .finish()
    }
}

/// Cross references known for one requested identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct CrossReferences {
    anilist: Option<u32>,
    tmdb: Option<u32>,
    kitsu: Option<u32>,
}

impl Upstreams {
    fn cross_references(&self, id: MediaIdentifier) -> CrossReferences {
        let tmdb_table = self.resolver.tmdb_table();
        let anilist = match id {
            MediaIdentifier::Anilist(anilist) => Some(anilist),
            MediaIdentifier::Tmdb(tmdb) => tmdb_table.inverse(tmdb),
            MediaIdentifier::Mal(mal) => self.resolver.mal_table().inverse(mal),
            MediaIdentifier::Kitsu(kitsu) => self.resolver.canonical_for_kitsu(kitsu),
        };
        let tmdb = match id {
            MediaIdentifier::Tmdb(tmdb) => Some(tmdb),
            _ => anilist.and_then(|a| tmdb_table.forward(a)),
        };
        let kitsu = match id {
            MediaIdentifier::Kitsu(kitsu) => Some(kitsu),
            _ => anilist.and_then(|a| self.known_kitsu(a)),
        };
        CrossReferences {
            anilist,
            tmdb,
            kitsu,
        }
    }

    fn known_kitsu(&self, anilist_id: u32) -> Option<u32> {
        match self.resolver.memoized(anilist_id)? {
            MediaIdentifier::Kitsu(kitsu) => Some(kitsu),
            _ => None,
        }
    }

    async fn fetch_catalog(
        self,
        definition: CatalogDefinition,
        page: u32,
        filters: CatalogFilters,
    ) -> Result<Vec<CatalogItem>> {
        let today = Utc::now().date_naive();
        let (query, variables) = definition.request(page, &filters, today);
        let data: PageData = self.queue.submit_as(&query, variables).await?;

        let items = data.page.media;
        let ids = self.resolver.resolve_many(&items).await;
        debug!(
            catalog = definition.id,
            page,
            items = items.len(),
            "assembled catalog page"
        );
        Ok(ids
            .into_iter()
            .zip(&items)
            .map(|(id, item)| CatalogItem::from_anime(id, item))
            .collect())
    }

    async fn fetch_meta(self, id: MediaIdentifier) -> Result<MetaRecord> {
        let refs = self.cross_references(id);

        if let (Some(details), Some(tmdb_id)) = (&self.details, refs.tmdb) {
            match fetch_tmdb_bundle(details.as_ref(), tmdb_id).await {
                Ok(bundle) => return Ok(MetaRecord::from_tmdb(id, &bundle)),
                Err(err) => warn!(
                    %id,
                    tmdb_id,
                    error = %err,
                    "TMDB detail unavailable; falling back to AniList"
                ),
            }
        }

        let item = self.anilist_detail(id, refs.anilist).await?;
        let kitsu_id = refs.kitsu.or_else(|| self.known_kitsu(item.id));
        let episodes = match kitsu_id {
            Some(kitsu_id) => match self.episodes.episodes(kitsu_id).await {
                Ok(episodes) => episodes,
                Err(err) => {
                    warn!(
                        %id,
                        kitsu_id,
                        error = %err,
                        "episode listing unavailable"
                    );
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        Ok(MetaRecord::from_anilist(id, &item, &episodes))
    }

    async fn anilist_detail(
        &self,
        id: MediaIdentifier,
        anilist_id: Option<u32>,
    ) -> Result<AnimeItem> {
        let variables = match (anilist_id, id) {
            (Some(anilist_id), _) => json!({ "id": anilist_id }),
            (None, MediaIdentifier::Mal(mal_id)) => json!({ "idMal": mal_id }),
            (None, _) => {
                return Err(FetchError::NotFound(format!(
                    "no AniList reference for {id}"
                )));
            }
        };

        let data: MediaData = self
            .queue
            .submit_as(&anilist::media_detail_query(), variables)
            .await?;
        data.media
            .ok_or_else(|| FetchError::NotFound(format!("AniList has no entry for {id}")))
    }
}

async fn fetch_tmdb_bundle(
    details: &dyn SeriesDetailSource,
    tmdb_id: u32,
) -> Result<TmdbBundle> {
    let (series, external_ids, credits) = futures::try_join!(
        details.series(tmdb_id),
        details.external_ids(tmdb_id),
        details.aggregate_credits(tmdb_id),
    )?;

    let seasons = try_join_all(
        series
            .regular_seasons()
            .map(|number| details.season(tmdb_id, number)),
    )
    .await?;

    Ok(TmdbBundle {
        series,
        external_ids,
        credits,
        episodes: seasons.into_iter().flat_map(|s| s.episodes).collect(),
    })
}

pub struct Orchestrator {
    upstreams: Upstreams,
    catalogs: Vec<CatalogDefinition>,
    meta_ttl: Duration,
    catalog_cache: TtlCache<Vec<CatalogItem>>,
    meta_cache: TtlCache<MetaRecord>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("upstreams", &self.upstreams)
            .field(
                "catalogs",
                &self.catalogs.iter().map(|c| c.id).collect::<Vec<_>>(),
            )
            .field("meta_ttl", &self.meta_ttl)
            .field("catalog_cache", &self.catalog_cache)
            .field("meta_cache", &self.meta_cache)
            .finish()
    }
}

impl Orchestrator {
    pub fn new(upstreams: Upstreams, settings: OrchestratorSettings) -> Self {
        info!(
            catalogs = settings.catalogs.len(),
            tmdb = upstreams.details.is_some(),
            "catalog orchestrator ready"
        );
        Self {
            upstreams,
            catalogs: settings.catalogs,
            meta_ttl: settings.meta_ttl,
            catalog_cache: TtlCache::new("catalog"),
            meta_cache: TtlCache::new("meta"),
        }
    }

    pub fn catalogs(&self) -> &[CatalogDefinition] {
        &self.catalogs
    }

    pub fn catalog(&self, catalog_id: &str) -> Option<&CatalogDefinition> {
        self.catalogs.iter().find(|c| c.id == catalog_id)
    }

    pub fn resolver(&self) -> &Arc<IdResolver> {
        &self.upstreams.resolver
    }

    pub fn catalog_cache(&self) -> &TtlCache<Vec<CatalogItem>> {
        &self.catalog_cache
    }

    pub fn meta_cache(&self) -> &TtlCache<MetaRecord> {
        &self.meta_cache
    }

    /// Items of one catalog page, in upstream order. `skip` is the addon
    /// offset token; it is mapped onto the catalog's page size.
    pub async fn catalog_page(
        &self,
        catalog_id: &str,
        filters: &CatalogFilters,
        skip: u32,
    ) -> Vec<CatalogItem> {
        let Some(definition) = self.catalog(catalog_id) else {
            warn!(catalog = catalog_id, "unknown catalog requested");
            return Vec::new();
        };
        if definition.is_search() && filters.get("search").is_none() {
            return Vec::new();
        }

        let page = definition.page_for_skip(skip);
        let key = catalog_cache_key(definition.id, page, filters);
        let upstreams = self.upstreams.clone();
        let (task_definition, task_filters) = (definition.clone(), filters.clone());

        match self
            .catalog_cache
            .get_or_fetch(&key, definition.ttl, move || {
                upstreams.fetch_catalog(task_definition, page, task_filters)
            })
            .await
        {
            Ok(items) => items,
            Err(err) => {
                error!(
                    catalog = definition.id,
                    page,
                    key = %key,
                    error = %err,
                    "catalog page fetch failed"
                );
                Vec::new()
            }
        }
    }

    /// Detail record for an externally-visible identifier such as
    /// `tmdb:1535`. Malformed identifiers and upstream failures yield `None`.
    pub async fn meta(&self, identifier: &str) -> Option<MetaRecord> {
        let id: MediaIdentifier = match identifier.parse() {
            Ok(id) => id,
            Err(err) => {
                warn!(identifier, error = %err, "malformed identifier");
                return None;
            }
        };

        let key = id.meta_cache_key();
        let upstreams = self.upstreams.clone();
        match self
            .meta_cache
            .get_or_fetch(&key, self.meta_ttl, move || upstreams.fetch_meta(id))
            .await
        {
            Ok(meta) => Some(meta),
            Err(err) => {
                error!(%id, error = %err, "meta fetch failed");
                None
            }
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            catalog_entries: self.catalog_cache.len(),
            catalog_pending: self.catalog_cache.pending_len(),
            meta_entries: self.meta_cache.len(),
            meta_pending: self.meta_cache.pending_len(),
        }
    }

    /// Sweep both caches, returning the number of entries removed.
    pub fn evict_expired(&self) -> usize {
        self.catalog_cache.evict_expired() + self.meta_cache.evict_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn seasons_follow_the_broadcast_calendar() {
        assert_eq!(Season::relative_to(date(2024, 1, 10), 0), (Season::Winter, 2024));
        assert_eq!(Season::relative_to(date(2024, 4, 1), 0), (Season::Spring, 2024));
        assert_eq!(Season::relative_to(date(2024, 12, 5), 0), (Season::Winter, 2025));
        assert_eq!(Season::relative_to(date(2024, 10, 19), 1), (Season::Winter, 2025));
        assert_eq!(Season::relative_to(date(2024, 1, 10), -1), (Season::Fall, 2023));
    }

    #[test]
    fn filters_drop_unknown_keys_and_sort_in_the_key() {
        let filters = CatalogFilters::from_pairs([
            ("year", "2023"),
            ("genre", "Action"),
            ("skip", "40"),
            ("format", " "),
        ]);

        assert_eq!(
            catalog_cache_key("trending", 3, &filters),
            "catalog:trending:3:genre=Action&year=2023"
        );
        assert_eq!(
            catalog_cache_key("trending", 1, &CatalogFilters::default()),
            "catalog:trending:1:"
        );
    }

    #[test]
    fn skip_maps_onto_pages() {
        let trending = &CatalogDefinition::defaults()[0];
        assert_eq!(trending.page_for_skip(0), 1);
        assert_eq!(trending.page_for_skip(19), 1);
        assert_eq!(trending.page_for_skip(20), 2);
        assert_eq!(trending.page_for_skip(100), 6);
    }

    #[test]
    fn requests_carry_filters_for_each_template() {
        let defaults = CatalogDefinition::defaults();
        let filters = CatalogFilters::from_pairs([
            ("genre", "Drama"),
            ("year", "2019"),
            ("format", "tv"),
            ("search", "frieren"),
        ]);
        let today = date(2024, 7, 1);

        let (query, vars) = defaults[0].request(2, &filters, today);
        assert!(query.contains("startDate_like"));
        assert_eq!(vars["page"], 2);
        assert_eq!(vars["perPage"], 20);
        assert_eq!(vars["sort"], json!(["TRENDING_DESC"]));
        assert_eq!(vars["genre"], "Drama");
        assert_eq!(vars["format"], "TV");
        assert_eq!(vars["year"], "2019%");

        let upcoming = defaults.iter().find(|c| c.id == "upcoming").unwrap();
        let (_, vars) = upcoming.request(1, &filters, today);
        assert_eq!(vars["season"], "FALL");
        assert_eq!(vars["seasonYear"], 2024);

        let search = defaults.iter().find(|c| c.is_search()).unwrap();
        let (query, vars) = search.request(1, &filters, today);
        assert!(query.contains("search: $search"));
        assert_eq!(vars["search"], "frieren");
    }

    #[test]
    fn default_ttls_match_catalog_volatility() {
        let ttl = |id: &str| {
            CatalogDefinition::defaults()
                .into_iter()
                .find(|c| c.id == id)
                .map(|c| c.ttl.as_secs())
        };
        assert_eq!(ttl("trending"), Some(3600));
        assert_eq!(ttl("popular"), Some(6 * 3600));
        assert_eq!(ttl("top_rated"), Some(12 * 3600));
        assert_eq!(ttl("airing"), Some(3600));
        assert_eq!(ttl("upcoming"), Some(6 * 3600));
        assert_eq!(ttl("search"), Some(1800));
    }
}
