//! Fakes for the upstream seams used by the orchestrator tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};

use anicat_core::ProviderError;
use anicat_core::offline::{
    FribbAnimeList, IndexTables, ManamiOfflineDatabase, OfflineDatabase,
    OfflineSource, SnapshotDownloader,
};
use anicat_core::orchestrator::{Orchestrator, OrchestratorSettings, Upstreams};
use anicat_core::providers::tmdb::{
    TmdbAggregateCredits, TmdbExternalIds, TmdbSeason, TmdbSeries,
};
use anicat_core::providers::{EpisodeSource, KitsuEpisode, SeriesDetailSource};
use anicat_core::queue::{
    GraphqlRequest, GraphqlTransport, QueryQueue, QueuePolicy,
    TransportResponse,
};
use anicat_core::resolver::{IdResolver, TitleSearch};
use anicat_core::SnapshotError;

/// AniList stand-in. Listing queries are answered from a queue of canned
/// pages (falling back to `default_page`), detail queries from a map keyed
/// by AniList id or MyAnimeList id.
#[derive(Default)]
pub struct FakeAnilist {
    pages: Mutex<VecDeque<TransportResponse>>,
    default_page: Mutex<Option<Value>>,
    details: Mutex<HashMap<String, Value>>,
    requests: Mutex<Vec<GraphqlRequest>>,
    latency: Mutex<Duration>,
}

impl FakeAnilist {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve_page(&self, media: Value) {
        *self.default_page.lock() = Some(media);
    }

    pub fn push_response(&self, response: TransportResponse) {
        self.pages.lock().push_back(response);
    }

    pub fn serve_detail(&self, key: &str, media: Value) {
        self.details.lock().insert(key.to_owned(), media);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    pub fn requests(&self) -> Vec<GraphqlRequest> {
        self.requests.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }
}

pub fn ok(body: Value) -> TransportResponse {
    TransportResponse {
        status: 200,
        body: body.to_string(),
        ..TransportResponse::default()
    }
}

pub fn status(status: u16) -> TransportResponse {
    TransportResponse {
        status,
        body: "{}".into(),
        ..TransportResponse::default()
    }
}

#[async_trait]
impl GraphqlTransport for FakeAnilist {
    async fn post(
        &self,
        request: &GraphqlRequest,
    ) -> Result<TransportResponse, String> {
        self.requests.lock().push(request.clone());
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if request.query.contains("Page(") {
            if let Some(response) = self.pages.lock().pop_front() {
                return Ok(response);
            }
            let media = self.default_page.lock().clone().unwrap_or(json!([]));
            return Ok(ok(json!({
                "data": {
                    "Page": {
                        "pageInfo": { "currentPage": 1, "hasNextPage": false },
                        "media": media
                    }
                }
            })));
        }

        let key = match (
            request.variables.get("id").and_then(Value::as_u64),
            request.variables.get("idMal").and_then(Value::as_u64),
        ) {
            (Some(id), _) => format!("id:{id}"),
            (None, Some(mal)) => format!("mal:{mal}"),
            _ => String::new(),
        };
        let media = self.details.lock().get(&key).cloned();
        Ok(ok(json!({ "data": { "Media": media } })))
    }
}

pub fn anime(id: u32, title: &str) -> Value {
    json!({
        "id": id,
        "idMal": null,
        "title": { "romaji": title, "english": null, "native": null },
        "format": "TV",
        "episodes": 2,
        "genres": ["Action"],
        "coverImage": { "large": format!("https://img.anilist.co/{id}.jpg") }
    })
}

/// Title search answering from a fixed map; unknown titles are misses.
#[derive(Default)]
pub struct FakeSearch {
    hits: HashMap<String, u32>,
    calls: AtomicUsize,
}

impl FakeSearch {
    pub fn with_hits(hits: &[(&str, u32)]) -> Arc<Self> {
        Arc::new(Self {
            hits: hits.iter().map(|(t, id)| (t.to_string(), *id)).collect(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TitleSearch for FakeSearch {
    async fn search_title(
        &self,
        title: &str,
    ) -> Result<Option<u32>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.hits.get(title).copied())
    }
}

/// TMDB stand-in serving one series, or failing every call.
pub struct FakeDetails {
    pub fail: bool,
    calls: AtomicUsize,
}

impl FakeDetails {
    pub fn working() -> Arc<Self> {
        Arc::new(Self {
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(ProviderError::NotFound)
        } else {
            Ok(())
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> T {
    serde_json::from_value(value).expect("fixture should decode")
}

#[async_trait]
impl SeriesDetailSource for FakeDetails {
    async fn series(&self, tmdb_id: u32) -> Result<TmdbSeries, ProviderError> {
        self.enter()?;
        Ok(decode(json!({
            "id": tmdb_id,
            "name": "Attack on Titan",
            "overview": "Humanity fights back.",
            "poster_path": "/poster.jpg",
            "first_air_date": "2013-04-07",
            "genres": [{ "id": 16, "name": "Animation" }],
            "episode_run_time": [24],
            "seasons": [
                { "season_number": 0, "episode_count": 1 },
                { "season_number": 1, "episode_count": 2 },
                { "season_number": 2, "episode_count": 1 }
            ]
        })))
    }

    async fn season(
        &self,
        _tmdb_id: u32,
        season_number: u32,
    ) -> Result<TmdbSeason, ProviderError> {
        self.enter()?;
        let count = if season_number == 1 { 2 } else { 1 };
        let episodes: Vec<Value> = (1..=count)
            .map(|n| {
                json!({
                    "episode_number": n,
                    "season_number": season_number,
                    "name": format!("S{season_number}E{n}"),
                    "air_date": "2013-04-07"
                })
            })
            .collect();
        Ok(decode(json!({
            "season_number": season_number,
            "episodes": episodes
        })))
    }

    async fn external_ids(
        &self,
        _tmdb_id: u32,
    ) -> Result<TmdbExternalIds, ProviderError> {
        self.enter()?;
        Ok(decode(json!({ "imdb_id": "tt2560140" })))
    }

    async fn aggregate_credits(
        &self,
        _tmdb_id: u32,
    ) -> Result<TmdbAggregateCredits, ProviderError> {
        self.enter()?;
        Ok(decode(json!({
            "cast": [{ "name": "Yuki Kaji", "roles": [{ "character": "Eren" }] }]
        })))
    }
}

/// Kitsu stand-in returning `count` numbered episodes for any id.
pub struct FakeEpisodes {
    pub count: u32,
    calls: AtomicUsize,
}

impl FakeEpisodes {
    pub fn new(count: u32) -> Arc<Self> {
        Arc::new(Self {
            count,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EpisodeSource for FakeEpisodes {
    async fn episodes(
        &self,
        kitsu_id: u32,
    ) -> Result<Vec<KitsuEpisode>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((1..=self.count)
            .map(|n| KitsuEpisode {
                id: format!("{kitsu_id}-{n}"),
                number: n,
                season: 1,
                title: Some(format!("Kitsu episode {n}")),
                synopsis: None,
                airdate: None,
                thumbnail: None,
            })
            .collect())
    }
}

struct NoDownloads;

#[async_trait]
impl SnapshotDownloader for NoDownloads {
    async fn download(&self, url: &str) -> Result<Vec<u8>, SnapshotError> {
        Err(SnapshotError::Download(url.to_owned()))
    }
}

pub fn table<S: anicat_core::offline::SnapshotFormat>(
    pairs: &[(u32, u32)],
) -> Arc<OfflineDatabase<S>> {
    let db = OfflineDatabase::<S>::new(
        OfflineSource {
            url: "https://snapshots.invalid/".into(),
            directory: std::env::temp_dir().join("anicat-tests-unused"),
            freshness: Duration::ZERO,
        },
        Arc::new(NoDownloads),
    );
    let mut tables = IndexTables::new();
    for (canonical, secondary) in pairs {
        tables.insert(*canonical, *secondary);
    }
    db.swap_tables(tables);
    Arc::new(db)
}

/// Everything an orchestrator test needs to poke at.
pub struct Harness {
    pub anilist: Arc<FakeAnilist>,
    pub search: Arc<FakeSearch>,
    pub details: Arc<FakeDetails>,
    pub episodes: Arc<FakeEpisodes>,
    pub fribb: Arc<OfflineDatabase<FribbAnimeList>>,
    pub manami: Arc<OfflineDatabase<ManamiOfflineDatabase>>,
    pub orchestrator: Orchestrator,
}

pub struct HarnessBuilder {
    fribb: Vec<(u32, u32)>,
    manami: Vec<(u32, u32)>,
    hits: Vec<(&'static str, u32)>,
    details: Arc<FakeDetails>,
    policy: QueuePolicy,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            fribb: Vec::new(),
            manami: Vec::new(),
            hits: Vec::new(),
            details: FakeDetails::working(),
            policy: QueuePolicy::default(),
        }
    }
}

impl HarnessBuilder {
    pub fn fribb(mut self, pairs: &[(u32, u32)]) -> Self {
        self.fribb = pairs.to_vec();
        self
    }

    pub fn manami(mut self, pairs: &[(u32, u32)]) -> Self {
        self.manami = pairs.to_vec();
        self
    }

    pub fn search_hits(mut self, hits: &[(&'static str, u32)]) -> Self {
        self.hits = hits.to_vec();
        self
    }

    pub fn details(mut self, details: Arc<FakeDetails>) -> Self {
        self.details = details;
        self
    }

    pub fn build(self) -> Harness {
        let anilist = FakeAnilist::new();
        let search = FakeSearch::with_hits(&self.hits);
        let episodes = FakeEpisodes::new(3);
        let fribb = table::<FribbAnimeList>(&self.fribb);
        let manami = table::<ManamiOfflineDatabase>(&self.manami);

        let resolver = Arc::new(IdResolver::new(
            fribb.clone(),
            manami.clone(),
            search.clone(),
        ));
        let orchestrator = Orchestrator::new(
            Upstreams {
                queue: QueryQueue::spawn(anilist.clone(), self.policy),
                resolver,
                details: Some(self.details.clone()),
                episodes: episodes.clone(),
            },
            OrchestratorSettings::default(),
        );

        Harness {
            anilist,
            search,
            details: self.details,
            episodes,
            fribb,
            manami,
            orchestrator,
        }
    }
}
