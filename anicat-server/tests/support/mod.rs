//! In-process upstream fakes for driving the router and the static build.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use anicat_core::offline::{
    FribbAnimeList, IndexTables, ManamiOfflineDatabase, OfflineDatabase,
    OfflineSource, SnapshotDownloader,
};
use anicat_core::orchestrator::{Orchestrator, OrchestratorSettings, Upstreams};
use anicat_core::providers::{EpisodeSource, KitsuEpisode};
use anicat_core::queue::{
    GraphqlRequest, GraphqlTransport, QueryQueue, QueuePolicy, TransportResponse,
};
use anicat_core::resolver::{IdResolver, TitleSearch};
use anicat_core::{ProviderError, SnapshotError};
use anicat_server::{AppState, manifest::Manifest};

/// Serves `titles` as every listing page and answers detail queries for
/// any listed id.
pub struct FakeAnilist {
    titles: Vec<(u32, &'static str)>,
    calls: AtomicUsize,
}

impl FakeAnilist {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn media(id: u32, title: &str) -> Value {
        json!({
            "id": id,
            "title": { "romaji": title },
            "format": "TV",
            "episodes": 1,
            "genres": ["Drama"]
        })
    }
}

fn ok(body: Value) -> TransportResponse {
    TransportResponse {
        status: 200,
        body: body.to_string(),
        ..TransportResponse::default()
    }
}

#[async_trait]
impl GraphqlTransport for FakeAnilist {
    async fn post(
        &self,
        request: &GraphqlRequest,
    ) -> Result<TransportResponse, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if request.query.contains("Page(") {
            let page = request.variables["page"].as_u64().unwrap_or(1);
            let media: Vec<Value> = if page == 1 {
                self.titles
                    .iter()
                    .map(|(id, title)| Self::media(*id, title))
                    .collect()
            } else {
                Vec::new()
            };
            return Ok(ok(json!({
                "data": { "Page": { "pageInfo": { "hasNextPage": false }, "media": media } }
            })));
        }

        let id = request.variables["id"].as_u64().unwrap_or_default() as u32;
        let media = self
            .titles
            .iter()
            .find(|(candidate, _)| *candidate == id)
            .map(|(id, title)| Self::media(*id, title));
        Ok(ok(json!({ "data": { "Media": media } })))
    }
}

struct NoSearch;

#[async_trait]
impl TitleSearch for NoSearch {
    async fn search_title(
        &self,
        _title: &str,
    ) -> Result<Option<u32>, ProviderError> {
        Ok(None)
    }
}

struct NoEpisodes;

#[async_trait]
impl EpisodeSource for NoEpisodes {
    async fn episodes(
        &self,
        _kitsu_id: u32,
    ) -> Result<Vec<KitsuEpisode>, ProviderError> {
        Ok(Vec::new())
    }
}

struct NoDownloads;

#[async_trait]
impl SnapshotDownloader for NoDownloads {
    async fn download(&self, url: &str) -> Result<Vec<u8>, SnapshotError> {
        Err(SnapshotError::Download(url.to_owned()))
    }
}

fn table<S: anicat_core::offline::SnapshotFormat>(
    pairs: &[(u32, u32)],
) -> Arc<OfflineDatabase<S>> {
    let db = OfflineDatabase::<S>::new(
        OfflineSource {
            url: "https://snapshots.invalid/".into(),
            directory: std::env::temp_dir().join("anicat-server-tests-unused"),
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

pub struct TestApp {
    pub anilist: Arc<FakeAnilist>,
    pub orchestrator: Arc<Orchestrator>,
}

impl TestApp {
    /// `titles` are listed on page one of every catalog; `fribb` maps some
    /// of them to TMDB ids.
    pub fn new(titles: &[(u32, &'static str)], fribb: &[(u32, u32)]) -> Self {
        let anilist = Arc::new(FakeAnilist {
            titles: titles.to_vec(),
            calls: AtomicUsize::new(0),
        });
        let resolver = Arc::new(IdResolver::new(
            table::<FribbAnimeList>(fribb),
            table::<ManamiOfflineDatabase>(&[]),
            Arc::new(NoSearch),
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            Upstreams {
                queue: QueryQueue::spawn(anilist.clone(), QueuePolicy::default()),
                resolver,
                details: None,
                episodes: Arc::new(NoEpisodes),
            },
            OrchestratorSettings::default(),
        ));
        Self {
            anilist,
            orchestrator,
        }
    }

    pub fn manifest(&self) -> Manifest {
        Manifest::new(self.orchestrator.catalogs(), None)
    }

    pub fn state(&self) -> AppState {
        AppState::new(self.orchestrator.clone(), self.manifest())
    }
}
