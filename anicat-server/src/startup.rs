//! Wiring from a loaded [`Config`] to a running orchestrator.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use anicat_config::Config;
use anicat_core::{
    SnapshotError,
    cache::{CacheSnapshotStore, SnapshotCacheRoot},
    offline::{
        FribbAnimeList, HttpDownloader, ManamiOfflineDatabase, OfflineDatabase,
        OfflineSource, SnapshotDownloader, SnapshotFormat,
    },
    orchestrator::{
        CatalogDefinition, Orchestrator, OrchestratorSettings, Upstreams,
    },
    providers::{
        AnilistTransport, KitsuProvider, SeriesDetailSource, TmdbApiProvider,
    },
    queue::{QueryQueue, QueuePolicy},
    resolver::IdResolver,
};

const USER_AGENT: &str = concat!("anicat/", env!("CARGO_PKG_VERSION"));
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything the server and the static build share.
#[derive(Debug)]
pub struct Services {
    pub orchestrator: Arc<Orchestrator>,
    pub fribb: Arc<OfflineDatabase<FribbAnimeList>>,
    pub manami: Arc<OfflineDatabase<ManamiOfflineDatabase>>,
    snapshots: Option<CacheSnapshotStore>,
}

impl Services {
    /// Build clients, load both offline tables and restore the cache
    /// snapshot. Missing tables and snapshots only degrade resolution.
    pub async fn bootstrap(config: &Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        let downloader: Arc<dyn SnapshotDownloader> =
            Arc::new(HttpDownloader::new(http.clone()));
        let fribb = Arc::new(OfflineDatabase::<FribbAnimeList>::new(
            OfflineSource {
                url: config.offline.fribb_url.clone(),
                directory: config.offline_dir().to_path_buf(),
                freshness: config.offline.freshness,
            },
            downloader.clone(),
        ));
        let manami = Arc::new(OfflineDatabase::<ManamiOfflineDatabase>::new(
            OfflineSource {
                url: config.offline.manami_url.clone(),
                directory: config.offline_dir().to_path_buf(),
                freshness: config.offline.freshness,
            },
            downloader,
        ));
        let (fribb_loaded, manami_loaded) =
            tokio::join!(fribb.load(), manami.load());
        report_load(&fribb, fribb_loaded);
        report_load(&manami, manami_loaded);

        let queue = QueryQueue::spawn(
            Arc::new(AnilistTransport::new(
                http.clone(),
                config.anilist.endpoint.clone(),
            )),
            QueuePolicy {
                max_attempts: config.anilist.max_attempts,
                rate_limit_floor: config.anilist.rate_limit_floor,
                low_water_mark: config.anilist.low_water_mark,
                ..QueuePolicy::default()
            },
        );

        let kitsu = Arc::new(KitsuProvider::with_base_url(
            http.clone(),
            config.kitsu.base_url.clone(),
        ));
        let details: Option<Arc<dyn SeriesDetailSource>> =
            match config.tmdb.api_key.as_deref() {
                Some(key) if config.tmdb.is_enabled() => {
                    Some(Arc::new(TmdbApiProvider::with_base_url(
                        http,
                        config.tmdb.base_url.clone(),
                        key,
                        config.tmdb.language.clone(),
                    )))
                }
                _ => None,
            };

        let resolver = Arc::new(IdResolver::new(
            fribb.clone(),
            manami.clone(),
            kitsu.clone(),
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            Upstreams {
                queue,
                resolver,
                details,
                episodes: kitsu,
            },
            OrchestratorSettings {
                catalogs: CatalogDefinition::defaults(),
                meta_ttl: config.cache.meta_ttl,
            },
        ));

        let snapshots = config.cache.persist.then(|| {
            CacheSnapshotStore::new(SnapshotCacheRoot::new(
                config.snapshot_dir().to_path_buf(),
            ))
        });

        let services = Self {
            orchestrator,
            fribb,
            manami,
            snapshots,
        };
        services.restore_snapshots().await;
        Ok(services)
    }

    /// Periodic table refreshes and cache sweeps.
    pub fn spawn_maintenance(&self, config: &Config) -> Vec<JoinHandle<()>> {
        vec![
            self.fribb.spawn_refresh(config.offline.fribb_refresh),
            self.manami.spawn_refresh(config.offline.manami_refresh),
            self.orchestrator
                .catalog_cache()
                .spawn_sweeper(config.cache.sweep_interval),
            self.orchestrator
                .meta_cache()
                .spawn_sweeper(config.cache.sweep_interval),
        ]
    }

    async fn restore_snapshots(&self) {
        let Some(store) = &self.snapshots else {
            return;
        };
        let resolver =
            store.restore_resolver(self.orchestrator.resolver()).await;
        let catalog = store.restore(self.orchestrator.catalog_cache()).await;
        let meta = store.restore(self.orchestrator.meta_cache()).await;
        for (name, result) in
            [("resolver", resolver), ("catalog", catalog), ("meta", meta)]
        {
            match result {
                Ok(0) => {}
                Ok(restored) => {
                    info!(cache = name, restored, "warm-started cache")
                }
                Err(err) => {
                    warn!(cache = name, error = %err, "ignoring unreadable cache snapshot")
                }
            }
        }
    }

    /// Write the resolver state and both caches to disk. Failures are
    /// logged; nothing depends on the snapshot existing.
    pub async fn persist_snapshots(&self) {
        let Some(store) = &self.snapshots else {
            return;
        };
        if let Err(err) = store.save_resolver(self.orchestrator.resolver()).await {
            warn!(cache = "resolver", error = %err, "failed to save resolver state");
        }
        if let Err(err) = store.save(self.orchestrator.catalog_cache()).await {
            warn!(cache = "catalog", error = %err, "failed to save cache snapshot");
        }
        if let Err(err) = store.save(self.orchestrator.meta_cache()).await {
            warn!(cache = "meta", error = %err, "failed to save cache snapshot");
        }
    }
}

fn report_load<S: SnapshotFormat>(
    db: &OfflineDatabase<S>,
    result: Result<usize, SnapshotError>,
) {
    match result {
        Ok(entries) => info!(table = db.name(), entries, "offline table loaded"),
        Err(err) => warn!(
            table = db.name(),
            error = %err,
            "offline table unavailable; identifiers fall back to search"
        ),
    }
}
