//! Offline cross-reference tables seeded from bulk snapshots.
//!
//! Each [`OfflineDatabase`] owns one snapshot source. Tables are built into
//! fresh maps and swapped in whole, so lookups never observe a table that is
//! halfway through a rebuild.

pub mod fribb;
pub mod manami;
pub mod tables;

pub use fribb::{FRIBB_ANIME_LIST_URL, FribbAnimeList};
pub use manami::{MANAMI_OFFLINE_DATABASE_URL, ManamiOfflineDatabase};
pub use tables::{IndexTables, ParsedSnapshot};

use std::{
    any::type_name_of_val,
    fmt,
    marker::PhantomData,
    path::PathBuf,
    sync::Arc,
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::SnapshotError;

/// Shortest refresh period; `tokio::time::interval` rejects zero.
const MIN_PERIOD: Duration = Duration::from_secs(1);

/// A snapshot file layout that can be turned into [`IndexTables`].
pub trait SnapshotFormat: Send + Sync + 'static {
    /// Short name used in logs and errors.
    const NAME: &'static str;
    /// File name of the persisted copy inside the snapshot directory.
    const FILE_NAME: &'static str;

    /// Build both directions in one pass. Individual bad entries are
    /// counted and skipped; only an unreadable document is an error.
    fn parse(bytes: &[u8]) -> Result<ParsedSnapshot, SnapshotError>;
}

/// Fetches the authoritative copy of a snapshot.
#[async_trait]
pub trait SnapshotDownloader: Send + Sync {
    async fn download(&self, url: &str) -> Result<Vec<u8>, SnapshotError>;
}

#[derive(Debug, Clone)]
pub struct HttpDownloader {
    http: reqwest::Client,
}

impl HttpDownloader {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl SnapshotDownloader for HttpDownloader {
    async fn download(&self, url: &str) -> Result<Vec<u8>, SnapshotError> {
        let response = self
            .http
            .get(url)
            .timeout(Duration::from_secs(300))
            .send()
            .await
            .map_err(|e| SnapshotError::Download(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SnapshotError::Download(format!(
                "{url} returned status {status}"
            )));
        }

        response
            .bytes()
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(|e| SnapshotError::Download(e.to_string()))
    }
}

/// Where a snapshot comes from and how long a local copy stays usable.
#[derive(Debug, Clone)]
pub struct OfflineSource {
    pub url: String,
    pub directory: PathBuf,
    /// A local copy younger than this is used without downloading.
    pub freshness: Duration,
}

/// One cross-reference table plus its snapshot lifecycle.
pub struct OfflineDatabase<S: SnapshotFormat> {
    source: OfflineSource,
    downloader: Arc<dyn SnapshotDownloader>,
    tables: RwLock<Arc<IndexTables>>,
    loaded_at: RwLock<Option<DateTime<Utc>>>,
    _format: PhantomData<fn() -> S>,
}

impl<S: SnapshotFormat> fmt::Debug for OfflineDatabase<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OfflineDatabase")
            .field("name", &S::NAME)
            .field("source", &self.source)
            .field("downloader", &type_name_of_val(self.downloader.as_ref()))
            .field("entries", &self.len())
            .field("loaded_at", &*self.loaded_at.read())
            .finish()
    }
}

impl<S: SnapshotFormat> OfflineDatabase<S> {
    /// An empty table; lookups miss until [`OfflineDatabase::load`] succeeds.
    pub fn new(
        source: OfflineSource,
        downloader: Arc<dyn SnapshotDownloader>,
    ) -> Self {
        Self {
            source,
            downloader,
            tables: RwLock::new(Arc::new(IndexTables::new())),
            loaded_at: RwLock::new(None),
            _format: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        S::NAME
    }

    pub fn local_path(&self) -> PathBuf {
        self.source.directory.join(S::FILE_NAME)
    }

    pub fn forward(&self, canonical: u32) -> Option<u32> {
        self.tables.read().forward(canonical)
    }

    pub fn inverse(&self, secondary: u32) -> Option<u32> {
        self.tables.read().inverse(secondary)
    }

    pub fn len(&self) -> usize {
        self.tables.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        *self.loaded_at.read()
    }

    /// Startup load: prefer a fresh local copy, otherwise download.
    ///
    /// A stale local copy is still used when the download fails. With no
    /// usable copy at all the table stays empty and
    /// [`SnapshotError::Unavailable`] is returned.
    pub async fn load(&self) -> Result<usize, SnapshotError> {
        let path = self.local_path();
        let local = self.read_local().await;

        if let Some((bytes, age)) = &local {
            if *age <= self.source.freshness {
                match self.install(bytes.clone()).await {
                    Ok(count) => {
                        info!(
                            table = S::NAME,
                            path = %path.display(),
                            age_secs = age.as_secs(),
                            entries = count,
                            "loaded offline table from local snapshot"
                        );
                        return Ok(count);
                    }
                    Err(err) => warn!(
                        table = S::NAME,
                        error = %err,
                        "local snapshot unreadable; downloading a fresh copy"
                    ),
                }
            } else {
                debug!(
                    table = S::NAME,
                    age_secs = age.as_secs(),
                    "local snapshot is stale"
                );
            }
        }

        match self.refresh().await {
            Ok(count) => Ok(count),
            Err(err) => {
                if let Some((bytes, age)) = local {
                    warn!(
                        table = S::NAME,
                        error = %err,
                        age_secs = age.as_secs(),
                        "snapshot download failed; falling back to stale local copy"
                    );
                    if let Ok(count) = self.install(bytes).await {
                        return Ok(count);
                    }
                }
                Err(SnapshotError::Unavailable {
                    name: S::NAME,
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Download, persist and swap in a new table. The current table is kept
    /// when any step fails.
    pub async fn refresh(&self) -> Result<usize, SnapshotError> {
        let bytes = self.downloader.download(&self.source.url).await?;

        let path = self.local_path();
        if let Err(err) = persist(&path, &bytes).await {
            warn!(
                table = S::NAME,
                path = %path.display(),
                error = %err,
                "failed to persist downloaded snapshot"
            );
        }

        let count = self.install(bytes).await?;
        info!(table = S::NAME, entries = count, "refreshed offline table");
        Ok(count)
    }

    /// Call [`OfflineDatabase::refresh`] every `every`, logging failures.
    pub fn spawn_refresh(
        self: &Arc<Self>,
        every: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let db = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every.max(MIN_PERIOD));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(err) = db.refresh().await {
                    warn!(
                        table = S::NAME,
                        error = %err,
                        "periodic snapshot refresh failed; keeping current table"
                    );
                }
            }
        })
    }

    async fn read_local(&self) -> Option<(Vec<u8>, Duration)> {
        let path = self.local_path();
        let metadata = tokio::fs::metadata(&path).await.ok()?;
        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .unwrap_or(Duration::ZERO);
        let bytes = tokio::fs::read(&path).await.ok()?;
        Some((bytes, age))
    }

    async fn install(&self, bytes: Vec<u8>) -> Result<usize, SnapshotError> {
        let parsed = tokio::task::spawn_blocking(move || S::parse(&bytes))
            .await
            .map_err(|e| SnapshotError::Parse(e.to_string()))??;

        if parsed.malformed > 0 || parsed.duplicates > 0 || parsed.excluded > 0
        {
            debug!(
                table = S::NAME,
                malformed = parsed.malformed,
                incomplete = parsed.incomplete,
                excluded = parsed.excluded,
                duplicates = parsed.duplicates,
                "skipped snapshot entries"
            );
        }

        Ok(self.swap_tables(parsed.tables))
    }

    /// Replace the whole table at once, returning its entry count.
    pub fn swap_tables(&self, tables: IndexTables) -> usize {
        let count = tables.len();
        *self.tables.write() = Arc::new(tables);
        *self.loaded_at.write() = Some(Utc::now());
        count
    }
}

async fn persist(path: &std::path::Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.partial");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeDownloader {
        body: Option<&'static [u8]>,
        calls: AtomicUsize,
    }

    impl FakeDownloader {
        fn serving(body: &'static [u8]) -> Arc<Self> {
            Arc::new(Self {
                body: Some(body),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                body: None,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SnapshotDownloader for FakeDownloader {
        async fn download(&self, url: &str) -> Result<Vec<u8>, SnapshotError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.body
                .map(<[u8]>::to_vec)
                .ok_or_else(|| SnapshotError::Download(format!("{url} offline")))
        }
    }

    fn source(dir: &tempfile::TempDir, freshness: Duration) -> OfflineSource {
        OfflineSource {
            url: "https://snapshots.invalid/anime-list-full.json".into(),
            directory: dir.path().to_path_buf(),
            freshness,
        }
    }

    const LOCAL: &[u8] = br#"[{ "anilist_id": 16498, "themoviedb_id": 1535 }]"#;
    const REMOTE: &[u8] = br#"[
        { "anilist_id": 16498, "themoviedb_id": 1535 },
        { "anilist_id": 101922, "themoviedb_id": 85937 }
    ]"#;

    #[tokio::test]
    async fn fresh_local_snapshot_skips_the_download() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(FribbAnimeList::FILE_NAME), LOCAL)
            .unwrap();
        let downloader = FakeDownloader::serving(REMOTE);
        let db = OfflineDatabase::<FribbAnimeList>::new(
            source(&dir, Duration::from_secs(3600)),
            downloader.clone(),
        );

        assert_eq!(db.load().await.unwrap(), 1);
        assert_eq!(downloader.calls.load(Ordering::SeqCst), 0);
        assert_eq!(db.forward(16498), Some(1535));
        assert!(db.loaded_at().is_some());
    }

    #[tokio::test]
    async fn stale_local_snapshot_is_replaced_by_a_download() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(FribbAnimeList::FILE_NAME), LOCAL)
            .unwrap();
        let downloader = FakeDownloader::serving(REMOTE);
        let db = OfflineDatabase::<FribbAnimeList>::new(
            source(&dir, Duration::ZERO),
            downloader.clone(),
        );

        // Any mtime in the past is older than a zero freshness window.
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(db.load().await.unwrap(), 2);
        assert_eq!(downloader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(db.inverse(85937), Some(101922));

        let persisted =
            std::fs::read(dir.path().join(FribbAnimeList::FILE_NAME)).unwrap();
        assert_eq!(persisted, REMOTE);
    }

    #[tokio::test]
    async fn stale_local_snapshot_is_used_when_download_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(FribbAnimeList::FILE_NAME), LOCAL)
            .unwrap();
        let db = OfflineDatabase::<FribbAnimeList>::new(
            source(&dir, Duration::ZERO),
            FakeDownloader::failing(),
        );

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(db.load().await.unwrap(), 1);
        assert_eq!(db.forward(16498), Some(1535));
    }

    #[tokio::test]
    async fn no_snapshot_at_all_leaves_the_table_empty() {
        let dir = tempfile::tempdir().unwrap();
        let db = OfflineDatabase::<FribbAnimeList>::new(
            source(&dir, Duration::from_secs(3600)),
            FakeDownloader::failing(),
        );

        let err = db.load().await.unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::Unavailable {
                name: "fribb-anime-list",
                ..
            }
        ));
        assert!(db.is_empty());
        assert_eq!(db.forward(16498), None);
        assert!(db.loaded_at().is_none());
    }

    #[tokio::test]
    async fn failed_refresh_keeps_the_current_table() {
        let dir = tempfile::tempdir().unwrap();
        let db = OfflineDatabase::<FribbAnimeList>::new(
            source(&dir, Duration::from_secs(3600)),
            FakeDownloader::failing(),
        );
        let mut tables = IndexTables::new();
        tables.insert(20, 46260);
        db.swap_tables(tables);

        assert!(db.refresh().await.is_err());
        assert_eq!(db.forward(20), Some(46260));
    }

    #[tokio::test]
    async fn readers_keep_their_table_across_a_swap() {
        let dir = tempfile::tempdir().unwrap();
        let db = OfflineDatabase::<FribbAnimeList>::new(
            source(&dir, Duration::from_secs(3600)),
            FakeDownloader::serving(REMOTE),
        );
        let mut tables = IndexTables::new();
        tables.insert(1, 2);
        db.swap_tables(tables);
        let before = db.tables.read().clone();

        db.refresh().await.unwrap();

        assert_eq!(before.forward(1), Some(2));
        assert_eq!(db.forward(1), None);
        assert_eq!(db.forward(101922), Some(85937));
    }
}
