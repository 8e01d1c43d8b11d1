use std::{
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use super::TtlCache;
use crate::error::SnapshotError;
use crate::resolver::{IdResolver, ResolverState};

const SNAPSHOT_FORMAT_VERSION: u32 = 1;
const RESOLVER_KEY: &str = "resolver-state:v1";

/// Root directory of the warm-start snapshot store.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SnapshotCacheRoot(PathBuf);

impl SnapshotCacheRoot {
    pub fn new(path: PathBuf) -> Self {
        Self(path)
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Debug for SnapshotCacheRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SnapshotCacheRoot").field(&self.0).finish()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile<V> {
    version: u32,
    saved_at: DateTime<Utc>,
    entries: Vec<SnapshotEntry<V>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ResolverFile {
    saved_at: DateTime<Utc>,
    state: ResolverState,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotEntry<V> {
    key: String,
    expires_at: DateTime<Utc>,
    value: V,
}

/// A thin typed wrapper over `cacache` holding one warm-start snapshot per
/// cache name.
///
/// Snapshots are an optimization only: anything that fails to read or decode
/// is reported and the cache simply starts cold.
#[derive(Clone, Debug)]
pub struct CacheSnapshotStore {
    root: SnapshotCacheRoot,
}

impl CacheSnapshotStore {
    pub fn new(root: SnapshotCacheRoot) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &SnapshotCacheRoot {
        &self.root
    }

    fn key_for(name: &str) -> String {
        format!("ttl-cache:{name}:v{SNAPSHOT_FORMAT_VERSION}")
    }

    /// Persist every live entry of `cache`, returning how many were written.
    pub async fn save<V, E>(
        &self,
        cache: &TtlCache<V, E>,
    ) -> Result<usize, SnapshotError>
    where
        V: Clone + Send + Sync + Serialize + 'static,
        E: From<JoinError> + Send + Sync + 'static,
    {
        let now = Utc::now();
        let entries: Vec<SnapshotEntry<V>> = cache
            .live_entries()
            .into_iter()
            .filter_map(|(key, value, remaining)| {
                let remaining = chrono::Duration::from_std(remaining).ok()?;
                Some(SnapshotEntry {
                    key,
                    expires_at: now + remaining,
                    value,
                })
            })
            .collect();
        let count = entries.len();

        let file = SnapshotFile {
            version: SNAPSHOT_FORMAT_VERSION,
            saved_at: now,
            entries,
        };
        self.write(&Self::key_for(cache.name()), &file).await?;

        info!(cache = cache.name(), entries = count, "saved cache snapshot");
        Ok(count)
    }

    /// Seed `cache` from its snapshot, skipping entries that expired while
    /// the process was down. Returns how many entries were restored.
    pub async fn restore<V, E>(
        &self,
        cache: &TtlCache<V, E>,
    ) -> Result<usize, SnapshotError>
    where
        V: Clone + Send + Sync + DeserializeOwned + 'static,
        E: From<JoinError> + Send + Sync + 'static,
    {
        let Some(file): Option<SnapshotFile<V>> =
            self.read(&Self::key_for(cache.name())).await?
        else {
            debug!(cache = cache.name(), "no cache snapshot to restore");
            return Ok(0);
        };
        if file.version != SNAPSHOT_FORMAT_VERSION {
            warn!(
                cache = cache.name(),
                found = file.version,
                expected = SNAPSHOT_FORMAT_VERSION,
                "ignoring cache snapshot with unknown format version"
            );
            return Ok(0);
        }

        let now = Utc::now();
        let mut restored = 0usize;
        for entry in file.entries {
            let Ok(remaining) = (entry.expires_at - now).to_std() else {
                continue;
            };
            if remaining == Duration::ZERO {
                continue;
            }
            cache.set(entry.key, entry.value, remaining);
            restored += 1;
        }

        info!(
            cache = cache.name(),
            restored,
            saved_at = %file.saved_at,
            "restored cache snapshot"
        );
        Ok(restored)
    }

    /// Persist the resolver's memo and negative set. Restored catalog pages
    /// list identifiers (notably `kitsu:`) that only the resolver can map
    /// back to AniList.
    pub async fn save_resolver(
        &self,
        resolver: &IdResolver,
    ) -> Result<usize, SnapshotError> {
        let state = resolver.export_state();
        let count = state.memo.len();
        let file = ResolverFile {
            saved_at: Utc::now(),
            state,
        };
        self.write(RESOLVER_KEY, &file).await?;
        info!(memoized = count, "saved resolver state");
        Ok(count)
    }

    /// Seed `resolver` from its saved state. Returns how many memo entries
    /// were added.
    pub async fn restore_resolver(
        &self,
        resolver: &IdResolver,
    ) -> Result<usize, SnapshotError> {
        let Some(file): Option<ResolverFile> = self.read(RESOLVER_KEY).await?
        else {
            debug!("no resolver state to restore");
            return Ok(0);
        };
        let restored = resolver.import_state(file.state);
        info!(restored, saved_at = %file.saved_at, "restored resolver state");
        Ok(restored)
    }

    async fn write<T: Serialize>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), SnapshotError> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| SnapshotError::Parse(e.to_string()))?;
        cacache::write(self.root.as_path(), key, bytes)
            .await
            .map_err(|e| {
                SnapshotError::Io(std::io::Error::other(format!(
                    "cacache write failed: {e}"
                )))
            })?;
        Ok(())
    }

    async fn read<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, SnapshotError> {
        let bytes = match cacache::read(self.root.as_path(), key).await {
            Ok(bytes) => bytes,
            Err(cacache::Error::EntryNotFound(_, _)) => return Ok(None),
            Err(e) => {
                return Err(SnapshotError::Io(std::io::Error::other(format!(
                    "cacache read failed: {e}"
                ))));
            }
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| SnapshotError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;

    #[tokio::test]
    async fn snapshot_round_trips_live_entries_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheSnapshotStore::new(SnapshotCacheRoot::new(
            dir.path().to_path_buf(),
        ));

        let cache: TtlCache<Vec<u32>, FetchError> = TtlCache::new("pages");
        cache.set("live", vec![1, 2, 3], Duration::from_secs(600));
        cache.set("dead", vec![4], Duration::ZERO);

        assert_eq!(store.save(&cache).await.unwrap(), 1);

        let warm: TtlCache<Vec<u32>, FetchError> = TtlCache::new("pages");
        assert_eq!(store.restore(&warm).await.unwrap(), 1);
        assert_eq!(warm.get("live"), Some(vec![1, 2, 3]));
        assert_eq!(warm.get("dead"), None);
    }

    #[tokio::test]
    async fn missing_snapshot_restores_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheSnapshotStore::new(SnapshotCacheRoot::new(
            dir.path().to_path_buf(),
        ));
        let cache: TtlCache<String, FetchError> = TtlCache::new("empty");
        assert_eq!(store.restore(&cache).await.unwrap(), 0);
        assert!(cache.is_empty());
    }
}
