//! Stable cross-referenced identifiers for AniList items.
//!
//! Each item is mapped, in order of preference, to a TMDB id from the Fribb
//! table, a MyAnimeList id from the manami table, a Kitsu id from a live
//! title search, and finally its own AniList id. The first answer for an id
//! is kept for the life of the process, so the identifier a client saw in a
//! catalog keeps working for meta lookups even after the tables change.

use std::{any::type_name_of_val, fmt, sync::Arc};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::identifier::MediaIdentifier;
use crate::offline::{FribbAnimeList, ManamiOfflineDatabase, OfflineDatabase};
use crate::providers::AnimeItem;

/// Live lookup of a title in the search-capable upstream.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TitleSearch: Send + Sync {
    /// `Ok(None)` is a confirmed miss; `Err` says nothing about the title.
    async fn search_title(
        &self,
        title: &str,
    ) -> Result<Option<u32>, ProviderError>;
}

/// What the resolver has learned, in a form that can be written to disk and
/// read back into a fresh resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverState {
    pub memo: Vec<(u32, MediaIdentifier)>,
    pub negative: Vec<u32>,
}

impl ResolverState {
    pub fn is_empty(&self) -> bool {
        self.memo.is_empty() && self.negative.is_empty()
    }
}

pub struct IdResolver {
    tmdb_table: Arc<OfflineDatabase<FribbAnimeList>>,
    mal_table: Arc<OfflineDatabase<ManamiOfflineDatabase>>,
    search: Arc<dyn TitleSearch>,
    memo: DashMap<u32, MediaIdentifier>,
    negative: DashSet<u32>,
    kitsu_to_anilist: DashMap<u32, u32>,
}

impl fmt::Debug for IdResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdResolver")
            .field("tmdb_table", &self.tmdb_table)
            .field("mal_table", &self.mal_table)
            .field("search", &type_name_of_val(self.search.as_ref()))
            .field("memoized", &self.memo.len())
            .field("negative", &self.negative.len())
            .finish()
    }
}

impl IdResolver {
    pub fn new(
        tmdb_table: Arc<OfflineDatabase<FribbAnimeList>>,
        mal_table: Arc<OfflineDatabase<ManamiOfflineDatabase>>,
        search: Arc<dyn TitleSearch>,
    ) -> Self {
        Self {
            tmdb_table,
            mal_table,
            search,
            memo: DashMap::new(),
            negative: DashSet::new(),
            kitsu_to_anilist: DashMap::new(),
        }
    }

    pub fn tmdb_table(&self) -> &Arc<OfflineDatabase<FribbAnimeList>> {
        &self.tmdb_table
    }

    pub fn mal_table(&self) -> &Arc<OfflineDatabase<ManamiOfflineDatabase>> {
        &self.mal_table
    }

    /// Always produces an identifier; upstream trouble only degrades it to
    /// the AniList fallback.
    pub async fn resolve(&self, item: &AnimeItem) -> MediaIdentifier {
        let anilist_id = item.id;
        if let Some(known) = self.memo.get(&anilist_id) {
            return *known;
        }

        if let Some(tmdb_id) = self.tmdb_table.forward(anilist_id) {
            return self.remember(anilist_id, MediaIdentifier::Tmdb(tmdb_id));
        }

        if let Some(mal_id) = self.mal_table.forward(anilist_id) {
            return self.remember(anilist_id, MediaIdentifier::Mal(mal_id));
        }

        let fallback = MediaIdentifier::Anilist(anilist_id);
        if self.negative.contains(&anilist_id) {
            return self.remember(anilist_id, fallback);
        }

        let Some(title) = search_text(item) else {
            return self.remember(anilist_id, fallback);
        };

        match self.search.search_title(title).await {
            Ok(Some(kitsu_id)) => {
                debug!(anilist_id, kitsu_id, "resolved through title search");
                self.kitsu_to_anilist
                    .entry(kitsu_id)
                    .or_insert(anilist_id);
                self.remember(anilist_id, MediaIdentifier::Kitsu(kitsu_id))
            }
            Ok(None) => {
                debug!(anilist_id, title, "title search found nothing");
                self.negative.insert(anilist_id);
                self.remember(anilist_id, fallback)
            }
            Err(err) => {
                warn!(
                    anilist_id,
                    title,
                    error = %err,
                    "title search failed; using fallback identifier for now"
                );
                fallback
            }
        }
    }

    /// Resolve a page of items concurrently, keeping their order.
    pub async fn resolve_many(
        &self,
        items: &[AnimeItem],
    ) -> Vec<MediaIdentifier> {
        join_all(items.iter().map(|item| self.resolve(item))).await
    }

    /// The identifier already on record for `anilist_id`, if any.
    pub fn memoized(&self, anilist_id: u32) -> Option<MediaIdentifier> {
        self.memo.get(&anilist_id).map(|entry| *entry)
    }

    /// AniList id whose title search produced `kitsu_id`.
    pub fn canonical_for_kitsu(&self, kitsu_id: u32) -> Option<u32> {
        self.kitsu_to_anilist.get(&kitsu_id).map(|entry| *entry)
    }

    /// Copy of the memo and negative set.
    pub fn export_state(&self) -> ResolverState {
        let mut memo: Vec<_> = self
            .memo
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();
        memo.sort_unstable_by_key(|(anilist_id, _)| *anilist_id);
        let mut negative: Vec<u32> =
            self.negative.iter().map(|id| *id).collect();
        negative.sort_unstable();
        ResolverState { memo, negative }
    }

    /// Seed the memo, negative set and kitsu reverse map from a saved
    /// state. Identifiers already on record are kept. Returns how many
    /// memo entries were added.
    pub fn import_state(&self, state: ResolverState) -> usize {
        let mut added = 0usize;
        for (anilist_id, resolved) in state.memo {
            if self.memo.contains_key(&anilist_id) {
                continue;
            }
            let kept = self.remember(anilist_id, resolved);
            if let MediaIdentifier::Kitsu(kitsu_id) = kept {
                self.kitsu_to_anilist.entry(kitsu_id).or_insert(anilist_id);
            }
            added += 1;
        }
        for anilist_id in state.negative {
            self.negative.insert(anilist_id);
        }
        added
    }

    pub fn memo_len(&self) -> usize {
        self.memo.len()
    }

    pub fn negative_len(&self) -> usize {
        self.negative.len()
    }

    /// Store `resolved` unless a concurrent call got there first, and return
    /// whichever identifier is now on record.
    fn remember(
        &self,
        anilist_id: u32,
        resolved: MediaIdentifier,
    ) -> MediaIdentifier {
        *self.memo.entry(anilist_id).or_insert(resolved)
    }
}

/// Romaji titles match the search index best.
fn search_text(item: &AnimeItem) -> Option<&str> {
    let title = &item.title;
    title
        .romaji
        .as_deref()
        .or(title.english.as_deref())
        .or(title.native.as_deref())
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offline::{
        IndexTables, OfflineSource, SnapshotDownloader, SnapshotFormat,
    };
    use crate::providers::MediaTitle;
    use crate::error::SnapshotError;
    use std::time::Duration;

    struct NoDownloads;

    #[async_trait]
    impl SnapshotDownloader for NoDownloads {
        async fn download(&self, url: &str) -> Result<Vec<u8>, SnapshotError> {
            Err(SnapshotError::Download(url.to_owned()))
        }
    }

    fn table<S: SnapshotFormat>(pairs: &[(u32, u32)]) -> Arc<OfflineDatabase<S>> {
        let db = OfflineDatabase::<S>::new(
            OfflineSource {
                url: String::new(),
                directory: std::env::temp_dir(),
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

    fn item(id: u32, romaji: &str) -> AnimeItem {
        AnimeItem {
            id,
            title: MediaTitle {
                romaji: Some(romaji.to_owned()),
                ..MediaTitle::default()
            },
            ..AnimeItem::default()
        }
    }

    #[tokio::test]
    async fn offline_table_hit_skips_the_search() {
        let mut search = MockTitleSearch::new();
        search.expect_search_title().never();
        let resolver = IdResolver::new(
            table(&[(16498, 1535)]),
            table(&[(16498, 16498)]),
            Arc::new(search),
        );

        let resolved = resolver.resolve(&item(16498, "Shingeki no Kyojin")).await;
        assert_eq!(resolved.to_string(), "tmdb:1535");
        assert_eq!(resolver.memo_len(), 1);
    }

    #[tokio::test]
    async fn second_table_is_consulted_when_the_first_misses() {
        let mut search = MockTitleSearch::new();
        search.expect_search_title().never();
        let resolver = IdResolver::new(
            table(&[]),
            table(&[(154587, 52991)]),
            Arc::new(search),
        );

        let resolved = resolver.resolve(&item(154587, "Sousou no Frieren")).await;
        assert_eq!(resolved, MediaIdentifier::Mal(52991));
    }

    #[tokio::test]
    async fn live_search_result_survives_a_table_refresh() {
        let mut search = MockTitleSearch::new();
        search
            .expect_search_title()
            .withf(|title| title == "Obscure Show")
            .times(1)
            .returning(|_| Ok(Some(42)));
        let mal_table = table::<ManamiOfflineDatabase>(&[]);
        let resolver =
            IdResolver::new(table(&[]), mal_table.clone(), Arc::new(search));

        let anime = item(99999, "Obscure Show");
        assert_eq!(resolver.resolve(&anime).await.to_string(), "kitsu:42");

        let mut refreshed = IndexTables::new();
        refreshed.insert(99999, 5);
        mal_table.swap_tables(refreshed);

        assert_eq!(resolver.resolve(&anime).await.to_string(), "kitsu:42");
        assert_eq!(resolver.canonical_for_kitsu(42), Some(99999));
    }

    #[tokio::test]
    async fn confirmed_miss_is_never_searched_again() {
        let mut search = MockTitleSearch::new();
        search
            .expect_search_title()
            .times(1)
            .returning(|_| Ok(None));
        let resolver =
            IdResolver::new(table(&[]), table(&[]), Arc::new(search));

        let anime = item(77777, "Nobody Has Heard Of This");
        assert_eq!(resolver.resolve(&anime).await.to_string(), "anilist:77777");
        assert_eq!(resolver.negative_len(), 1);

        // Even with the memo cleared the negative entry short-circuits.
        resolver.memo.clear();
        assert_eq!(resolver.resolve(&anime).await.to_string(), "anilist:77777");
    }

    #[tokio::test]
    async fn search_failure_is_retried_on_the_next_call() {
        let mut search = MockTitleSearch::new();
        let mut seq = mockall::Sequence::new();
        search
            .expect_search_title()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(ProviderError::RateLimited));
        search
            .expect_search_title()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some(7442)));
        let resolver =
            IdResolver::new(table(&[]), table(&[]), Arc::new(search));

        let anime = item(20, "Naruto");
        assert_eq!(resolver.resolve(&anime).await.to_string(), "anilist:20");
        assert_eq!(resolver.memo_len(), 0);
        assert_eq!(resolver.negative_len(), 0);

        assert_eq!(resolver.resolve(&anime).await.to_string(), "kitsu:7442");
    }

    #[tokio::test]
    async fn items_without_any_title_fall_back_without_searching() {
        let mut search = MockTitleSearch::new();
        search.expect_search_title().never();
        let resolver =
            IdResolver::new(table(&[]), table(&[]), Arc::new(search));

        let anime = AnimeItem {
            id: 5,
            ..AnimeItem::default()
        };
        assert_eq!(resolver.resolve(&anime).await, MediaIdentifier::Anilist(5));
    }

    #[tokio::test]
    async fn imported_state_restores_kitsu_reverse_lookups() {
        let mut search = MockTitleSearch::new();
        search
            .expect_search_title()
            .times(2)
            .returning(|title| Ok((title == "Obscure Show").then_some(42)));
        let first = IdResolver::new(table(&[]), table(&[]), Arc::new(search));
        first.resolve(&item(99999, "Obscure Show")).await;
        first.resolve(&item(77777, "Unknown")).await;

        let state = first.export_state();
        assert_eq!(state.negative, [77777]);

        let mut quiet = MockTitleSearch::new();
        quiet.expect_search_title().never();
        let second = IdResolver::new(table(&[]), table(&[]), Arc::new(quiet));
        assert_eq!(second.import_state(state), 2);

        assert_eq!(second.canonical_for_kitsu(42), Some(99999));
        assert_eq!(
            second.resolve(&item(99999, "Obscure Show")).await,
            MediaIdentifier::Kitsu(42)
        );
        second.memo.clear();
        assert_eq!(
            second.resolve(&item(77777, "Unknown")).await,
            MediaIdentifier::Anilist(77777)
        );
    }

    #[tokio::test]
    async fn resolve_many_keeps_upstream_order() {
        let mut search = MockTitleSearch::new();
        search.expect_search_title().returning(|_| Ok(None));
        let resolver = IdResolver::new(
            table(&[(1, 10)]),
            table(&[(2, 20)]),
            Arc::new(search),
        );

        let items = [item(3, "c"), item(1, "a"), item(2, "b")];
        let resolved = resolver.resolve_many(&items).await;
        let rendered: Vec<_> =
            resolved.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, ["anilist:3", "tmdb:10", "mal:20"]);
    }
}
