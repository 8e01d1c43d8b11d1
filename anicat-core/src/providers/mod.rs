//! Upstream clients and their parsed response types.
//!
//! The orchestrator talks to TMDB and Kitsu through [`SeriesDetailSource`]
//! and [`EpisodeSource`], so either can be swapped for a fake in tests or
//! left out when it is not configured.

pub mod anilist;
pub mod kitsu;
pub mod tmdb;

pub use anilist::{AnilistTransport, AnimeItem, MediaTitle};
pub use kitsu::{KitsuEpisode, KitsuProvider};
pub use tmdb::TmdbApiProvider;

use async_trait::async_trait;

use crate::error::ProviderError;
use tmdb::{TmdbAggregateCredits, TmdbExternalIds, TmdbSeason, TmdbSeries};

/// Series detail endpoints keyed by TMDB id.
#[async_trait]
pub trait SeriesDetailSource: Send + Sync {
    async fn series(&self, tmdb_id: u32) -> Result<TmdbSeries, ProviderError>;

    async fn season(
        &self,
        tmdb_id: u32,
        season_number: u32,
    ) -> Result<TmdbSeason, ProviderError>;

    async fn external_ids(
        &self,
        tmdb_id: u32,
    ) -> Result<TmdbExternalIds, ProviderError>;

    async fn aggregate_credits(
        &self,
        tmdb_id: u32,
    ) -> Result<TmdbAggregateCredits, ProviderError>;
}

/// Episode listings keyed by Kitsu id.
#[async_trait]
pub trait EpisodeSource: Send + Sync {
    async fn episodes(
        &self,
        kitsu_id: u32,
    ) -> Result<Vec<KitsuEpisode>, ProviderError>;
}
