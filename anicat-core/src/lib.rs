//! # anicat core
//!
//! Identifier resolution, upstream access and caching for the anicat
//! catalog addon.
//!
//! ## Overview
//!
//! A request for a catalog page or a detail record goes through the
//! [`Orchestrator`](orchestrator::Orchestrator):
//!
//! - **Caching**: [`cache::TtlCache`] answers repeated requests and collapses
//!   concurrent identical misses into one upstream fetch
//! - **AniList access**: every GraphQL call runs through the single worker
//!   behind [`queue::QueryQueue`], which owns the retry and quota policy
//! - **Offline tables**: [`offline::OfflineDatabase`] holds the Fribb
//!   (AniList to TMDB) and manami (AniList to MyAnimeList) cross references
//! - **Identifiers**: [`resolver::IdResolver`] turns each AniList item into a
//!   stable `prefix:id` identifier
//! - **Detail sources**: TMDB and Kitsu clients in [`providers`]
//!
//! ## Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use anicat_core::{
//!     orchestrator::{CatalogFilters, Orchestrator, OrchestratorSettings, Upstreams},
//!     providers::{AnilistTransport, KitsuProvider, anilist::ANILIST_ENDPOINT},
//!     queue::{QueryQueue, QueuePolicy},
//!     resolver::IdResolver,
//! };
//! # use anicat_core::offline::*;
//!
//! # async fn run(
//! #     fribb: Arc<OfflineDatabase<FribbAnimeList>>,
//! #     manami: Arc<OfflineDatabase<ManamiOfflineDatabase>>,
//! # ) {
//! let http = reqwest::Client::new();
//! let queue = QueryQueue::spawn(
//!     Arc::new(AnilistTransport::new(http.clone(), ANILIST_ENDPOINT)),
//!     QueuePolicy::default(),
//! );
//! let kitsu = Arc::new(KitsuProvider::new(http));
//! let resolver = Arc::new(IdResolver::new(fribb, manami, kitsu.clone()));
//!
//! let orchestrator = Orchestrator::new(
//!     Upstreams {
//!         queue,
//!         resolver,
//!         details: None,
//!         episodes: kitsu,
//!     },
//!     OrchestratorSettings::default(),
//! );
//!
//! let page = orchestrator
//!     .catalog_page("trending", &CatalogFilters::default(), 0)
//!     .await;
//! println!("{} trending items", page.len());
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

/// TTL cache with in-flight coalescing and an on-disk warm-start snapshot
pub mod cache;

/// Error types shared across the crate
pub mod error;

/// Externally-visible `prefix:id` identifiers
pub mod identifier;

/// Offline cross-reference tables built from bulk snapshots
pub mod offline;

/// Catalog and meta assembly on top of the cache, queue and resolver
pub mod orchestrator;

/// AniList, TMDB and Kitsu clients
pub mod providers;

/// Single-flight, rate-limit aware AniList query queue
pub mod queue;

/// AniList item to cross-referenced identifier resolution
pub mod resolver;

/// Catalog and meta records returned to addon clients
pub mod types;

pub use error::{FetchError, ProviderError, QueueError, Result, SnapshotError};
pub use identifier::MediaIdentifier;
