//! # anicat server
//!
//! Serves the anicat addon over HTTP and pre-renders it to static files.
//!
//! - **Routes**: `/manifest.json`, `/catalog/...`, `/meta/...` and `/health`
//!   on top of the core [`Orchestrator`](anicat_core::orchestrator::Orchestrator)
//! - **Startup**: [`startup::Services`] turns a loaded config into clients,
//!   offline tables, a warm cache and the background maintenance tasks
//! - **Static build**: [`static_build::StaticBuilder`] writes the same JSON
//!   documents to disk using the route layout

pub mod app_state;
pub mod handlers;
pub mod manifest;
pub mod routes;
pub mod startup;
pub mod static_build;

pub use app_state::AppState;
pub use routes::create_app;
