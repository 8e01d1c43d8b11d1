use std::sync::Arc;
use std::time::Instant;

use anicat_core::orchestrator::Orchestrator;

use crate::manifest::Manifest;

/// Shared handler state; cheap to clone per request.
#[derive(Debug, Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub manifest: Arc<Manifest>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, manifest: Manifest) -> Self {
        Self {
            orchestrator,
            manifest: Arc::new(manifest),
            started_at: Instant::now(),
        }
    }
}
