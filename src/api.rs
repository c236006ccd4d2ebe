//! HTTP API
//!
//! Batch intake for each pipeline stage (the broker trigger posts here) and
//! read-only queries over conversation state and the event log.

mod handlers;
mod types;

pub use handlers::create_router;

use crate::runtime::{Stage, StateStore};
use std::collections::HashMap;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn StateStore>,
    /// Stages by route name (`POST /stages/{name}`)
    pub stages: Arc<HashMap<&'static str, Arc<dyn Stage>>>,
}

impl AppState {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            stages: Arc::new(HashMap::new()),
        }
    }

    /// Mount `stage` under its own name
    #[must_use]
    pub fn with_stage(mut self, stage: Arc<dyn Stage>) -> Self {
        Arc::make_mut(&mut self.stages).insert(stage.name(), stage);
        self
    }
}
