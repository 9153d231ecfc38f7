use crate::validation::pipeline::ValidationPipeline;
use prometheus::Registry;
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ValidationPipeline>,
    pub started_at: Instant,
    pub registry: Registry,
}

impl AppState {
    pub fn new(pipeline: ValidationPipeline, registry: Registry) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            started_at: Instant::now(),
            registry,
        }
    }
}
