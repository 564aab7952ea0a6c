use std::time::Duration;

/// Tuning knobs for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on per-line workers running at once within one batch.
    pub max_concurrency: usize,
    /// Expiry of a cached cart view.
    pub cache_ttl: Duration,
}

impl EngineConfig {
    pub fn new(max_concurrency: usize, cache_ttl: Duration) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            cache_ttl,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 16,
            cache_ttl: Duration::from_secs(600),
        }
    }
}
