//! Engine tuning knobs.

/// Tuning for the mutation engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Items committed per write scope in bulk operations.
    pub bulk_chunk_size: usize,
    /// Largest accepted bulk payload.
    pub bulk_max_items: usize,
    /// Alternatives offered when a slug is taken.
    pub slug_suggestions: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bulk_chunk_size: 50,
            bulk_max_items: 1000,
            slug_suggestions: 5,
        }
    }
}
