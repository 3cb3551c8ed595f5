//! Engine configuration.

/// Configuration injected at orchestrator construction.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Page size applied when a list request supplies no cursor or
    /// offset arguments.
    pub default_page_size: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_page_size: 50,
        }
    }
}
