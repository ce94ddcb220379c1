use tandem_core::PayloadFormat;

/// Runtime-level configuration shared by the dispatch core, the remote
/// request pipeline, and the event tracker.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Unique identifier for this node; becomes `RequestContext::node_id`.
    pub node_id: String,
    /// Payload shape for all traffic. Never negotiated per request.
    pub format: PayloadFormat,
    /// Default timeout for remotely received operations in milliseconds.
    pub default_operation_timeout_ms: u64,
    /// Maximum number of concurrent remote operations before load shedding.
    pub max_concurrent_operations: u32,
    /// How long shutdown waits for fire-and-forget events, in milliseconds.
    pub event_drain_timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            node_id: String::new(),
            format: PayloadFormat::Ordinal,
            default_operation_timeout_ms: 30_000,
            max_concurrent_operations: 1000,
            event_drain_timeout_ms: 30_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_config_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.format, PayloadFormat::Ordinal);
        assert_eq!(config.default_operation_timeout_ms, 30_000);
        assert_eq!(config.max_concurrent_operations, 1000);
        assert_eq!(config.event_drain_timeout_ms, 30_000);
    }
}
