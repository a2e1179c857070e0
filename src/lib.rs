// esops - A resilient Elasticsearch client core for Rust
//
// This library bundles the client (failover, bulk batching, scroll streaming)
// with the logging setup used by applications embedding it.

// Re-export client functionality
pub use esops_client::*;

// Re-export logging setup
pub use esops_log;

/// Install the global tracing subscriber configured from `ESOPS_LOG_*`.
///
/// Returns `false` when a subscriber was already installed.
pub fn init_logging() -> bool {
    esops_log::init()
}

// Prelude for common imports
pub mod prelude {
    pub use esops_client::prelude::*;

    pub use crate::init_logging;
}
