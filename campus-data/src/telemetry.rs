//! Tracing setup
//!
//! Installs a `tracing` subscriber honoring `RUST_LOG`, defaulting to `info`.
//! Library code only emits structured events; embedding applications that
//! bring their own subscriber simply skip this.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber. Safe to call more than once;
/// later calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
