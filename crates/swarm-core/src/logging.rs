//! `tracing` subscriber setup.

use tracing_subscriber::EnvFilter;

/// Directives applied when `RUST_LOG` is not set.
pub const DEFAULT_DIRECTIVES: &str = "info,swarm_render=debug,wgpu_core=warn,wgpu_hal=warn,naga=warn";

/// Install a global fmt subscriber.
///
/// `RUST_LOG` takes precedence over [`DEFAULT_DIRECTIVES`]. Calling this twice is harmless,
/// the second call keeps the existing subscriber.
pub fn init() {
    init_with(DEFAULT_DIRECTIVES);
}

/// Install a global fmt subscriber with explicit fallback directives.
pub fn init_with(directives: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));
    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_err()
    {
        tracing::debug!("tracing subscriber already installed");
    }
}
