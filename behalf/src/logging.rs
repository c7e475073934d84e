//! Logging setup for the binary.

use env_logger::Env;

pub use log::{debug, error, info, trace, warn};

/// Initialize `env_logger`: `warn` by default, `info` when verbose.
/// `RUST_LOG` overrides either.
pub fn init(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default))
        .format_timestamp_millis()
        .init();
}
