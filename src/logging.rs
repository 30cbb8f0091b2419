//! Tracing setup.
//!
//! Logs go to stderr so command output on stdout stays parseable.
//! `RUST_LOG` controls filtering and defaults to `info`; `--verbose` on the
//! CLI raises the default to `debug`.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    // A second init (e.g. from tests) is not an error.
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .try_init();
}
