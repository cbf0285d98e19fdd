#![allow(dead_code)]

pub mod assertions;
pub mod fakes;

use tracing_subscriber::EnvFilter;

/// Routes the log output of the library into the test output.
///
/// The level is taken from `RUST_LOG`.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
