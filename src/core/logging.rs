//! Logging initialization and utilities

/// Initialize the logging system
///
/// Uses env_logger with default filter level of `info`.
/// Override with RUST_LOG environment variable, e.g.
/// `RUST_LOG=svogi=debug` to get per-frame pipeline statistics.
///
/// # Example
/// ```no_run
/// svogi::core::logging::init();
/// log::info!("SVO pipeline started");
/// ```
pub fn init() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")
    ).init();
}

/// Initialize logging for tests; safe to call more than once.
#[cfg(test)]
pub fn init_test() {
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("debug")
    ).is_test(true).try_init();
}
