use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose { "qdb=debug,qdb_run=debug" } else { "qdb=warn,qdb_run=warn" }
}

/// Installs a stderr subscriber filtered by `RUST_LOG`. Calling it again
/// after a subscriber is installed does nothing.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice() {
        init(false);
        init(true);
        assert!(default_filter(true).contains("qdb=debug"));
    }
}
