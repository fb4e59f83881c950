/// Initialize the tracing subscriber for rowflow jobs.
///
/// Reads `RUST_LOG` from the environment (default level is `info`) and
/// attempts to install a global subscriber. Safe to call more than once;
/// later calls are ignored.
pub fn init() {
    init_with_default("info");
}

/// Like [`init`], with a caller-chosen filter when `RUST_LOG` is unset.
pub fn init_with_default(default: &str) {
    let env = std::env::var("RUST_LOG").unwrap_or_else(|_| default.to_string());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(env))
        .with_target(false)
        .try_init();
}
