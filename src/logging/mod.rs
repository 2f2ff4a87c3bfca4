use tracing::warn;

/// Initialize the global subscriber from `LOG_LEVEL` and `LOG_FORMAT`.
///
/// `RUST_LOG` directives still apply on top for other crates.
pub fn init() {
    let level = std::env::var("LOG_LEVEL").unwrap_or_default();
    let (directive, unknown_level) = match level.to_lowercase().as_str() {
        "debug" => ("passhook=debug", false),
        "" | "info" => ("passhook=info", false),
        "warn" => ("passhook=warn", false),
        "error" => ("passhook=error", false),
        _ => ("passhook=info", true),
    };

    let format = std::env::var("LOG_FORMAT").unwrap_or_default();
    let (json, unknown_format) = match format.to_lowercase().as_str() {
        "" | "text" => (false, false),
        "json" => (true, false),
        _ => (false, true),
    };

    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(directive.parse().unwrap());

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    if unknown_format {
        warn!("unknown log format '{}', using text", format);
    }
    if unknown_level {
        warn!("unknown log level '{}', using info", level);
    }
}
