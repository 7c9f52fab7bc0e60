//! Diagnostic tracing for the orchestrator.
//!
//! Output goes to stderr so stdout stays reserved for tool host replies and
//! command output. Directives come from `RUST_LOG`; without it the crate logs
//! loads, reports and tool calls at `info` and everything else at `warn`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_DIRECTIVES: &str = "warn,orchestrator=info";

/// Initialize the tracing subscriber.
///
/// # Example
/// ```bash
/// RUST_LOG=orchestrator=debug orchestrator serve
/// ```
pub fn init() {
    let directives = std::env::var("RUST_LOG").ok();
    tracing_subscriber::registry()
        .with(filter(directives.as_deref()))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}

fn filter(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|raw| !raw.trim().is_empty())
        .and_then(|raw| EnvFilter::try_new(raw).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVES))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::level_filters::LevelFilter;

    #[test]
    fn default_logs_crate_at_info() {
        assert_eq!(filter(None).max_level_hint(), Some(LevelFilter::INFO));
        assert_eq!(filter(Some("  ")).max_level_hint(), Some(LevelFilter::INFO));
    }

    #[test]
    fn rust_log_overrides_default() {
        assert_eq!(
            filter(Some("orchestrator=trace")).max_level_hint(),
            Some(LevelFilter::TRACE)
        );
        assert_eq!(filter(Some("error")).max_level_hint(), Some(LevelFilter::ERROR));
    }
}
