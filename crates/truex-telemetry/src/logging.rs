//! Structured logging initialization.

use crate::error::TelemetryResult;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Directives applied when `RUST_LOG` is unset: workspace crates at debug,
/// everything else at info.
const DEFAULT_DIRECTIVES: &[&str] = &[
    "info",
    "truex_fix=debug",
    "truex_session=debug",
    "truex_feed=debug",
    "truex_book=debug",
    "truex_orders=debug",
    "truex_bot=debug",
];

/// Initialize the global tracing subscriber.
///
/// The output format follows `RUST_ENV`: machine-readable JSON under
/// `production`, pretty-printed lines with targets and thread names
/// everywhere else. `RUST_LOG` overrides the default filter.
pub fn init_logging() -> TelemetryResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES.join(",")));

    let registry = tracing_subscriber::registry().with(filter);

    match std::env::var("RUST_ENV").as_deref() {
        Ok("production") => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .init(),
        _ => registry
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_thread_names(true),
            )
            .init(),
    }

    Ok(())
}
