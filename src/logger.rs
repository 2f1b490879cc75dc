use std::time::Duration;

use hyper::StatusCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `RUST_LOG` wins over the default directive.
pub fn init_logger() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("storefront_edge=info,request=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_ids(true)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .init();
}

pub fn log_request(method: &str, path: &str, status: StatusCode, duration: Duration) {
    info!(
        target: "request",
        method = %method,
        path = %path,
        status = status.as_u16(),
        duration_ms = %duration.as_millis(),
        "Request completed"
    );
}
