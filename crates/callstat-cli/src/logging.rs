use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install the global subscriber.
///
/// Filter comes from `RUST_LOG`, then `LOG_LEVEL`, then `info`. `LOG_FORMAT=json` writes
/// one JSON object per line; anything else is the human readable format.
pub fn init_logging() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_from_env("LOG_LEVEL"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    if log_format == "json" {
        let fmt_layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_file(true)
            .with_line_number(true);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    } else {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(true)
            .with_line_number(true);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    }
    Ok(())
}

/// Name of the current machine, as the OS reports it.
pub fn host_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Root span for the service: every event carries the environment and host name.
pub fn service_span(environment: &str) -> tracing::Span {
    tracing::info_span!("callstat", environment = %environment, hostname = %host_name())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_name_comes_from_the_os() {
        let expected = hostname::get().unwrap().into_string().unwrap();
        assert!(!expected.is_empty());
        assert_eq!(host_name(), expected);
    }
}
