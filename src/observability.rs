use std::sync::OnceLock;
use tracing_subscriber::{
    EnvFilter, Layer, fmt, fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt,
};

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Output shape of log lines, picked with `DOCKER_PROXY_LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

impl LogFormat {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            "compact" => Self::Compact,
            _ => Self::Pretty,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Json => "json",
        }
    }
}

pub fn default_filter(default_level: &str) -> String {
    format!("docker_proxy={default_level}")
}

/// Installs the global subscriber once and returns the effective filter and format.
/// `RUST_LOG` wins over `default_level`.
pub fn init_from_env(default_level: &str) -> (String, LogFormat) {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default_filter(default_level));
    let log_format = LogFormat::parse(
        &std::env::var("DOCKER_PROXY_LOG_FORMAT").unwrap_or_default(),
    );

    TRACING_INIT.get_or_init(|| {
        let env_filter = EnvFilter::try_new(&filter)
            .unwrap_or_else(|_| EnvFilter::new(default_filter("info")));
        let output = match log_format {
            LogFormat::Json => fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_events(FmtSpan::CLOSE)
                .boxed(),
            LogFormat::Compact => fmt::layer()
                .compact()
                .with_span_events(FmtSpan::CLOSE)
                .boxed(),
            LogFormat::Pretty => fmt::layer()
                .pretty()
                .with_line_number(true)
                .with_span_events(FmtSpan::CLOSE)
                .boxed(),
        };
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_error::ErrorLayer::default())
            .with(output)
            .init();
    });

    (filter, log_format)
}

#[cfg(test)]
mod tests {
    use super::{LogFormat, default_filter};

    #[test]
    fn log_format_falls_back_to_pretty() {
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse(" compact "), LogFormat::Compact);
        assert_eq!(LogFormat::parse(""), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("fancy").as_str(), "pretty");
    }

    #[test]
    fn default_filter_targets_this_crate() {
        assert_eq!(default_filter("debug"), "docker_proxy=debug");
    }
}
