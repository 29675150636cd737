use crate::{
    app::{AppState, build_router},
    config::Config,
    error::ProxyError,
    observability,
    upstream::{TokenService, Upstream},
};
use tracing::instrument;

#[instrument(skip(config), fields(upstream = %config.upstream_registry, token_service = %config.token_service_url))]
pub fn build_state(config: &Config) -> Result<AppState, ProxyError> {
    let timeout = config.upstream_timeout();
    Ok(AppState {
        upstream: Upstream::new(config.upstream_registry.clone(), timeout)?,
        token_service: TokenService::new(
            config.token_service_url.clone(),
            config.token_service_name.clone(),
            timeout,
        )?,
        landing_url: config.landing_url.clone(),
        challenge_service: config.challenge_service.clone(),
        default_namespace: config.default_namespace.clone(),
        public_scheme: config.public_scheme.clone(),
        trust_proxy: config.trust_proxy,
        max_body_size: config.max_body_size,
    })
}

pub async fn run(config: Config) -> Result<(), ProxyError> {
    let bind = config.bind;
    let state = build_state(&config)?;
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;

    tracing::info!(
        bind = %bind,
        upstream = config.upstream_registry.as_str(),
        token_service = config.token_service_url.as_str(),
        upstream_timeout_ms = config.upstream_timeout_ms,
        "docker-proxy listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|_| ProxyError::Internal)
}

/// Installs logging at the configured level, then serves until shutdown.
pub async fn run_standalone(config: Config) -> Result<(), ProxyError> {
    let (log_filter, log_format) = observability::init_from_env(&config.log_level);
    tracing::debug!(
        log_filter = log_filter.as_str(),
        log_format = log_format.as_str(),
        "initialized tracing subscriber"
    );
    run(config).await
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let ctrl_c = async {
            let _ = tokio::signal::ctrl_c().await;
        };
        let terminate = async {
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                let _ = sigterm.recv().await;
            }
        };
        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
