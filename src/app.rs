use crate::{
    api,
    upstream::{TokenService, Upstream},
};
use axum::{Router, routing::any};

#[derive(Clone, Debug)]
pub struct AppState {
    pub upstream: Upstream,
    pub token_service: TokenService,
    pub landing_url: String,
    pub challenge_service: String,
    pub default_namespace: String,
    pub public_scheme: String,
    pub trust_proxy: bool,
    pub max_body_size: Option<usize>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new().fallback(any(api::handle)).with_state(state)
}
