pub const DEFAULT_BIND: &str = "127.0.0.1:8080";
pub const DEFAULT_UPSTREAM_REGISTRY: &str = "https://registry-1.docker.io";
pub const DEFAULT_TOKEN_SERVICE_URL: &str = "https://auth.docker.io/token";
pub const DEFAULT_TOKEN_SERVICE_NAME: &str = "registry.docker.io";
pub const DEFAULT_CHALLENGE_SERVICE: &str = "docker-proxy-worker";
pub const DEFAULT_LANDING_URL: &str = "https://www.docker.com";
pub const DEFAULT_NAMESPACE: &str = "library";
pub const DEFAULT_PUBLIC_SCHEME: &str = "https";

pub const ROOT_PATH: &str = "/";
pub const API_ROOT_PATH: &str = "/v2/";
pub const TOKEN_PATH: &str = "/auth/token";

pub const HEADER_JSON: &str = "application/json";
pub const FALLBACK_HOST: &str = "localhost";

/// Connection-scoped headers that never travel across the proxy hop.
pub const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
];
