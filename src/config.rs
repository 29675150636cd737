use crate::constants::{
    DEFAULT_BIND, DEFAULT_CHALLENGE_SERVICE, DEFAULT_LANDING_URL, DEFAULT_NAMESPACE,
    DEFAULT_PUBLIC_SCHEME, DEFAULT_TOKEN_SERVICE_NAME, DEFAULT_TOKEN_SERVICE_URL,
    DEFAULT_UPSTREAM_REGISTRY,
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use config::{Config as SettingsLoader, Environment};
use serde::Deserialize;
use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: SocketAddr,
    pub upstream_registry: String,
    pub upstream_timeout_ms: Option<u64>,
    pub token_service_url: String,
    pub token_service_name: String,
    pub challenge_service: String,
    pub landing_url: String,
    pub default_namespace: String,
    pub public_scheme: String,
    pub trust_proxy: bool,
    /// Request bodies are streamed through unless a cap is set.
    pub max_body_size: Option<usize>,
    pub log_level: String,
}

#[derive(Debug, Default)]
struct RawEnvConfig {
    config: Option<String>,
    config_base64: Option<String>,
    bind: Option<String>,
    upstream: Option<String>,
    upstream_timeout_ms: Option<String>,
    token_service: Option<String>,
    token_service_name: Option<String>,
    challenge_service: Option<String>,
    landing_url: Option<String>,
    default_namespace: Option<String>,
    public_scheme: Option<String>,
    trust_proxy: Option<String>,
    max_body_size: Option<String>,
    log_level: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let env_cfg = load_docker_proxy_env()?;
        let mut cfg = Self::defaults();
        cfg.apply_env_config_sources_if_present(&env_cfg)?;
        cfg.apply_env_overrides(&env_cfg);
        cfg.apply_port_override(load_process_env_value("port")?);
        Ok(cfg)
    }

    pub fn from_env_with_config_file(config_path: PathBuf) -> Result<Self, String> {
        let env_cfg = load_docker_proxy_env()?;
        let mut cfg = Self::defaults();
        cfg.apply_env_config_sources_if_present(&env_cfg)?;
        cfg.apply_yaml_overrides(load_yaml_config(&config_path)?);
        cfg.apply_env_overrides(&env_cfg);
        cfg.apply_port_override(load_process_env_value("port")?);
        Ok(cfg)
    }

    pub fn defaults() -> Self {
        Self {
            bind: DEFAULT_BIND
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 8080))),
            upstream_registry: DEFAULT_UPSTREAM_REGISTRY.to_string(),
            upstream_timeout_ms: None,
            token_service_url: DEFAULT_TOKEN_SERVICE_URL.to_string(),
            token_service_name: DEFAULT_TOKEN_SERVICE_NAME.to_string(),
            challenge_service: DEFAULT_CHALLENGE_SERVICE.to_string(),
            landing_url: DEFAULT_LANDING_URL.to_string(),
            default_namespace: DEFAULT_NAMESPACE.to_string(),
            public_scheme: DEFAULT_PUBLIC_SCHEME.to_string(),
            trust_proxy: false,
            max_body_size: None,
            log_level: "info".to_string(),
        }
    }

    pub fn upstream_timeout(&self) -> Option<Duration> {
        self.upstream_timeout_ms.map(Duration::from_millis)
    }

    pub fn from_yaml_file(path: PathBuf) -> Result<Self, String> {
        let mut cfg = Self::defaults();
        cfg.apply_yaml_overrides(load_yaml_config(&path)?);
        Ok(cfg)
    }

    fn apply_env_config_sources_if_present(
        &mut self,
        env_cfg: &RawEnvConfig,
    ) -> Result<(), String> {
        let config_path = env_cfg
            .config
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty());
        let config_b64 = env_cfg
            .config_base64
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty());

        match (config_path, config_b64) {
            (Some(_), Some(_)) => Err(
                "DOCKER_PROXY_CONFIG and DOCKER_PROXY_CONFIG_BASE64 are both set; use only one"
                    .to_string(),
            ),
            (Some(path), None) => {
                let loaded = load_yaml_config(Path::new(path))
                    .map_err(|err| format!("failed to load DOCKER_PROXY_CONFIG={path}: {err}"))?;
                self.apply_yaml_overrides(loaded);
                Ok(())
            }
            (None, Some(value)) => {
                let compact = value
                    .chars()
                    .filter(|ch| !ch.is_ascii_whitespace())
                    .collect::<String>();
                let decoded = B64.decode(compact).map_err(|err| {
                    format!("failed to decode DOCKER_PROXY_CONFIG_BASE64: {err}")
                })?;
                let yaml = String::from_utf8(decoded).map_err(|err| {
                    format!(
                        "failed to decode DOCKER_PROXY_CONFIG_BASE64: decoded bytes are not UTF-8 ({err})"
                    )
                })?;
                let loaded = load_yaml_config_from_str("DOCKER_PROXY_CONFIG_BASE64", &yaml)
                    .map_err(|err| format!("failed to load DOCKER_PROXY_CONFIG_BASE64: {err}"))?;
                self.apply_yaml_overrides(loaded);
                Ok(())
            }
            (None, None) => Ok(()),
        }
    }

    fn apply_env_overrides(&mut self, env_cfg: &RawEnvConfig) {
        if let Some(bind) = parse_env_value::<SocketAddr>(env_cfg.bind.as_deref()) {
            self.bind = bind;
        }
        if let Some(value) = non_empty_url(env_cfg.upstream.as_deref()) {
            self.upstream_registry = value;
        }
        if let Some(value) = env_cfg.upstream_timeout_ms.as_deref() {
            if value.trim().is_empty() {
                self.upstream_timeout_ms = None;
            } else if let Some(parsed) = parse_env_value::<u64>(Some(value.trim())) {
                self.upstream_timeout_ms = Some(parsed);
            }
        }
        if let Some(value) = non_empty_url(env_cfg.token_service.as_deref()) {
            self.token_service_url = value;
        }
        if let Some(value) = non_empty(env_cfg.token_service_name.as_deref()) {
            self.token_service_name = value;
        }
        if let Some(value) = non_empty(env_cfg.challenge_service.as_deref()) {
            self.challenge_service = value;
        }
        if let Some(value) = non_empty(env_cfg.landing_url.as_deref()) {
            self.landing_url = value;
        }
        if let Some(value) = non_empty(env_cfg.default_namespace.as_deref()) {
            self.default_namespace = value;
        }
        if let Some(value) = non_empty(env_cfg.public_scheme.as_deref()) {
            self.public_scheme = value.to_ascii_lowercase();
        }
        if let Some(parsed) = parse_env_value::<bool>(env_cfg.trust_proxy.as_deref()) {
            self.trust_proxy = parsed;
        }
        if let Some(value) = env_cfg.max_body_size.as_deref() {
            if value.trim().is_empty() {
                self.max_body_size = None;
            } else if let Some(parsed) = parse_body_size(value) {
                self.max_body_size = Some(parsed);
            }
        }
        if let Some(value) = non_empty(env_cfg.log_level.as_deref()) {
            self.log_level = value;
        }
    }

    fn apply_port_override(&mut self, port_value: Option<String>) {
        // PaaS hosts inject PORT and expect a public bind address.
        if let Some(port) = parse_env_value::<u16>(port_value.as_deref()) {
            self.bind = SocketAddr::from(([0, 0, 0, 0], port));
        }
    }

    fn apply_yaml_overrides(&mut self, parsed: YamlConfig) {
        if let Some(listen) = parsed.listen.as_deref().and_then(|v| v.trim().parse::<SocketAddr>().ok()) {
            self.bind = listen;
        }
        if let Some(upstream) = parsed.upstream {
            if let Some(value) = non_empty_url(upstream.registry.as_deref()) {
                self.upstream_registry = value;
            }
            if upstream.timeout_ms.is_some() {
                self.upstream_timeout_ms = upstream.timeout_ms;
            }
        }
        if let Some(auth) = parsed.auth {
            if let Some(value) = non_empty_url(auth.token_service.as_deref()) {
                self.token_service_url = value;
            }
            if let Some(value) = non_empty(auth.service.as_deref()) {
                self.token_service_name = value;
            }
            if let Some(value) = non_empty(auth.challenge_service.as_deref()) {
                self.challenge_service = value;
            }
        }
        if let Some(value) = non_empty(parsed.landing.as_deref()) {
            self.landing_url = value;
        }
        if let Some(value) = non_empty(parsed.default_namespace.as_deref()) {
            self.default_namespace = value;
        }
        if let Some(server) = parsed.server {
            if let Some(value) = non_empty(server.public_scheme.as_deref()) {
                self.public_scheme = value.to_ascii_lowercase();
            }
            if let Some(value) = server.trust_proxy.as_ref() {
                self.trust_proxy = yaml_truthy(value);
            }
            if let Some(parsed) = server.max_body_size.as_deref().and_then(parse_body_size) {
                self.max_body_size = Some(parsed);
            }
        }
        if let Some(value) = non_empty(parsed.log.and_then(|log| log.level).as_deref()) {
            self.log_level = value;
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct YamlConfig {
    listen: Option<String>,
    upstream: Option<YamlUpstream>,
    auth: Option<YamlAuth>,
    landing: Option<String>,
    default_namespace: Option<String>,
    server: Option<YamlServer>,
    log: Option<YamlLog>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YamlUpstream {
    registry: Option<String>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YamlAuth {
    token_service: Option<String>,
    service: Option<String>,
    challenge_service: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YamlServer {
    public_scheme: Option<String>,
    trust_proxy: Option<serde_yaml::Value>,
    max_body_size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct YamlLog {
    level: Option<String>,
}

fn load_yaml_config(path: &Path) -> Result<YamlConfig, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|err| format!("failed to read {}: {err}", path.display()))?;
    let source = path.display().to_string();
    load_yaml_config_from_str(&source, &text)
}

fn load_yaml_config_from_str(source: &str, text: &str) -> Result<YamlConfig, String> {
    if text.trim().is_empty() {
        return Ok(YamlConfig::default());
    }
    serde_yaml::from_str::<YamlConfig>(text).map_err(|err| format!("failed to parse {source}: {err}"))
}

fn load_docker_proxy_env() -> Result<RawEnvConfig, String> {
    let settings = SettingsLoader::builder()
        .add_source(Environment::with_prefix("DOCKER_PROXY").try_parsing(false))
        .build()
        .map_err(|err| format!("failed to load DOCKER_PROXY_* environment: {err}"))?;

    Ok(RawEnvConfig {
        config: env_value_for_var(&settings, "DOCKER_PROXY_CONFIG"),
        config_base64: env_value_for_var(&settings, "DOCKER_PROXY_CONFIG_BASE64"),
        bind: env_value_for_var(&settings, "DOCKER_PROXY_BIND"),
        upstream: env_value_for_var(&settings, "DOCKER_PROXY_UPSTREAM"),
        upstream_timeout_ms: env_value_for_var(&settings, "DOCKER_PROXY_UPSTREAM_TIMEOUT_MS"),
        token_service: env_value_for_var(&settings, "DOCKER_PROXY_TOKEN_SERVICE"),
        token_service_name: env_value_for_var(&settings, "DOCKER_PROXY_TOKEN_SERVICE_NAME"),
        challenge_service: env_value_for_var(&settings, "DOCKER_PROXY_CHALLENGE_SERVICE"),
        landing_url: env_value_for_var(&settings, "DOCKER_PROXY_LANDING_URL"),
        default_namespace: env_value_for_var(&settings, "DOCKER_PROXY_DEFAULT_NAMESPACE"),
        public_scheme: env_value_for_var(&settings, "DOCKER_PROXY_PUBLIC_SCHEME"),
        trust_proxy: env_value_for_var(&settings, "DOCKER_PROXY_TRUST_PROXY"),
        max_body_size: env_value_for_var(&settings, "DOCKER_PROXY_MAX_BODY_SIZE"),
        log_level: env_value_for_var(&settings, "DOCKER_PROXY_LOG_LEVEL"),
    })
}

fn load_process_env_value(key: &str) -> Result<Option<String>, String> {
    let settings = SettingsLoader::builder()
        .add_source(Environment::default().try_parsing(false))
        .build()
        .map_err(|err| format!("failed to load process environment: {err}"))?;
    Ok(env_value(&settings, key))
}

fn env_value(settings: &SettingsLoader, key: &str) -> Option<String> {
    settings
        .get_string(key)
        .ok()
        .or_else(|| settings.get_string(&key.to_ascii_uppercase()).ok())
}

fn env_value_for_var(settings: &SettingsLoader, env_var: &str) -> Option<String> {
    let key = env_var
        .strip_prefix("DOCKER_PROXY_")
        .unwrap_or(env_var)
        .to_ascii_lowercase();
    env_value(settings, &key)
}

fn parse_env_value<T>(raw: Option<&str>) -> Option<T>
where
    T: std::str::FromStr,
{
    raw.and_then(|value| value.parse::<T>().ok())
}

fn non_empty(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

fn non_empty_url(raw: Option<&str>) -> Option<String> {
    non_empty(raw)
        .map(|value| value.trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
}

pub fn parse_body_size(raw: &str) -> Option<usize> {
    let value = raw.trim().to_lowercase();
    if value.is_empty() {
        return None;
    }
    let (number, unit) = split_number_and_unit(&value)?;
    let n = number.parse::<usize>().ok()?;
    let multiplier = match unit {
        "" | "b" => 1usize,
        "kb" => 1024usize,
        "mb" => 1024usize * 1024,
        "gb" => 1024usize * 1024 * 1024,
        _ => return None,
    };
    n.checked_mul(multiplier)
}

fn split_number_and_unit(value: &str) -> Option<(&str, &str)> {
    let idx = value
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(value.len());
    if idx == 0 {
        return None;
    }
    Some((&value[..idx], value[idx..].trim()))
}

fn yaml_truthy(value: &serde_yaml::Value) -> bool {
    match value {
        serde_yaml::Value::Bool(v) => *v,
        serde_yaml::Value::Number(n) => n.as_i64().is_some_and(|v| v != 0),
        serde_yaml::Value::String(s) => !s.trim().is_empty() && s != "false" && s != "0",
        _ => false,
    }
}
