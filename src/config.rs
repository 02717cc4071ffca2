use std::{env, net::SocketAddr, str::FromStr, time::Duration};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub max_concurrent_sandboxes: usize,
    pub exec_timeout: Duration,
    pub image_pull_timeout: Duration,
    /// Docker network mode string handed to the engine on every create.
    pub sandbox_network: String,
    pub log_level: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let app_env = env::var("APP_ENV").unwrap_or_default();
        let egress_proxy = env::var("EGRESS_PROXY_CONTAINER")
            .unwrap_or_else(|_| "execbox-egress".to_string());
        let network_override = env::var("SANDBOX_NETWORK").ok();

        Self {
            bind_addr: env_parse("BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080))),
            max_concurrent_sandboxes: env_parse("MAX_CONCURRENT_SANDBOXES", 100usize),
            exec_timeout: Duration::from_millis(env_parse("EXEC_TIMEOUT_MS", 5000u64)),
            image_pull_timeout: Duration::from_millis(env_parse(
                "IMAGE_PULL_TIMEOUT_MS",
                60_000u64,
            )),
            sandbox_network: resolve_network_mode(&app_env, &egress_proxy, network_override),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

/// In production every sandbox shares the network namespace of a pre-existing
/// hardened egress proxy container, so outbound traffic is centrally
/// filtered. Everywhere else the sandbox gets no network at all unless an
/// explicit override names a restricted one.
fn resolve_network_mode(app_env: &str, egress_proxy: &str, network_override: Option<String>) -> String {
    if app_env == "production" {
        return format!("container:{egress_proxy}");
    }
    network_override.unwrap_or_else(|| "none".to_string())
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}
