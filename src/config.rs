use std::env;
use std::time::Duration;

use url::Url;

use crate::error::{GatewayError, Result};
use crate::models::ProxyAddr;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Inbound HTTP server configuration
    pub server: ServerConfig,
    /// Upstream API configuration
    pub upstream: UpstreamConfig,
    /// Response cache and cooldown configuration
    pub cache: CacheConfig,
    /// Egress proxy pool configuration
    pub pool: PoolConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on (default: 8000)
    pub port: u16,
    /// Host to bind to (default: 0.0.0.0)
    pub host: String,
    /// Overall inbound request timeout in seconds
    pub request_timeout: u64,
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Base URL the resource id is appended to
    pub base_url: Url,
    /// Path segments following the resource id
    pub path_suffix: String,
    /// Value sent as the `limit` query parameter
    pub page_limit: u32,
    /// Timeout for a whole live call (send + body)
    pub request_timeout: Duration,
    /// Connect timeout for outbound clients
    pub connect_timeout: Duration,
    /// Prefix that marks the start of a pagination cursor in inbound keys
    pub cursor_prefix: String,
    /// Randomize User-Agent and origin headers per call
    pub spoof_headers: bool,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Age below which an entry is served without contacting upstream
    pub fresh_window: Duration,
    /// Maximum number of fingerprints kept
    pub capacity: usize,
    /// Collapse concurrent misses of the same fingerprint
    pub single_flight: bool,
    /// How long live calls for a resource are suppressed after a 429
    pub cooldown: Duration,
}

/// Where refresh cycles get candidate proxies from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxySourceConfig {
    /// No source: every call goes direct
    Disabled,
    /// Fixed candidate list
    Static(Vec<ProxyAddr>),
    /// Plain-text list downloaded from a URL
    Remote(Url),
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of verified proxies kept in rotation
    pub max_size: usize,
    /// Refresh early when fewer proxies than this remain
    pub min_live: usize,
    /// Full refresh interval
    pub refresh_interval: Duration,
    /// Minimum gap between refreshes triggered by a depleted pool
    pub retry_gap: Duration,
    /// Timeout for a single proxy probe
    pub probe_timeout: Duration,
    /// Idle keep-alive connections per proxied client
    pub keepalive: usize,
    /// Candidate source
    pub source: ProxySourceConfig,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_UPSTREAM_BASE_URL).expect("default upstream URL is valid"),
            path_suffix: "servers/Public".to_string(),
            page_limit: 100,
            request_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(3),
            cursor_prefix: "eyJ".to_string(),
            spoof_headers: false,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            fresh_window: Duration::from_secs(10),
            capacity: 10_000,
            single_flight: true,
            cooldown: Duration::from_secs(5),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 5,
            min_live: 2,
            refresh_interval: Duration::from_secs(300),
            retry_gap: Duration::from_secs(30),
            probe_timeout: Duration::from_millis(1000),
            keepalive: 2,
            source: ProxySourceConfig::Disabled,
        }
    }
}

impl PoolConfig {
    /// Number of candidates solicited per refresh
    pub fn candidate_count(&self) -> usize {
        self.max_size * 3 / 2
    }

    pub fn is_enabled(&self) -> bool {
        self.source != ProxySourceConfig::Disabled && self.max_size > 0
    }
}

const DEFAULT_UPSTREAM_BASE_URL: &str = "https://games.roblox.com/v1/games";

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let upstream_defaults = UpstreamConfig::default();
        let cache_defaults = CacheConfig::default();
        let pool_defaults = PoolConfig::default();

        Ok(Config {
            server: ServerConfig {
                port: get_env_or("SERVER_PORT", "8000").parse().map_err(|_| {
                    GatewayError::InvalidConfig("SERVER_PORT must be a valid port number".into())
                })?,
                host: get_env_or("SERVER_HOST", "0.0.0.0"),
                request_timeout: get_env_or("SERVER_REQUEST_TIMEOUT_SECS", "30")
                    .parse()
                    .unwrap_or(30),
            },
            upstream: UpstreamConfig {
                base_url: parse_base_url()?,
                path_suffix: get_env_or("UPSTREAM_PATH_SUFFIX", &upstream_defaults.path_suffix)
                    .trim_matches('/')
                    .to_string(),
                page_limit: get_env_or("UPSTREAM_PAGE_LIMIT", "100")
                    .parse()
                    .map_err(|_| {
                        GatewayError::InvalidConfig(
                            "UPSTREAM_PAGE_LIMIT must be a valid number".into(),
                        )
                    })?,
                request_timeout: Duration::from_millis(parse_u64(
                    "UPSTREAM_TIMEOUT_MS",
                    upstream_defaults.request_timeout.as_millis() as u64,
                )?),
                connect_timeout: Duration::from_millis(parse_u64(
                    "UPSTREAM_CONNECT_TIMEOUT_MS",
                    upstream_defaults.connect_timeout.as_millis() as u64,
                )?),
                cursor_prefix: get_env_or("UPSTREAM_CURSOR_PREFIX", &upstream_defaults.cursor_prefix),
                spoof_headers: get_env_or("UPSTREAM_SPOOF_HEADERS", "false")
                    .parse()
                    .unwrap_or(false),
            },
            cache: CacheConfig {
                fresh_window: Duration::from_secs(parse_u64(
                    "CACHE_FRESH_SECS",
                    cache_defaults.fresh_window.as_secs(),
                )?),
                capacity: parse_u64("CACHE_CAPACITY", cache_defaults.capacity as u64)?.max(1)
                    as usize,
                single_flight: get_env_or("CACHE_SINGLE_FLIGHT", "true")
                    .parse()
                    .unwrap_or(true),
                cooldown: Duration::from_secs(parse_u64(
                    "COOLDOWN_SECS",
                    cache_defaults.cooldown.as_secs(),
                )?),
            },
            pool: PoolConfig {
                max_size: parse_u64("POOL_MAX_SIZE", pool_defaults.max_size as u64)? as usize,
                min_live: parse_u64("POOL_MIN_LIVE", pool_defaults.min_live as u64)? as usize,
                refresh_interval: Duration::from_secs(parse_u64(
                    "POOL_REFRESH_SECS",
                    pool_defaults.refresh_interval.as_secs(),
                )?),
                retry_gap: Duration::from_secs(parse_u64(
                    "POOL_RETRY_SECS",
                    pool_defaults.retry_gap.as_secs(),
                )?),
                probe_timeout: Duration::from_millis(parse_u64(
                    "POOL_PROBE_TIMEOUT_MS",
                    pool_defaults.probe_timeout.as_millis() as u64,
                )?),
                keepalive: parse_u64("POOL_KEEPALIVE", pool_defaults.keepalive as u64)? as usize,
                source: parse_proxy_source()?,
            },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "pretty"),
            },
        })
    }

    /// Get the inbound server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_base_url() -> Result<Url> {
    let raw = get_env_or("UPSTREAM_BASE_URL", DEFAULT_UPSTREAM_BASE_URL);
    let url = Url::parse(raw.trim()).map_err(|e| {
        GatewayError::InvalidConfig(format!("UPSTREAM_BASE_URL must be a valid URL: {}", e))
    })?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(GatewayError::InvalidConfig(format!(
                "UPSTREAM_BASE_URL has unsupported scheme: {}",
                other
            )))
        }
    }
    if url.host_str().is_none() {
        return Err(GatewayError::InvalidConfig(
            "UPSTREAM_BASE_URL must include a host".into(),
        ));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(GatewayError::InvalidConfig(
            "UPSTREAM_BASE_URL must not include query/fragment".into(),
        ));
    }

    Ok(url)
}

/// `PROXY_SOURCE_URL` wins over `PROXY_LIST` when both are set
fn parse_proxy_source() -> Result<ProxySourceConfig> {
    let remote = get_env_or("PROXY_SOURCE_URL", "");
    let remote = remote.trim();
    if !remote.is_empty() {
        let url = Url::parse(remote).map_err(|e| {
            GatewayError::InvalidConfig(format!("PROXY_SOURCE_URL must be a valid URL: {}", e))
        })?;
        return Ok(ProxySourceConfig::Remote(url));
    }

    let list = get_env_or("PROXY_LIST", "");
    let proxies = list
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ProxyAddr::parse)
        .collect::<Result<Vec<_>>>()?;

    if proxies.is_empty() {
        Ok(ProxySourceConfig::Disabled)
    } else {
        Ok(ProxySourceConfig::Static(proxies))
    }
}

fn parse_u64(key: &str, default: u64) -> Result<u64> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| GatewayError::InvalidConfig(format!("{} must be a valid number", key))),
        Err(_) => Ok(default),
    }
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProxyProtocol;
    use std::env;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const CONFIG_ENV_KEYS: &[&str] = &[
        "SERVER_PORT",
        "SERVER_HOST",
        "SERVER_REQUEST_TIMEOUT_SECS",
        "UPSTREAM_BASE_URL",
        "UPSTREAM_PATH_SUFFIX",
        "UPSTREAM_PAGE_LIMIT",
        "UPSTREAM_TIMEOUT_MS",
        "UPSTREAM_CONNECT_TIMEOUT_MS",
        "UPSTREAM_CURSOR_PREFIX",
        "UPSTREAM_SPOOF_HEADERS",
        "CACHE_FRESH_SECS",
        "CACHE_CAPACITY",
        "CACHE_SINGLE_FLIGHT",
        "COOLDOWN_SECS",
        "POOL_MAX_SIZE",
        "POOL_MIN_LIVE",
        "POOL_REFRESH_SECS",
        "POOL_RETRY_SECS",
        "POOL_PROBE_TIMEOUT_MS",
        "POOL_KEEPALIVE",
        "PROXY_LIST",
        "PROXY_SOURCE_URL",
        "LOG_LEVEL",
        "LOG_FORMAT",
    ];

    struct EnvGuard {
        saved: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(keys: &[&str]) -> Self {
            let saved = keys
                .iter()
                .map(|&key| {
                    let old = env::var(key).ok();
                    env::remove_var(key);
                    (key.to_string(), old)
                })
                .collect();

            Self { saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.saved.drain(..) {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }

    #[test]
    fn test_config_from_env_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        let config = tokio_test::assert_ok!(Config::from_env());

        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(
            config.upstream.base_url.as_str(),
            "https://games.roblox.com/v1/games"
        );
        assert_eq!(config.upstream.path_suffix, "servers/Public");
        assert_eq!(config.upstream.page_limit, 100);
        assert_eq!(config.upstream.cursor_prefix, "eyJ");
        assert_eq!(config.cache.fresh_window, Duration::from_secs(10));
        assert_eq!(config.cache.cooldown, Duration::from_secs(5));
        assert!(config.cache.single_flight);
        assert_eq!(config.pool.max_size, 5);
        assert_eq!(config.pool.candidate_count(), 7);
        assert_eq!(config.pool.source, ProxySourceConfig::Disabled);
        assert!(!config.pool.is_enabled());
    }

    #[test]
    fn test_config_from_env_overrides() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("SERVER_PORT", "9000");
        env::set_var("UPSTREAM_BASE_URL", "http://127.0.0.1:4000/v1/games");
        env::set_var("UPSTREAM_PATH_SUFFIX", "/servers/Public/");
        env::set_var("COOLDOWN_SECS", "60");
        env::set_var("POOL_MAX_SIZE", "10");
        env::set_var("PROXY_LIST", "1.2.3.4:8080, socks5://5.6.7.8:1080");

        let config = Config::from_env().unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.upstream.base_url.host_str(), Some("127.0.0.1"));
        assert_eq!(config.upstream.path_suffix, "servers/Public");
        assert_eq!(config.cache.cooldown, Duration::from_secs(60));
        assert_eq!(config.pool.candidate_count(), 15);
        assert_eq!(
            config.pool.source,
            ProxySourceConfig::Static(vec![
                ProxyAddr::new(ProxyProtocol::Http, "1.2.3.4", 8080),
                ProxyAddr::new(ProxyProtocol::Socks5, "5.6.7.8", 1080),
            ])
        );
        assert!(config.pool.is_enabled());
    }

    #[test]
    fn test_config_remote_source_wins() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("PROXY_LIST", "1.2.3.4:8080");
        env::set_var("PROXY_SOURCE_URL", "https://lists.example/proxies.txt");

        let config = Config::from_env().unwrap();
        assert!(matches!(config.pool.source, ProxySourceConfig::Remote(_)));
    }

    #[test]
    fn test_config_from_env_invalid_port() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("SERVER_PORT", "not-a-port");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, GatewayError::InvalidConfig(_)));
    }

    #[test]
    fn test_config_from_env_invalid_upstream_url() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("UPSTREAM_BASE_URL", "ftp://files.example/games");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, GatewayError::InvalidConfig(_)));
    }

    #[test]
    fn test_config_from_env_invalid_proxy_list() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("PROXY_LIST", "1.2.3.4:8080,nonsense");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, GatewayError::InvalidConfig(_)));
    }

    #[test]
    fn test_config_from_env_invalid_number() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("CACHE_FRESH_SECS", "ten");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, GatewayError::InvalidConfig(_)));
    }

    #[test]
    fn test_server_addr() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("SERVER_HOST", "127.0.0.1");
        env::set_var("SERVER_PORT", "8080");
        let config = Config::from_env().unwrap();
        assert_eq!(config.server_addr(), "127.0.0.1:8080");
    }
}
