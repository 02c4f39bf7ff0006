use crate::error::ConfigError;
use dotenv::dotenv;
use reqwest::Url;
use std::env;
use std::time::Duration;

pub const DEFAULT_BACKEND: &str = "http://localhost:8000";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(15_000);
pub const DEFAULT_MAX_PACKETS: usize = 100;
pub const DEFAULT_INITIAL_PACKET_LIMIT: usize = 50;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const WS_PATH: &str = "/api/ws/ws";

/// Backoff applied by the socket client between connection attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max: Duration,
    /// `None` keeps retrying forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (1-based): initial * 2^(attempt-1), capped at max.
    pub fn delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.initial
            .checked_mul(1u32 << shift)
            .unwrap_or(self.max)
            .min(self.max)
    }
}

#[derive(Debug, Clone)]
pub struct CockpitConfig {
    pub backend: Url,
    pub poll_interval: Duration,
    pub max_packets: usize,
    pub initial_packet_limit: usize,
    pub request_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl CockpitConfig {
    pub fn new(backend: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            backend: parse_origin(backend)?,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_packets: DEFAULT_MAX_PACKETS,
            initial_packet_limit: DEFAULT_INITIAL_PACKET_LIMIT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            reconnect: ReconnectPolicy::default(),
        })
    }

    /// Defaults overridden by `.env` and then the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let backend = env::var("COCKPIT_BACKEND_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_BACKEND.to_string());
        let mut config = Self::new(&backend)?;

        if let Some(ms) = env_number::<u64>("COCKPIT_POLL_INTERVAL_MS")? {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(max) = env_number::<usize>("COCKPIT_MAX_PACKETS")? {
            config.max_packets = max;
        }
        if let Some(ms) = env_number::<u64>("COCKPIT_REQUEST_TIMEOUT_MS")? {
            config.request_timeout = Duration::from_millis(ms);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Value {
                key: "poll_interval",
                value: "0".into(),
            });
        }
        if self.max_packets == 0 {
            return Err(ConfigError::Value {
                key: "max_packets",
                value: "0".into(),
            });
        }
        Ok(())
    }

    pub fn websocket_url(&self) -> Result<Url, ConfigError> {
        websocket_url(&self.backend)
    }

    pub fn initial_packets_path(&self) -> String {
        format!("/api/packets?limit={}", self.initial_packet_limit)
    }
}

fn env_number<T: std::str::FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => value
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Value { key, value }),
        _ => Ok(None),
    }
}

pub fn parse_origin(origin: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(origin).map_err(|e| ConfigError::Origin {
        origin: origin.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(ConfigError::Scheme(other.to_string())),
    }
    if url.host_str().is_none() {
        return Err(ConfigError::Origin {
            origin: origin.to_string(),
            reason: "missing host".into(),
        });
    }
    Ok(url)
}

/// Streaming endpoint on the same origin: https maps to wss, http to ws,
/// host and port carried over unchanged.
pub fn websocket_url(origin: &Url) -> Result<Url, ConfigError> {
    let scheme = match origin.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => return Err(ConfigError::Scheme(other.to_string())),
    };
    let host = origin.host_str().ok_or_else(|| ConfigError::Origin {
        origin: origin.to_string(),
        reason: "missing host".into(),
    })?;
    let authority = match origin.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    let ws = format!("{scheme}://{authority}{WS_PATH}");
    Url::parse(&ws).map_err(|e| ConfigError::Origin {
        origin: ws,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn websocket_scheme_follows_page_security() {
        let plain = parse_origin("http://10.0.0.5:8080").unwrap();
        assert_eq!(
            websocket_url(&plain).unwrap().as_str(),
            "ws://10.0.0.5:8080/api/ws/ws"
        );

        let secure = parse_origin("https://cockpit.example.org/dashboard").unwrap();
        assert_eq!(
            websocket_url(&secure).unwrap().as_str(),
            "wss://cockpit.example.org/api/ws/ws"
        );
    }

    #[test]
    fn rejects_non_http_origins() {
        assert!(matches!(
            parse_origin("ftp://files.local"),
            Err(ConfigError::Scheme(_))
        ));
        assert!(parse_origin("not a url").is_err());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = ReconnectPolicy {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(4),
            max_retries: None,
        };
        assert_eq!(policy.delay(1), Duration::from_millis(500));
        assert_eq!(policy.delay(2), Duration::from_secs(1));
        assert_eq!(policy.delay(4), Duration::from_secs(4));
        assert_eq!(policy.delay(40), Duration::from_secs(4));
    }

    #[test]
    fn defaults_match_dashboard_cadence() {
        let config = CockpitConfig::new("http://localhost:8000").unwrap();
        assert_eq!(config.poll_interval, Duration::from_millis(15_000));
        assert_eq!(config.max_packets, 100);
        assert_eq!(config.initial_packets_path(), "/api/packets?limit=50");
        assert!(config.validate().is_ok());
    }
}
