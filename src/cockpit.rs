use crate::clock::Ticker;
use crate::error::FetchError;
use crate::fetch::{fetch, fetch_and_set, JsonSource};
use crate::models::{
    ConnStateBucket, HealthScoreBreakdown, IpDetails, NameValue, ProtocolDistributionRecord,
    ThroughputSample,
};
use serde::de::DeserializeOwned;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

pub const THROUGHPUT_REFRESH: Duration = Duration::from_secs(3);
pub const HEALTH_REFRESH: Duration = Duration::from_secs(30);
pub const CONN_STATE_REFRESH: Duration = Duration::from_secs(30);
pub const DEFAULT_BANDWIDTH_WINDOW: u32 = 30;

/// Typed, caller-driven queries for the detail views. Unlike slice polls,
/// failures are returned to the caller.
#[derive(Clone)]
pub struct CockpitClient {
    source: Arc<dyn JsonSource>,
}

impl CockpitClient {
    pub fn new(source: Arc<dyn JsonSource>) -> Self {
        Self { source }
    }

    /// Per-second ingress/egress bytes over the last `window_secs` (clamped to 1..=300).
    pub async fn bandwidth(&self, window_secs: u32) -> Result<Vec<ThroughputSample>, FetchError> {
        fetch(self.source.as_ref(), &bandwidth_path(window_secs)).await
    }

    pub async fn health_score(&self) -> Result<HealthScoreBreakdown, FetchError> {
        fetch(self.source.as_ref(), "/api/v1/cockpit/health-score").await
    }

    pub async fn conn_state_distribution(&self) -> Result<Vec<NameValue>, FetchError> {
        fetch(self.source.as_ref(), "/api/v1/cockpit/conn-state-distribution").await
    }

    /// Time-bucketed connection states over the last `hours` (clamped to 1..=168).
    pub async fn conn_state_timeline(&self, hours: u32) -> Result<Vec<ConnStateBucket>, FetchError> {
        let hours = hours.clamp(1, 168);
        let path = format!("/api/zeek/conn-state-distribution/detailed?hours={hours}");
        fetch(self.source.as_ref(), &path).await
    }

    /// Investigation bundle for one address.
    pub async fn ip_details(&self, ip: &str) -> Result<IpDetails, FetchError> {
        let ip: IpAddr = ip
            .trim()
            .parse()
            .map_err(|_| FetchError::InvalidArgument(format!("not an ip address: {ip}")))?;
        fetch(self.source.as_ref(), &format!("/api/v1/cockpit/ip_details/{ip}")).await
    }

    pub fn throughput_panel(&self, ticker: Box<dyn Ticker>, window_secs: u32) -> Panel<Vec<ThroughputSample>> {
        Panel::spawn(self.source.clone(), bandwidth_path(window_secs), "Live Throughput", ticker)
    }

    pub fn health_panel(&self, ticker: Box<dyn Ticker>) -> Panel<HealthScoreBreakdown> {
        Panel::spawn(
            self.source.clone(),
            "/api/v1/cockpit/health-score".into(),
            "Health Score",
            ticker,
        )
    }

    pub fn conn_state_panel(&self, ticker: Box<dyn Ticker>) -> Panel<Vec<NameValue>> {
        Panel::spawn(
            self.source.clone(),
            "/api/v1/cockpit/conn-state-distribution".into(),
            "Connection States",
            ticker,
        )
    }
}

fn bandwidth_path(window_secs: u32) -> String {
    format!("/api/v1/cockpit/bandwidth?window={}", window_secs.clamp(1, 300))
}

/// A single endpoint polled on its own cadence. Holds `None` until the first
/// successful fetch, then the last good value.
pub struct Panel<T> {
    name: &'static str,
    value: watch::Receiver<Option<Arc<T>>>,
    task: JoinHandle<()>,
}

impl<T> Panel<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    pub fn spawn(source: Arc<dyn JsonSource>, path: String, name: &'static str, mut ticker: Box<dyn Ticker>) -> Self {
        let (tx, value) = watch::channel(None);
        let task = tokio::spawn(async move {
            loop {
                fetch_and_set(source.as_ref(), &path, name, |v: T| {
                    tx.send_replace(Some(Arc::new(v)));
                })
                .await;
                ticker.tick().await;
            }
        });
        debug!(panel = name, "panel started");
        Self { name, value, task }
    }
}

impl<T> Panel<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn latest(&self) -> Option<Arc<T>> {
        self.value.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Option<Arc<T>>> {
        self.value.clone()
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl<T> Drop for Panel<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Percentage share of each protocol, rounded; empty when nothing was counted.
pub fn protocol_share(distribution: &[ProtocolDistributionRecord]) -> Vec<(String, u64)> {
    let total: f64 = distribution.iter().map(|r| r.count).sum();
    if total <= 0.0 {
        return Vec::new();
    }
    distribution
        .iter()
        .map(|r| {
            let pct = (r.count / total * 100.0).round() as u64;
            (r.protocol.to_uppercase(), pct)
        })
        .collect()
}

/// Bytes per second to megabits per second.
pub fn throughput_mbps(bytes_per_sec: f64) -> f64 {
    bytes_per_sec * 8.0 / 1_000_000.0
}
