use clap::{Parser, Subcommand};
use cockpit::clock::IntervalTicker;
use cockpit::cockpit::{
    protocol_share, throughput_mbps, CockpitClient, Panel, DEFAULT_BANDWIDTH_WINDOW, HEALTH_REFRESH,
    THROUGHPUT_REFRESH,
};
use cockpit::config::{parse_origin, CockpitConfig};
use cockpit::conn_state;
use cockpit::fetch::{HttpSource, JsonSource};
use cockpit::models::{HealthScoreBreakdown, PacketRecord, ThroughputSample};
use cockpit::socket::SocketClient;
use cockpit::{CockpitView, DataStore};
use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const SUMMARY_EVERY: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "cockpit", version, about = "Live network-telemetry client for the security cockpit backend")]
struct Cli {
    /// Backend origin, e.g. https://cockpit.local:8443
    #[arg(long)]
    backend: Option<String>,

    /// Slice refresh interval in milliseconds
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Keep every slice fresh and log a summary as data changes
    Watch {
        /// Skip the throughput and health panels
        #[arg(long)]
        no_panels: bool,
    },
    /// Investigation bundle for one address
    Ip { addr: String },
    /// Health score breakdown
    Health,
    /// Ingress/egress throughput in Mbps
    Bandwidth {
        #[arg(long, default_value_t = DEFAULT_BANDWIDTH_WINDOW)]
        window: u32,
    },
    /// Connection states over time
    States {
        #[arg(long, default_value_t = 24)]
        hours: u32,
    },
}

struct NetworkStats {
    total_packets: usize,
    total_bytes: u64,
    protocol_counts: HashMap<String, usize>,
}

impl NetworkStats {
    fn new() -> Self {
        NetworkStats {
            total_packets: 0,
            total_bytes: 0,
            protocol_counts: HashMap::new(),
        }
    }

    fn update(&mut self, packet: &PacketRecord) {
        self.total_packets += 1;
        self.total_bytes += packet.length;
        *self.protocol_counts.entry(packet.protocol.clone()).or_insert(0) += 1;
    }

    fn busiest_protocol(&self) -> Option<(&str, usize)> {
        self.protocol_counts
            .iter()
            .max_by_key(|(_, count)| **count)
            .map(|(name, count)| (name.as_str(), *count))
    }
}

/// Rate-limits snapshot logging. A change that lands inside the quiet period
/// is held and reported by the next `flush` once the period has passed.
struct SummaryThrottle {
    every: Duration,
    last: Option<Instant>,
    pending: bool,
}

impl SummaryThrottle {
    fn new(every: Duration) -> Self {
        SummaryThrottle {
            every,
            last: None,
            pending: false,
        }
    }

    fn due(&self, now: Instant) -> bool {
        self.last.map_or(true, |at| now.duration_since(at) >= self.every)
    }

    fn changed(&mut self, now: Instant) -> bool {
        if self.due(now) {
            self.last = Some(now);
            self.pending = false;
            true
        } else {
            self.pending = true;
            false
        }
    }

    fn flush(&mut self, now: Instant) -> bool {
        if self.pending && self.due(now) {
            self.last = Some(now);
            self.pending = false;
            true
        } else {
            false
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = CockpitConfig::from_env()?;
    if let Some(backend) = &cli.backend {
        config.backend = parse_origin(backend)?;
    }
    if let Some(ms) = cli.poll_interval_ms {
        config.poll_interval = Duration::from_millis(ms);
    }
    config.validate()?;

    let source: Arc<dyn JsonSource> = Arc::new(HttpSource::from_config(&config)?);
    let client = CockpitClient::new(source.clone());

    match cli.command {
        Command::Watch { no_panels } => run_watch(&config, source, &client, !no_panels).await?,
        Command::Ip { addr } => {
            let details = client.ip_details(&addr).await?;
            if details.is_empty() {
                println!("No activity recorded for {addr} in the last 24h");
            } else {
                println!("{}", serde_json::to_string_pretty(&details)?);
            }
        }
        Command::Health => print_health(&client.health_score().await?),
        Command::Bandwidth { window } => {
            for sample in client.bandwidth(window).await? {
                print_throughput(&sample);
            }
        }
        Command::States { hours } => {
            for bucket in client.conn_state_timeline(hours).await? {
                println!("{}", bucket.time);
                for (code, count) in &bucket.states {
                    let name = conn_state::lookup(code).map(|info| info.name).unwrap_or("Unknown");
                    println!("  {code:<6} {count:>8}  {name}");
                }
            }
        }
    }
    Ok(())
}

async fn run_watch(
    config: &CockpitConfig,
    source: Arc<dyn JsonSource>,
    client: &CockpitClient,
    with_panels: bool,
) -> Result<(), Box<dyn Error>> {
    let socket = SocketClient::from_config(config)?;
    info!(backend = %config.backend, socket = %socket.url(), "starting cockpit");

    let mut store = DataStore::spawn(
        config,
        source,
        Box::new(IntervalTicker::new(config.poll_interval)),
        socket.feed(),
    );
    let panels = with_panels.then(|| {
        (
            client.throughput_panel(
                Box::new(IntervalTicker::new(THROUGHPUT_REFRESH)),
                DEFAULT_BANDWIDTH_WINDOW,
            ),
            client.health_panel(Box::new(IntervalTicker::new(HEALTH_REFRESH))),
        )
    });

    let (stop_tx, mut stop_rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        stop_tx.send_replace(true);
    })?;

    let mut views = store.watch();
    let mut throttle = SummaryThrottle::new(SUMMARY_EVERY);
    let mut flush = tokio::time::interval(SUMMARY_EVERY);
    flush.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        let report = tokio::select! {
            _ = stop_rx.changed() => break,
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                throttle.changed(Instant::now())
            }
            _ = flush.tick() => throttle.flush(Instant::now()),
        };
        if report {
            let view = views.borrow_and_update().clone();
            log_summary(&view);
            if let Some((throughput, health)) = &panels {
                log_panels(throughput, health);
            }
        }
    }

    info!("shutting down");
    store.shutdown().await;
    if let Err(e) = socket.close().await {
        warn!(error = %e, "live socket ended with error");
    }
    Ok(())
}

fn log_summary(view: &CockpitView) {
    let mut stats = NetworkStats::new();
    for packet in &view.packets {
        stats.update(packet);
    }

    info!(
        connected = view.is_connected,
        hosts = view.hosts.len(),
        vulnerabilities = view.vulnerabilities.len(),
        alerts = view.alerts.len(),
        score = view.security_posture.score,
        packets = stats.total_packets,
        bytes = stats.total_bytes,
        "cockpit snapshot"
    );
    if let Some((protocol, count)) = stats.busiest_protocol() {
        debug!(protocol, count, "busiest protocol in packet window");
    }
    for (protocol, pct) in protocol_share(&view.protocol_distribution) {
        debug!(protocol = %protocol, pct, "protocol share");
    }
    for origin in &view.threat_origins {
        debug!(country = origin.country.as_deref().unwrap_or("unknown"), risk = origin.risk, "threat origin");
    }
}

fn log_panels(throughput: &Panel<Vec<ThroughputSample>>, health: &Panel<HealthScoreBreakdown>) {
    if let Some(sample) = throughput.latest().and_then(|samples| samples.last().cloned()) {
        info!(
            ingress_mbps = %format!("{:.2}", throughput_mbps(sample.ingress)),
            egress_mbps = %format!("{:.2}", throughput_mbps(sample.egress)),
            "throughput"
        );
    }
    if let Some(breakdown) = health.latest() {
        for deduction in breakdown.active() {
            info!(
                reason = %deduction.reason,
                count = deduction.count,
                deduction = deduction.deduction,
                "health deduction"
            );
        }
    }
}

fn print_health(health: &HealthScoreBreakdown) {
    println!(
        "Health score {} / {} (-{})",
        health.score, health.base_score, health.total_deduction
    );
    for deduction in health.active() {
        println!("  -{:<4} {} ({})", deduction.deduction, deduction.reason, deduction.count);
        for item in &deduction.items {
            println!("        {item}");
        }
    }
}

fn print_throughput(sample: &ThroughputSample) {
    let time = chrono::DateTime::from_timestamp(sample.time, 0)
        .map(|dt| dt.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| sample.time.to_string());
    println!(
        "{time}  in {:>8.2} Mbps  out {:>8.2} Mbps",
        throughput_mbps(sample.ingress),
        throughput_mbps(sample.egress)
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_holds_changes_inside_quiet_period() {
        let start = Instant::now();
        let mut throttle = SummaryThrottle::new(Duration::from_secs(5));

        assert!(throttle.changed(start));
        assert!(!throttle.changed(start + Duration::from_secs(1)));
        assert!(!throttle.changed(start + Duration::from_secs(2)));
        assert!(!throttle.flush(start + Duration::from_secs(4)));

        // the held change is reported without waiting for another one
        assert!(throttle.flush(start + Duration::from_secs(5)));
        assert!(!throttle.flush(start + Duration::from_secs(11)));
    }

    #[test]
    fn throttle_flush_is_quiet_without_changes() {
        let start = Instant::now();
        let mut throttle = SummaryThrottle::new(Duration::from_secs(5));
        assert!(!throttle.flush(start));
        assert!(throttle.changed(start + Duration::from_secs(1)));
        assert!(!throttle.flush(start + Duration::from_secs(7)));
        assert!(throttle.changed(start + Duration::from_secs(7)));
    }

    #[test]
    fn network_stats_pick_busiest_protocol() {
        let mut stats = NetworkStats::new();
        for protocol in ["TCP", "UDP", "TCP"] {
            stats.update(&PacketRecord {
                protocol: protocol.into(),
                length: 100,
                ..Default::default()
            });
        }
        assert_eq!(stats.total_packets, 3);
        assert_eq!(stats.total_bytes, 300);
        assert_eq!(stats.busiest_protocol(), Some(("TCP", 2)));
    }
}
