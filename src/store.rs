use crate::clock::Ticker;
use crate::config::CockpitConfig;
use crate::fetch::{fetch_and_set, JsonSource};
use crate::models::{
    AlertRecord, ConnectionSummary, HostRecord, PacketRecord, ProtocolDistributionRecord,
    SecurityPostureSnapshot, StreamEvent, ThreatOriginRecord, TrafficCountryRecord,
    TrafficTimelinePoint, VulnerabilityRecord,
};
use crate::socket::LiveFeed;
use crate::window::PacketWindow;
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

/// The REST-polled slices, refreshed together on every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slice {
    Hosts,
    Alerts,
    ThreatOrigins,
    Connections,
    ProtocolDistribution,
    SecurityPosture,
    TrafficTimeline,
    TopCountries,
}

impl Slice {
    pub const ALL: [Slice; 8] = [
        Slice::Hosts,
        Slice::Alerts,
        Slice::ThreatOrigins,
        Slice::Connections,
        Slice::ProtocolDistribution,
        Slice::SecurityPosture,
        Slice::TrafficTimeline,
        Slice::TopCountries,
    ];

    pub fn path(self) -> &'static str {
        match self {
            Slice::Hosts => "/api/hosts/",
            Slice::Alerts => "/api/security/alerts",
            Slice::ThreatOrigins => "/api/threat-intel/origins",
            Slice::Connections => "/api/zeek/connections",
            Slice::ProtocolDistribution => "/api/zeek/protocol-distribution",
            Slice::SecurityPosture => "/api/v1/cockpit/security-posture",
            Slice::TrafficTimeline => "/api/zeek/traffic-timeline",
            Slice::TopCountries => "/api/zeek/top-countries",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Slice::Hosts => "Hosts",
            Slice::Alerts => "Alerts",
            Slice::ThreatOrigins => "Threats",
            Slice::Connections => "Connections",
            Slice::ProtocolDistribution => "Zeek Protocol Distribution",
            Slice::SecurityPosture => "Security Posture",
            Slice::TrafficTimeline => "Traffic Timeline",
            Slice::TopCountries => "Top Traffic Countries",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    /// Initial polls in flight.
    Warming,
    Live,
    TornDown,
}

/// Read-only composite of every slice, handed out as a shared snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CockpitView {
    pub packets: Vec<PacketRecord>,
    pub hosts: Vec<HostRecord>,
    pub vulnerabilities: Vec<VulnerabilityRecord>,
    pub alerts: Vec<AlertRecord>,
    pub threat_origins: Vec<ThreatOriginRecord>,
    pub connections: Vec<ConnectionSummary>,
    pub protocol_distribution: Vec<ProtocolDistributionRecord>,
    pub traffic_timeline: Vec<TrafficTimelinePoint>,
    pub top_countries: Vec<TrafficCountryRecord>,
    pub security_posture: SecurityPostureSnapshot,
    pub is_connected: bool,
}

/// Every host's vulnerabilities, host order then per-host order, duplicates kept.
pub fn flatten_vulnerabilities(hosts: &[HostRecord]) -> Vec<VulnerabilityRecord> {
    hosts
        .iter()
        .flat_map(|host| host.vulnerabilities.iter().cloned())
        .collect()
}

struct Slices {
    window: PacketWindow<PacketRecord>,
    view: CockpitView,
}

impl Slices {
    fn set_hosts(&mut self, hosts: Vec<HostRecord>) {
        self.view.vulnerabilities = flatten_vulnerabilities(&hosts);
        self.view.hosts = hosts;
    }

    fn push_packet(&mut self, packet: PacketRecord) {
        self.window.push(packet);
        self.view.packets = self.window.to_vec();
    }

    fn replace_packets(&mut self, packets: Vec<PacketRecord>) {
        self.window.replace(packets);
        self.view.packets = self.window.to_vec();
    }
}

struct Inner {
    slices: Mutex<Slices>,
    views: watch::Sender<Arc<CockpitView>>,
    phase: watch::Sender<Phase>,
    torn_down: AtomicBool,
}

impl Inner {
    /// Applies one mutation and republishes the view. Updates arriving after
    /// teardown are discarded.
    fn update(&self, mutate: impl FnOnce(&mut Slices)) -> bool {
        let mut slices = self.slices.lock().unwrap_or_else(PoisonError::into_inner);
        if self.torn_down.load(Ordering::SeqCst) {
            debug!("discarding update that arrived after teardown");
            return false;
        }
        mutate(&mut slices);
        self.views.send_replace(Arc::new(slices.view.clone()));
        true
    }

    fn teardown(&self) {
        let _guard = self.slices.lock().unwrap_or_else(PoisonError::into_inner);
        self.torn_down.store(true, Ordering::SeqCst);
        self.phase.send_replace(Phase::TornDown);
    }

    fn apply_event(&self, message: Value) {
        match serde_json::from_value::<StreamEvent>(message) {
            Ok(StreamEvent::PacketData { data }) => {
                self.update(|s| s.push_packet(data));
            }
            Ok(StreamEvent::Other) => {}
            Err(e) => debug!(error = %e, "ignoring undecodable stream event"),
        }
    }

    fn set_connected(&self, connected: bool) {
        self.update(|s| s.view.is_connected = connected);
    }

    async fn poll_slice(&self, source: &dyn JsonSource, slice: Slice) -> bool {
        let (path, name) = (slice.path(), slice.name());
        match slice {
            Slice::Hosts => {
                fetch_and_set(source, path, name, |v: Vec<HostRecord>| {
                    self.update(|s| s.set_hosts(v));
                })
                .await
            }
            Slice::Alerts => {
                fetch_and_set(source, path, name, |v: Vec<AlertRecord>| {
                    self.update(|s| s.view.alerts = v);
                })
                .await
            }
            Slice::ThreatOrigins => {
                fetch_and_set(source, path, name, |v: Vec<ThreatOriginRecord>| {
                    self.update(|s| s.view.threat_origins = v);
                })
                .await
            }
            Slice::Connections => {
                fetch_and_set(source, path, name, |v: Vec<ConnectionSummary>| {
                    self.update(|s| s.view.connections = v);
                })
                .await
            }
            Slice::ProtocolDistribution => {
                fetch_and_set(source, path, name, |v: Vec<ProtocolDistributionRecord>| {
                    self.update(|s| s.view.protocol_distribution = v);
                })
                .await
            }
            Slice::SecurityPosture => {
                fetch_and_set(source, path, name, |v: SecurityPostureSnapshot| {
                    self.update(|s| s.view.security_posture = v);
                })
                .await
            }
            Slice::TrafficTimeline => {
                fetch_and_set(source, path, name, |v: Vec<TrafficTimelinePoint>| {
                    self.update(|s| s.view.traffic_timeline = v);
                })
                .await
            }
            Slice::TopCountries => {
                fetch_and_set(source, path, name, |v: Vec<TrafficCountryRecord>| {
                    self.update(|s| s.view.top_countries = v);
                })
                .await
            }
        }
    }

    async fn poll_packets(&self, source: &dyn JsonSource, path: &str) -> bool {
        fetch_and_set(source, path, "Packets", |v: Vec<PacketRecord>| {
            self.update(|s| s.replace_packets(v));
        })
        .await
    }

    async fn poll_all(&self, source: &dyn JsonSource) -> Vec<(Slice, bool)> {
        join_all(Slice::ALL.into_iter().map(|slice| async move {
            (slice, self.poll_slice(source, slice).await)
        }))
        .await
    }
}

/// Single source of truth for dashboard data. Owns the slices, the polling
/// loop and the packet-event subscription; consumers only ever read.
pub struct DataStore {
    inner: Arc<Inner>,
    views: watch::Receiver<Arc<CockpitView>>,
    phases: watch::Receiver<Phase>,
    source: Option<Arc<dyn JsonSource>>,
    initial_packets_path: String,
    tasks: Vec<JoinHandle<()>>,
}

impl DataStore {
    /// Store with every slice at its default. Nothing is fetched until [`DataStore::start`].
    pub fn new(config: &CockpitConfig) -> Self {
        let slices = Slices {
            window: PacketWindow::new(config.max_packets),
            view: CockpitView::default(),
        };
        let (views_tx, views) = watch::channel(Arc::new(slices.view.clone()));
        let (phase_tx, phases) = watch::channel(Phase::Uninitialized);

        Self {
            inner: Arc::new(Inner {
                slices: Mutex::new(slices),
                views: views_tx,
                phase: phase_tx,
                torn_down: AtomicBool::new(false),
            }),
            views,
            phases,
            source: None,
            initial_packets_path: config.initial_packets_path(),
            tasks: Vec::new(),
        }
    }

    /// `new` followed by `start`.
    pub fn spawn(
        config: &CockpitConfig,
        source: Arc<dyn JsonSource>,
        ticker: Box<dyn Ticker>,
        feed: LiveFeed,
    ) -> Self {
        let mut store = Self::new(config);
        store.start(source, ticker, feed);
        store
    }

    /// Kicks off the initial poll of every slice plus the packet snapshot,
    /// schedules the repeating refresh on `ticker`, and starts merging
    /// packet events from `feed`.
    pub fn start(&mut self, source: Arc<dyn JsonSource>, ticker: Box<dyn Ticker>, feed: LiveFeed) {
        if self.phase() != Phase::Uninitialized {
            warn!(phase = ?self.phase(), "store already started");
            return;
        }
        self.inner.phase.send_replace(Phase::Warming);
        info!("cockpit store warming up");

        self.source = Some(source.clone());
        self.tasks.push(tokio::spawn(poll_loop(
            self.inner.clone(),
            source,
            ticker,
            self.initial_packets_path.clone(),
        )));
        self.tasks.push(tokio::spawn(event_loop(self.inner.clone(), feed)));
    }

    pub fn view(&self) -> Arc<CockpitView> {
        self.views.borrow().clone()
    }

    /// Change notifications; every slice update publishes a new snapshot.
    pub fn watch(&self) -> watch::Receiver<Arc<CockpitView>> {
        self.views.clone()
    }

    pub fn phase(&self) -> Phase {
        *self.phases.borrow()
    }

    pub fn phases(&self) -> watch::Receiver<Phase> {
        self.phases.clone()
    }

    /// Polls all eight slices once, outside the regular schedule.
    pub async fn refresh(&self) -> Vec<(Slice, bool)> {
        match &self.source {
            Some(source) => self.inner.poll_all(source.as_ref()).await,
            None => Slice::ALL.into_iter().map(|slice| (slice, false)).collect(),
        }
    }

    /// Cancels the refresh timer, in-flight polls and the event subscription.
    /// Anything that still completes afterwards is discarded.
    pub async fn shutdown(&mut self) {
        if self.phase() == Phase::TornDown {
            return;
        }
        self.inner.teardown();
        for task in self.tasks.drain(..) {
            task.abort();
            let _ = task.await;
        }
        info!("cockpit store torn down");
    }
}

impl Drop for DataStore {
    fn drop(&mut self) {
        self.inner.teardown();
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn poll_loop(
    inner: Arc<Inner>,
    source: Arc<dyn JsonSource>,
    mut ticker: Box<dyn Ticker>,
    initial_packets_path: String,
) {
    // every poll, initial ones included, runs as its own task so a stalled
    // slice never holds back ticks or other slices
    let mut warming = JoinSet::new();
    spawn_round(&mut warming, &inner, &source);
    {
        let inner = inner.clone();
        let source = source.clone();
        warming.spawn(async move {
            let loaded = inner.poll_packets(source.as_ref(), &initial_packets_path).await;
            debug!(loaded, "initial packet snapshot");
        });
    }

    let mut in_flight = JoinSet::new();
    loop {
        tokio::select! {
            Some(joined) = warming.join_next(), if !warming.is_empty() => {
                if let Err(e) = joined {
                    warn!(error = %e, "initial poll task failed");
                }
                if warming.is_empty() && !inner.torn_down.load(Ordering::SeqCst) {
                    inner.phase.send_replace(Phase::Live);
                    info!("cockpit store live");
                }
            }
            _ = ticker.tick() => spawn_round(&mut in_flight, &inner, &source),
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(e) = joined {
                    warn!(error = %e, "slice poll task failed");
                }
            }
        }
    }
}

fn spawn_round(tasks: &mut JoinSet<()>, inner: &Arc<Inner>, source: &Arc<dyn JsonSource>) {
    for slice in Slice::ALL {
        let inner = inner.clone();
        let source = source.clone();
        tasks.spawn(async move {
            inner.poll_slice(source.as_ref(), slice).await;
        });
    }
}

async fn event_loop(inner: Arc<Inner>, mut feed: LiveFeed) {
    let connected = *feed.connected.borrow_and_update();
    inner.set_connected(connected);

    let mut events_open = true;
    let mut flag_open = true;
    while events_open || flag_open {
        tokio::select! {
            message = feed.events.recv(), if events_open => match message {
                Ok(message) => inner.apply_event(message),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "packet feed lagged, events dropped");
                }
                Err(RecvError::Closed) => events_open = false,
            },
            changed = feed.connected.changed(), if flag_open => match changed {
                Ok(()) => {
                    let connected = *feed.connected.borrow_and_update();
                    inner.set_connected(connected);
                }
                Err(_) => {
                    flag_open = false;
                    inner.set_connected(false);
                }
            },
        }
    }
    debug!("live feed closed");
}
