pub mod telemetry {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{Deserialize, Serialize};
    use serde_json::Value;
    use std::collections::BTreeMap;
    use std::fmt;

    /// Backend timestamps arrive either as epoch numbers or as preformatted strings.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(untagged)]
    pub enum Timestamp {
        Epoch(f64),
        Text(String),
    }

    impl Timestamp {
        /// Epoch values above 1e11 are treated as milliseconds, below as seconds.
        pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
            match self {
                Timestamp::Epoch(raw) => {
                    let millis = if *raw > 1e11 { *raw } else { raw * 1000.0 };
                    Utc.timestamp_millis_opt(millis as i64).single()
                }
                Timestamp::Text(text) => DateTime::parse_from_rfc3339(text)
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc)),
            }
        }
    }

    impl fmt::Display for Timestamp {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match (self.to_datetime(), self) {
                (Some(dt), _) => write!(f, "{}", dt.format("%H:%M:%S")),
                (None, Timestamp::Text(text)) => f.write_str(text),
                (None, Timestamp::Epoch(raw)) => write!(f, "{raw}"),
            }
        }
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct PacketRecord {
        pub id: Option<i64>,
        pub timestamp: Option<Timestamp>,
        pub source_ip: String,
        pub source_port: Option<u16>,
        pub destination_ip: String,
        pub destination_port: Option<u16>,
        pub protocol: String,
        pub length: u64,
        pub info: Option<String>,
    }

    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum HostStatus {
        Up,
        #[default]
        Down,
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct PortRecord {
        pub id: Option<i64>,
        pub port_number: u16,
        pub protocol: String,
        pub service_name: Option<String>,
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct VulnerabilityRecord {
        pub id: Option<i64>,
        pub cve: Option<String>,
        pub description: Option<String>,
        /// Scanner-specific fields (cvss, source, references...) kept verbatim.
        #[serde(flatten)]
        pub extra: BTreeMap<String, Value>,
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct HostRecord {
        pub id: Option<i64>,
        pub ip_address: String,
        pub hostname: Option<String>,
        pub os_name: Option<String>,
        pub mac_address: Option<String>,
        pub vendor: Option<String>,
        pub status: HostStatus,
        pub ports: Vec<PortRecord>,
        pub vulnerabilities: Vec<VulnerabilityRecord>,
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct AlertRecord {
        pub id: Option<i64>,
        pub signature: String,
        pub severity: Option<i64>,
        pub protocol: Option<String>,
        pub source_ip: Option<String>,
        pub destination_ip: Option<String>,
        pub timestamp: Option<Timestamp>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ThreatOriginRecord {
        /// ISO code from the geo lookup; absent for unresolvable addresses.
        pub country: Option<String>,
        pub risk: u64,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct TrafficCountryRecord {
        pub country: String,
        pub count: u64,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ProtocolDistributionRecord {
        pub protocol: String,
        /// Byte total from a sum aggregation, so it arrives as a float.
        pub count: f64,
    }

    /// Zeek connection rows are passed through untouched.
    pub type ConnectionSummary = Value;

    /// One bucket of the traffic timeline. The protocol keys differ between
    /// samples, so they are kept as a map instead of fields.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct TrafficTimelinePoint {
        pub time: Timestamp,
        #[serde(flatten)]
        pub protocols: BTreeMap<String, f64>,
    }

    impl TrafficTimelinePoint {
        pub fn total(&self) -> f64 {
            self.protocols.values().sum()
        }
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct Deduction {
        pub reason: String,
        pub count: u64,
        pub deduction: i64,
        pub items: Vec<String>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct SecurityPostureSnapshot {
        #[serde(alias = "health_score")]
        pub score: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub critical_alerts_24h: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub base_score: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub total_deduction: Option<i64>,
        #[serde(default)]
        pub details: Vec<Deduction>,
    }

    impl Default for SecurityPostureSnapshot {
        fn default() -> Self {
            Self {
                score: 100,
                critical_alerts_24h: None,
                base_score: None,
                total_deduction: None,
                details: Vec::new(),
            }
        }
    }

    /// Frames pushed over the live socket, discriminated by `type`.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type", rename_all = "snake_case")]
    pub enum StreamEvent {
        PacketData { data: PacketRecord },
        #[serde(other)]
        Other,
    }
}

pub mod cockpit {
    use super::telemetry::{Deduction, Timestamp};
    use serde::{Deserialize, Serialize};
    use serde_json::Value;
    use std::collections::BTreeMap;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ThroughputSample {
        pub time: i64,
        #[serde(rename = "in")]
        pub ingress: f64,
        #[serde(rename = "out")]
        pub egress: f64,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct NameValue {
        pub name: String,
        pub value: u64,
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct HealthScoreBreakdown {
        pub score: i64,
        pub base_score: i64,
        pub total_deduction: i64,
        pub details: Vec<Deduction>,
    }

    impl HealthScoreBreakdown {
        /// Deductions that actually cost points.
        pub fn active(&self) -> impl Iterator<Item = &Deduction> {
            self.details.iter().filter(|d| d.deduction > 0)
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ConnStateBucket {
        pub time: Timestamp,
        #[serde(flatten)]
        pub states: BTreeMap<String, u64>,
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct IpDetails {
        pub zeek: Vec<Value>,
        pub suricata: Vec<Value>,
        pub postgres_packets: Vec<Value>,
    }

    impl IpDetails {
        pub fn is_empty(&self) -> bool {
            self.zeek.is_empty() && self.suricata.is_empty() && self.postgres_packets.is_empty()
        }
    }
}

pub use cockpit::*;
pub use telemetry::*;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn posture_accepts_health_score_alias() {
        let posture: SecurityPostureSnapshot =
            serde_json::from_value(json!({"health_score": 85, "critical_alerts_24h": 3})).unwrap();
        assert_eq!(posture.score, 85);
        assert_eq!(posture.critical_alerts_24h, Some(json!(3)));
        assert_eq!(SecurityPostureSnapshot::default().score, 100);
    }

    #[test]
    fn timeline_point_keeps_dynamic_protocol_keys() {
        let points: Vec<TrafficTimelinePoint> = serde_json::from_value(json!([
            {"time": 1_700_000_000_000u64, "TCP": 1200.0, "UDP": 40.0},
            {"time": 1_700_000_060_000u64, "ICMP": 8.0}
        ]))
        .unwrap();
        assert_eq!(points[0].protocols.len(), 2);
        assert_eq!(points[0].total(), 1240.0);
        assert_eq!(points[1].protocols.keys().collect::<Vec<_>>(), vec!["ICMP"]);
        assert!(!points[1].protocols.contains_key("time"));
    }

    #[test]
    fn stream_event_discriminates_on_type() {
        let packet: StreamEvent =
            serde_json::from_value(json!({"type": "packet_data", "data": {"id": 7, "protocol": "TCP"}}))
                .unwrap();
        match packet {
            StreamEvent::PacketData { data } => {
                assert_eq!(data.id, Some(7));
                assert_eq!(data.protocol, "TCP");
            }
            other => panic!("unexpected event {other:?}"),
        }

        let other: StreamEvent =
            serde_json::from_value(json!({"type": "host_update", "data": {}})).unwrap();
        assert_eq!(other, StreamEvent::Other);
    }

    #[test]
    fn protocol_distribution_accepts_float_totals() {
        let rows: Vec<ProtocolDistributionRecord> = serde_json::from_value(json!([
            {"protocol": "HTTPS", "count": 52341.0},
            {"protocol": "DNS", "count": 12}
        ]))
        .unwrap();
        assert_eq!(rows[0].count, 52341.0);
        assert_eq!(rows[1].count, 12.0);
    }

    #[test]
    fn threat_origin_tolerates_unresolved_country() {
        let rows: Vec<ThreatOriginRecord> = serde_json::from_value(json!([
            {"country": "CN", "risk": 9},
            {"country": null, "risk": 2}
        ]))
        .unwrap();
        assert_eq!(rows[0].country.as_deref(), Some("CN"));
        assert_eq!(rows[1].country, None);
        assert_eq!(rows[1].risk, 2);
    }

    #[test]
    fn host_with_partial_fields_decodes() {
        let host: HostRecord = serde_json::from_value(json!({
            "ip_address": "10.0.0.1",
            "status": "up",
            "vulnerabilities": [{"id": 1, "cve": "CVE-x", "cvss": 9.8}]
        }))
        .unwrap();
        assert_eq!(host.status, HostStatus::Up);
        assert!(host.ports.is_empty());
        assert_eq!(host.vulnerabilities[0].extra.get("cvss"), Some(&json!(9.8)));
    }

    #[test]
    fn timestamp_display_formats_epochs() {
        let seconds = Timestamp::Epoch(0.0);
        assert_eq!(seconds.to_string(), "00:00:00");
        let text = Timestamp::Text("yesterday".into());
        assert_eq!(text.to_string(), "yesterday");
    }
}
