// Zeek conn_state codes as shown in the connection-state views.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Normal,
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Normal => "normal",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnStateInfo {
    pub code: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub severity: Severity,
}

const CATALOG: &[ConnStateInfo] = &[
    ConnStateInfo {
        code: "SF",
        name: "Normal (SYN-FIN)",
        description: "Connection established, data transferred, closed gracefully.",
        severity: Severity::Normal,
    },
    ConnStateInfo {
        code: "S0",
        name: "SYN Scan / Unanswered Request",
        description: "SYN sent but no SYN-ACK ever came back; typical of half-open port scans.",
        severity: Severity::High,
    },
    ConnStateInfo {
        code: "REJ",
        name: "Rejected",
        description: "Responder answered the attempt with a reset; closed port or firewall block.",
        severity: Severity::Medium,
    },
    ConnStateInfo {
        code: "RSTO",
        name: "Reset by Originator",
        description: "Established, then aborted by the client with a reset.",
        severity: Severity::Low,
    },
    ConnStateInfo {
        code: "RSTR",
        name: "Reset by Responder",
        description: "Established, then aborted by the server with a reset.",
        severity: Severity::Low,
    },
    ConnStateInfo {
        code: "S1",
        name: "SYN-ACK Sent, No Final ACK",
        description: "Handshake never completed by the client; possible SYN flood or spoofing.",
        severity: Severity::High,
    },
    ConnStateInfo {
        code: "SH",
        name: "SYN, then Half-closed (by Originator)",
        description: "Client sent SYN followed by FIN before the connection was established.",
        severity: Severity::Medium,
    },
    ConnStateInfo {
        code: "OTH",
        name: "Other / Malformed",
        description: "No standard state matched; unusual flag combinations.",
        severity: Severity::High,
    },
    ConnStateInfo {
        code: "RSTRH",
        name: "Reset by Responder (after handshake)",
        description: "Responder reset the connection after the handshake completed.",
        severity: Severity::Low,
    },
    ConnStateInfo {
        code: "SHR",
        name: "SYN, then Half-closed (by Responder)",
        description: "Responder sent FIN before the connection was established.",
        severity: Severity::Medium,
    },
    ConnStateInfo {
        code: "S2",
        name: "Half-closed by Originator, FIN-ACK from Responder",
        description: "Client closed its side while the server may still be sending.",
        severity: Severity::Low,
    },
    ConnStateInfo {
        code: "S3",
        name: "Half-closed by Responder, FIN-ACK from Originator",
        description: "Server closed its side while the client may still be sending.",
        severity: Severity::Low,
    },
];

pub fn lookup(code: &str) -> Option<&'static ConnStateInfo> {
    let code = code.trim();
    CATALOG.iter().find(|info| info.code.eq_ignore_ascii_case(code))
}

pub fn all() -> &'static [ConnStateInfo] {
    CATALOG
}
