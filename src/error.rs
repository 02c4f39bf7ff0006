use thiserror::Error;

/// Everything that can go wrong while pulling one JSON resource.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {path} failed: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{path} returned status {status}")]
    Status { path: String, status: u16 },

    #[error("could not decode {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl FetchError {
    pub fn path(&self) -> Option<&str> {
        match self {
            FetchError::Transport { path, .. }
            | FetchError::Status { path, .. }
            | FetchError::Decode { path, .. } => Some(path),
            FetchError::InvalidUrl(_) | FetchError::InvalidArgument(_) => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum SocketError {
    #[error("websocket handshake failed: {0}")]
    Handshake(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("gave up reconnecting after {0} attempts")]
    RetriesExhausted(u32),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid backend origin {origin}: {reason}")]
    Origin { origin: String, reason: String },

    #[error("unsupported scheme {0}, expected http or https")]
    Scheme(String),

    #[error("invalid value for {key}: {value}")]
    Value { key: &'static str, value: String },
}
