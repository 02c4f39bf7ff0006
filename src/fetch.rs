use crate::config::CockpitConfig;
use crate::error::FetchError;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Anything that can answer a GET for a backend path with a JSON document.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JsonSource: Send + Sync {
    async fn get_json(&self, path: &str) -> Result<Value, FetchError>;
}

/// REST source backed by `reqwest`, resolving paths against the backend origin.
#[derive(Clone)]
pub struct HttpSource {
    http: Client,
    origin: Url,
}

impl HttpSource {
    pub fn new(origin: Url, timeout: Duration) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| FetchError::Transport {
                path: origin.to_string(),
                source,
            })?;
        Ok(Self { http, origin })
    }

    pub fn from_config(config: &CockpitConfig) -> Result<Self, FetchError> {
        Self::new(config.backend.clone(), config.request_timeout)
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }
}

#[async_trait]
impl JsonSource for HttpSource {
    async fn get_json(&self, path: &str) -> Result<Value, FetchError> {
        let url = self
            .origin
            .join(path)
            .map_err(|e| FetchError::InvalidUrl(format!("{path}: {e}")))?;

        let transport = |source: reqwest::Error| FetchError::Transport {
            path: path.to_string(),
            source,
        };
        let response = self.http.get(url).send().await.map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                path: path.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(transport)?;
        serde_json::from_slice(&body).map_err(|source| FetchError::Decode {
            path: path.to_string(),
            source,
        })
    }
}

/// GET `path` and decode it into `T`.
pub async fn fetch<T: DeserializeOwned>(source: &dyn JsonSource, path: &str) -> Result<T, FetchError> {
    let value = source.get_json(path).await?;
    serde_json::from_value(value).map_err(|source| FetchError::Decode {
        path: path.to_string(),
        source,
    })
}

/// One-shot poll of a slice. On success `apply` receives the decoded value;
/// on any failure the error is logged and `apply` is never called.
/// Returns whether the slice was updated.
pub async fn fetch_and_set<T, F>(source: &dyn JsonSource, path: &str, name: &str, apply: F) -> bool
where
    T: DeserializeOwned,
    F: FnOnce(T),
{
    match fetch::<T>(source, path).await {
        Ok(value) => {
            debug!(slice = name, path, "fetched slice");
            apply(value);
            true
        }
        Err(e) => {
            warn!(slice = name, error = %e, "could not load {name}, keeping previous value");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProtocolDistributionRecord;
    use serde_json::json;

    #[tokio::test]
    async fn applies_decoded_payload_on_success() {
        let mut source = MockJsonSource::new();
        source
            .expect_get_json()
            .withf(|path| path.to_string() == "/api/zeek/protocol-distribution")
            .times(1)
            .returning(|_| Ok(json!([{"protocol": "tcp", "count": 12}])));

        let mut slice: Vec<ProtocolDistributionRecord> = Vec::new();
        let updated = fetch_and_set(&source, "/api/zeek/protocol-distribution", "Protocols", |v| slice = v).await;

        assert!(updated);
        assert_eq!(
            slice,
            vec![ProtocolDistributionRecord {
                protocol: "tcp".into(),
                count: 12.0
            }]
        );
    }

    #[tokio::test]
    async fn status_error_leaves_slice_untouched() {
        let mut source = MockJsonSource::new();
        source.expect_get_json().returning(|path| {
            Err(FetchError::Status {
                path: path.to_string(),
                status: 503,
            })
        });

        let mut slice = vec![1u32, 2, 3];
        let updated = fetch_and_set::<Vec<u32>, _>(&source, "/api/hosts/", "Hosts", |v| slice = v).await;

        assert!(!updated);
        assert_eq!(slice, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn shape_mismatch_is_a_decode_error() {
        let mut source = MockJsonSource::new();
        source
            .expect_get_json()
            .returning(|_| Ok(json!({"detail": "not a list"})));

        let err = fetch::<Vec<ProtocolDistributionRecord>>(&source, "/api/zeek/protocol-distribution")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));
        assert_eq!(err.path(), Some("/api/zeek/protocol-distribution"));
    }
}
