//! Client for the remote `geocodeAddresses` service
//!
//! The service is treated as opaque: a batch goes out as a form-encoded
//! request and the response body comes back as raw bytes. Nothing here looks
//! inside the response; that happens during aggregation.

pub mod wire;

use crate::batch::Batch;
use crate::config::Config;
use crate::error::{GeobatchError, Result};
use std::time::Duration;
use tracing::{debug, instrument};

pub use wire::{AddressTable, GeocodeResponse, Location, LocationAttributes, Point};

/// HTTP client bound to one geocoding endpoint.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct OracleClient {
    http: reqwest::Client,
    url: String,
    out_sr: String,
    response_format: String,
}

impl OracleClient {
    pub fn new(
        url: impl Into<String>,
        out_sr: u32,
        response_format: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("geobatch/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| GeobatchError::config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            url: url.into(),
            out_sr: out_sr.to_string(),
            response_format: response_format.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.geocode_url.clone(),
            config.out_sr,
            config.response_format.clone(),
            config.request_timeout(),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send one batch and return the raw response body.
    ///
    /// Fails on transport errors and on any non-2xx status. The body of a
    /// rejected request is carried in [`GeobatchError::OracleStatus`].
    #[instrument(skip_all, fields(batch = batch.index, records = batch.len()))]
    pub async fn geocode(&self, batch: &Batch) -> Result<Vec<u8>> {
        let addresses = serde_json::to_string(&AddressTable::new(&batch.records))
            .map_err(|source| GeobatchError::Encode {
                batch: batch.index,
                source,
            })?;

        let form = [
            ("addresses", addresses.as_str()),
            ("f", self.response_format.as_str()),
            ("outSR", self.out_sr.as_str()),
        ];

        let response = self
            .http
            .post(&self.url)
            .form(&form)
            .send()
            .await
            .map_err(|source| GeobatchError::Transport {
                batch: batch.index,
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            // A body that cannot be read does not change the outcome
            let body = response
                .bytes()
                .await
                .map(|b| b.to_vec())
                .unwrap_or_default();
            return Err(GeobatchError::OracleStatus {
                batch: batch.index,
                status,
                body,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| GeobatchError::Transport {
                batch: batch.index,
                source,
            })?;

        debug!(status = %status, bytes = body.len(), "Received geocoding response");
        Ok(body.to_vec())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::ingest::AddressRecord;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn one_batch() -> Batch {
        Batch {
            index: 0,
            records: vec![AddressRecord {
                object_id: 1,
                street: "1 Main St".to_string(),
                city: "Springfield".to_string(),
                state: "IL".to_string(),
                zip: "62701".to_string(),
            }],
        }
    }

    #[tokio::test]
    async fn test_posts_form_and_returns_raw_body() {
        let server = MockServer::start().await;
        let body = r#"{"locations": []}"#;

        Mock::given(method("POST"))
            .and(path("/geocodeAddresses"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("f=pjson"))
            .and(body_string_contains("outSR=4326"))
            .and(body_string_contains("addresses="))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(&server)
            .await;

        let client = OracleClient::new(
            format!("{}/geocodeAddresses", server.uri()),
            4326,
            "pjson",
            None,
        )
        .unwrap();

        let raw = client.geocode(&one_batch()).await.unwrap();
        assert_eq!(raw, body.as_bytes());
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
            .mount(&server)
            .await;

        let client = OracleClient::new(server.uri(), 4326, "pjson", None).unwrap();
        let err = client.geocode(&one_batch()).await.unwrap_err();

        assert!(err.is_transport());
        match err {
            GeobatchError::OracleStatus { batch, status, body } => {
                assert_eq!(batch, 0);
                assert_eq!(status.as_u16(), 503);
                assert_eq!(body, b"Service Unavailable");
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_service_is_a_transport_error() {
        // Nothing listens on port 9 (discard) in the test environment
        let client = OracleClient::new("http://127.0.0.1:9/geocodeAddresses", 4326, "pjson", None)
            .unwrap();
        let err = client.geocode(&one_batch()).await.unwrap_err();
        assert!(matches!(err, GeobatchError::Transport { .. }));
    }

    #[tokio::test]
    async fn test_timeout_is_a_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = OracleClient::new(
            server.uri(),
            4326,
            "pjson",
            Some(Duration::from_millis(50)),
        )
        .unwrap();
        let err = client.geocode(&one_batch()).await.unwrap_err();
        assert!(matches!(err, GeobatchError::Transport { .. }));
    }
}
