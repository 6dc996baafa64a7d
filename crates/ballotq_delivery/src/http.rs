//! HTTP transport implementation.
//!
//! Each attempt POSTs the CBOR-encoded record to `{base_url}/votes` with an
//! `Idempotency-Key` header. Any 2xx answer counts as delivered; every other
//! status, and every network error, is a transient failure. The HTTP
//! client itself sits behind [`HttpClient`] so tests can substitute one.

use crate::error::{DeliveryError, DeliveryResult};
use crate::transport::{DeliveryOutcome, Transport};
use ballotq_core::Record;
use parking_lot::RwLock;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Path the records are posted to, relative to the base URL.
pub const VOTES_PATH: &str = "/votes";

/// Content type of the request body.
pub const CBOR_CONTENT_TYPE: &str = "application/cbor";

/// Header carrying the record's idempotency key.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// One outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Absolute URL.
    pub url: String,
    /// Value of the idempotency header.
    pub idempotency_key: String,
    /// CBOR body.
    pub body: Vec<u8>,
}

/// HTTP client abstraction.
pub trait HttpClient: Send + Sync {
    /// Sends `request` as a POST and returns the response status code.
    fn post(&self, request: HttpRequest) -> impl Future<Output = DeliveryResult<u16>> + Send;
}

/// [`HttpClient`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a client whose requests give up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new(timeout: Duration) -> DeliveryResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::transport_fatal(e.to_string()))?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    async fn post(&self, request: HttpRequest) -> DeliveryResult<u16> {
        let response = self
            .client
            .post(&request.url)
            .header(reqwest::header::CONTENT_TYPE, CBOR_CONTENT_TYPE)
            .header(IDEMPOTENCY_HEADER, request.idempotency_key)
            .body(request.body)
            .send()
            .await
            .map_err(|e| DeliveryError::transport_retryable(e.to_string()))?;
        Ok(response.status().as_u16())
    }
}

/// Transport that delivers records over HTTP.
pub struct HttpTransport<C: HttpClient> {
    base_url: String,
    client: C,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a transport posting to `base_url`.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the URL records are posted to.
    pub fn votes_url(&self) -> String {
        format!("{}{VOTES_PATH}", self.base_url)
    }

    /// Returns the client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn set_error(&self, err: String) {
        *self.last_error.write() = Some(err);
    }

    fn clear_error(&self) {
        *self.last_error.write() = None;
    }

    fn encode(&self, record: &Record) -> DeliveryResult<HttpRequest> {
        let mut body = Vec::with_capacity(128);
        ciborium::into_writer(record, &mut body)
            .map_err(|e| DeliveryError::Codec(format!("failed to encode record: {e}")))?;
        Ok(HttpRequest {
            url: self.votes_url(),
            idempotency_key: record.idempotency_key().to_string(),
            body,
        })
    }
}

impl<C: HttpClient> Transport for HttpTransport<C> {
    async fn attempt(&self, record: &Record) -> DeliveryOutcome {
        let request = match self.encode(record) {
            Ok(request) => request,
            Err(e) => {
                warn!(record_id = %record.id(), error = %e, "could not build request");
                self.set_error(e.to_string());
                return DeliveryOutcome::TransientFailure;
            }
        };

        match self.client.post(request).await {
            Ok(status) if (200..300).contains(&status) => {
                debug!(record_id = %record.id(), status, "acceptor confirmed record");
                self.clear_error();
                DeliveryOutcome::Success
            }
            Ok(status) => {
                warn!(record_id = %record.id(), status, "acceptor refused record");
                self.set_error(format!("acceptor answered {status}"));
                DeliveryOutcome::TransientFailure
            }
            Err(e) => {
                warn!(record_id = %record.id(), error = %e, "request failed");
                self.set_error(e.to_string());
                DeliveryOutcome::TransientFailure
            }
        }
    }
}

impl<C: HttpClient> std::fmt::Debug for HttpTransport<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}
