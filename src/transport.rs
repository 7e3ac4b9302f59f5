//! Network collaborator
//!
//! The engine never talks HTTP directly. It hands a fully built
//! [`ProviderRequest`] to a [`ChatTransport`] and consumes the raw byte
//! stream that comes back.

mod error;
mod http;

#[cfg(test)]
pub mod testing;

pub use error::{TransportError, TransportErrorKind};
pub use http::HttpTransport;

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Raw response body chunks, in arrival order
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, TransportError>> + Send>>;

/// A provider-shaped HTTP request
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl ProviderRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Streaming POST plus plain JSON POST
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Open a streaming request. The token aborts the request; once it
    /// fires, implementations stop yielding chunks.
    async fn open_stream(
        &self,
        request: ProviderRequest,
        cancel: CancellationToken,
    ) -> Result<ByteStream, TransportError>;

    /// Non-streaming request returning the decoded JSON body
    async fn post_json(&self, request: ProviderRequest) -> Result<Value, TransportError>;
}

#[async_trait]
impl<T: ChatTransport + ?Sized> ChatTransport for Arc<T> {
    async fn open_stream(
        &self,
        request: ProviderRequest,
        cancel: CancellationToken,
    ) -> Result<ByteStream, TransportError> {
        (**self).open_stream(request, cancel).await
    }

    async fn post_json(&self, request: ProviderRequest) -> Result<Value, TransportError> {
        (**self).post_json(request).await
    }
}

/// Logging wrapper for transports
pub struct LoggingTransport {
    inner: Arc<dyn ChatTransport>,
}

impl LoggingTransport {
    pub fn new(inner: Arc<dyn ChatTransport>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ChatTransport for LoggingTransport {
    async fn open_stream(
        &self,
        request: ProviderRequest,
        cancel: CancellationToken,
    ) -> Result<ByteStream, TransportError> {
        let url = request.url.clone();
        let start = Instant::now();
        let result = self.inner.open_stream(request, cancel).await;
        let duration = start.elapsed();

        match &result {
            Ok(_) => {
                tracing::info!(
                    url = %url,
                    duration_ms = %duration.as_millis(),
                    "Chat stream opened"
                );
            }
            Err(e) if e.is_cancelled() => {
                tracing::info!(
                    url = %url,
                    duration_ms = %duration.as_millis(),
                    "Chat stream aborted"
                );
            }
            Err(e) => {
                tracing::error!(
                    url = %url,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    kind = ?e.kind,
                    "Chat stream failed to open"
                );
            }
        }

        result
    }

    async fn post_json(&self, request: ProviderRequest) -> Result<Value, TransportError> {
        let url = request.url.clone();
        let start = Instant::now();
        let result = self.inner.post_json(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(_) => {
                tracing::info!(
                    url = %url,
                    duration_ms = %duration.as_millis(),
                    "Request completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    url = %url,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    kind = ?e.kind,
                    "Request failed"
                );
            }
        }

        result
    }
}
