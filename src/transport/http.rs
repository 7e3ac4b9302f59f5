//! reqwest-backed transport

use super::{ByteStream, ChatTransport, ProviderRequest, TransportError};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpTransport {
    client: Client,
    timeout: Duration,
}

impl HttpTransport {
    /// `timeout` bounds each read while streaming, and the whole exchange
    /// for plain JSON requests. A long reply that keeps producing chunks
    /// is never cut off.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .read_timeout(timeout)
            .build()
            .map_err(|e| TransportError::unknown(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, timeout })
    }

    fn build(&self, request: &ProviderRequest) -> RequestBuilder {
        let mut builder = self.client.post(&request.url).json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder
    }
}

fn send_error(e: &reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::network(format!("Request timeout: {e}"))
    } else if e.is_connect() {
        TransportError::network(format!("Connection failed: {e}"))
    } else {
        TransportError::unknown(format!("Request failed: {e}"))
    }
}

async fn check_status(response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .map_err(|e| TransportError::network(format!("Failed to read response: {e}")))?;
    Err(TransportError::from_status(status.as_u16(), &body))
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn open_stream(
        &self,
        request: ProviderRequest,
        cancel: CancellationToken,
    ) -> Result<ByteStream, TransportError> {
        let send = self.build(&request).send();
        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(TransportError::cancelled()),
            result = send => result.map_err(|e| send_error(&e))?,
        };
        let response = check_status(response).await?;

        let chunks = response
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|e| TransportError::network(format!("Stream error: {e}")))
            })
            .take_until(cancel.cancelled_owned());
        Ok(Box::pin(chunks))
    }

    async fn post_json(&self, request: ProviderRequest) -> Result<Value, TransportError> {
        let response = self
            .build(&request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| send_error(&e))?;
        let response = check_status(response).await?;

        let body = response
            .text()
            .await
            .map_err(|e| TransportError::network(format!("Failed to read response: {e}")))?;
        serde_json::from_str(&body).map_err(|e| {
            TransportError::unknown(format!("Failed to parse response: {e} - body: {body}"))
        })
    }
}
