//! Mock transport for testing
//!
//! Replays queued byte scripts so sessions can be exercised without a
//! network.

use super::{ByteStream, ChatTransport, ProviderRequest, TransportError};
use async_trait::async_trait;
use futures::{stream, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

/// Render deltas as a chat-completions event stream ending in `[DONE]`
pub fn sse_body(deltas: &[&str]) -> Vec<u8> {
    let mut body = String::new();
    for delta in deltas {
        let event = serde_json::json!({"choices": [{"delta": {"content": delta}}]});
        body.push_str(&format!("data: {event}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");
    body.into_bytes()
}

/// One scripted reply to `open_stream`
pub enum Script {
    /// Yield these chunks, then end
    Chunks(Vec<Vec<u8>>),
    /// Yield these chunks, then fail
    FailMidStream {
        chunks: Vec<Vec<u8>>,
        error: TransportError,
    },
    /// Fail before any byte arrives
    Refuse(TransportError),
    /// Yield whatever the test pushes through the channel
    Channel(mpsc::UnboundedReceiver<Vec<u8>>),
}

/// Transport that replays queued scripts
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    json: Mutex<VecDeque<Result<Value, TransportError>>>,
    /// Record of all requests made
    pub requests: Mutex<Vec<ProviderRequest>>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            json: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn queue(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }

    /// Queue a complete stream carrying `deltas`
    pub fn queue_deltas(&self, deltas: &[&str]) {
        self.queue(Script::Chunks(vec![sse_body(deltas)]));
    }

    /// Queue a stream fed by hand; returns the feeding end
    pub fn queue_channel(&self) -> mpsc::UnboundedSender<Vec<u8>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.queue(Script::Channel(rx));
        tx
    }

    pub fn queue_json(&self, result: Result<Value, TransportError>) {
        self.json.lock().unwrap().push_back(result);
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn open_stream(
        &self,
        request: ProviderRequest,
        cancel: CancellationToken,
    ) -> Result<ByteStream, TransportError> {
        self.requests.lock().unwrap().push(request);
        let script = self.scripts.lock().unwrap().pop_front();

        let chunks: ByteStream = match script {
            None => return Err(TransportError::network("No scripted response queued")),
            Some(Script::Refuse(error)) => return Err(error),
            Some(Script::Chunks(chunks)) => Box::pin(stream::iter(chunks.into_iter().map(Ok))),
            Some(Script::FailMidStream { chunks, error }) => {
                let failure = stream::once(async move { Err(error) });
                Box::pin(stream::iter(chunks.into_iter().map(Ok)).chain(failure))
            }
            Some(Script::Channel(rx)) => Box::pin(UnboundedReceiverStream::new(rx).map(Ok)),
        };
        Ok(Box::pin(chunks.take_until(cancel.cancelled_owned())))
    }

    async fn post_json(&self, request: ProviderRequest) -> Result<Value, TransportError> {
        self.requests.lock().unwrap().push(request);
        self.json
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::network("No scripted response queued")))
    }
}
