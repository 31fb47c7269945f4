//! Async client for the request/reply protocol.
//!
//! One fresh REQ socket per call keeps the socket state machine trivial and
//! matches the reliable-transport assumption: a caller that gets an empty
//! reply (the server-side "no result" signal) or a timeout simply resends.

use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use ndarray::ArrayD;
use tmq::Multipart;
use tracing::trace;

use crate::protocol::{self, Framing};
use crate::tensor::TensorMessage;

pub struct ReplClient {
    endpoint: String,
    context: tmq::Context,
    framing: Framing,
    timeout: Duration,
}

impl ReplClient {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            context: tmq::Context::new(),
            framing: Framing::default(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Speak the original untagged wire format.
    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send a control message; returns the configuration echo.
    pub async fn configure(&self, params: serde_json::Value) -> Result<serde_json::Value> {
        let wire = protocol::frame_control(serde_json::to_vec(&params)?, self.framing);
        let reply = self.call(wire).await?;
        if reply.is_empty() {
            bail!("server dropped the configure request (see server logs)");
        }
        Ok(serde_json::from_slice(&reply)?)
    }

    /// Send one input tensor; returns the decoded label map.
    pub async fn process(&self, input: &ArrayD<f32>) -> Result<ArrayD<u32>> {
        let wire = protocol::frame_data(TensorMessage::from_f32(input).encode()?, self.framing);
        let reply = self.call(wire).await?;
        if reply.is_empty() {
            bail!("server dropped the process request (see server logs)");
        }
        Ok(TensorMessage::decode(&reply)?.to_u32()?)
    }

    /// Send the session-terminating sentinel. No reply is ever sent for a
    /// sentinel, so this does not wait for one.
    pub async fn shutdown(&self) -> Result<()> {
        let socket = tmq::request(&self.context)
            .connect(&self.endpoint)
            .map_err(|e| anyhow!("failed to connect to {}: {e}", self.endpoint))?;
        let _receiver = socket
            .send(Multipart::from(vec![protocol::sentinel()]))
            .await
            .map_err(|e| anyhow!("failed to send sentinel: {e}"))?;
        Ok(())
    }

    async fn call(&self, wire: Vec<u8>) -> Result<Vec<u8>> {
        let socket = tmq::request(&self.context)
            .connect(&self.endpoint)
            .map_err(|e| anyhow!("failed to connect to {}: {e}", self.endpoint))?;

        trace!(bytes = wire.len(), endpoint = %self.endpoint, "sending request");
        let receiver = socket
            .send(Multipart::from(vec![wire]))
            .await
            .map_err(|e| anyhow!("failed to send request: {e}"))?;

        let (reply, _sender) = tokio::time::timeout(self.timeout, receiver.recv())
            .await
            .map_err(|_| anyhow!("request to {} timed out", self.endpoint))?
            .map_err(|e| anyhow!("failed to receive reply: {e}"))?;

        let bytes: Vec<u8> = reply.into_iter().flat_map(|frame| frame.to_vec()).collect();
        trace!(bytes = bytes.len(), "reply received");
        Ok(bytes)
    }
}
