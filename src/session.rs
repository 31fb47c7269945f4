//! Session state machine.
//!
//! One engine per process lifetime, built lazily on the first successful
//! control message. The machine never panics and never escalates: every
//! per-message failure collapses to `Outcome::Dropped`, which the responder
//! answers with an empty reply while the state stays put.

use serde_json::Value;
use tracing::{info, warn};

use crate::config::{self, ExecConfig};
use crate::engine::{self, InferenceEngine};
use crate::error::HandleError;
use crate::labels;
use crate::protocol::{self, Frame, Framing};
use crate::tensor::TensorMessage;

/// What the responder should do after one message is handled.
#[derive(Debug)]
pub enum Outcome {
    /// Handler succeeded; send this reply.
    Reply(Vec<u8>),
    /// Per-message failure, already logged; send an empty reply.
    Dropped,
    /// Sentinel received; unwind the loop without replying.
    Shutdown,
}

enum State {
    Uninitialized,
    Ready {
        engine: Box<dyn InferenceEngine>,
        exec: ExecConfig,
    },
}

pub struct Session {
    state: State,
    framing: Framing,
}

impl Session {
    /// A fresh, unconfigured session.
    pub fn new(framing: Framing) -> Self {
        Self {
            state: State::Uninitialized,
            framing,
        }
    }

    /// A session with a pre-bound processor, skipping the configure phase.
    pub fn with_engine(framing: Framing, engine: Box<dyn InferenceEngine>, exec: ExecConfig) -> Self {
        Self {
            state: State::Ready { engine, exec },
            framing,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, State::Ready { .. })
    }

    /// Classify and dispatch one raw message.
    pub fn handle(&mut self, raw: &[u8]) -> Outcome {
        let frame = match protocol::classify(raw, self.framing) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(%err, "dropping unclassifiable message");
                return Outcome::Dropped;
            }
        };
        match frame {
            Frame::Sentinel => Outcome::Shutdown,
            Frame::Control(payload) => match self.on_control(payload) {
                Ok(echo) => Outcome::Reply(echo),
                Err(err) => {
                    warn!(%err, "control message dropped; waiting for parameters");
                    Outcome::Dropped
                }
            },
            Frame::Data(payload) => match self.on_data(payload) {
                Ok(reply) => Outcome::Reply(reply),
                Err(err) => {
                    warn!(%err, "data message dropped; no result for this request");
                    Outcome::Dropped
                }
            },
        }
    }

    fn on_control(&mut self, payload: &[u8]) -> Result<Vec<u8>, HandleError> {
        if self.is_ready() {
            // One engine per process; rebuilding is not supported.
            return Err(HandleError::AlreadyConfigured);
        }
        let caller: Value = serde_json::from_slice(payload)?;
        let params = config::resolve(&caller);
        let (engine, exec) = engine::build_engine(&params)?;
        info!(model = engine.name(), "model loaded; waiting for data");
        self.state = State::Ready { engine, exec };
        Ok(params.echo_bytes())
    }

    fn on_data(&mut self, payload: &[u8]) -> Result<Vec<u8>, HandleError> {
        let State::Ready { engine, exec } = &mut self.state else {
            return Err(HandleError::NotConfigured);
        };
        let input = TensorMessage::decode(payload)?.to_f32()?;
        let result = engine.process(&input, exec)?;
        let out = labels::finalize(result, exec)?;
        Ok(TensorMessage::from_u32(&out).encode()?)
    }
}
