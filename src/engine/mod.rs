//! Inference engine seam.
//!
//! The protocol core treats the model as an opaque collaborator reached
//! through a narrow call contract: built once from construction parameters,
//! then invoked synchronously per data message. `build_engine` is the
//! single entry point for model creation; a construction failure leaves the
//! session unconfigured so the next control message can retry.

pub mod threshold;

use ndarray::ArrayD;

use crate::config::{EngineConfig, ExecConfig, ResolvedParams};
use crate::error::EngineError;

/// A loaded model instance.
///
/// Implementations are free to block; the responder keeps at most one call
/// in flight, so a busy engine naturally delays the next message.
pub trait InferenceEngine: Send {
    /// Run one inference pass over a decoded input tensor, producing a
    /// label map with 2 or 3 axes.
    fn process(
        &mut self,
        input: &ArrayD<f32>,
        exec: &ExecConfig,
    ) -> Result<ArrayD<u32>, EngineError>;

    /// Model name, for logging.
    fn name(&self) -> &str;
}

impl std::fmt::Debug for dyn InferenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceEngine")
            .field("name", &self.name())
            .finish()
    }
}

/// Build an engine and its bound execution configuration from resolved
/// parameters.
pub fn build_engine(
    params: &ResolvedParams,
) -> Result<(Box<dyn InferenceEngine>, ExecConfig), EngineError> {
    let setup = EngineConfig::from_params(params)?;
    let exec = ExecConfig::from_params(params)?;
    let engine: Box<dyn InferenceEngine> = match setup.model.as_str() {
        "threshold" => Box::new(threshold::ThresholdEngine::new(&setup)),
        other => return Err(EngineError::UnknownModel(other.to_string())),
    };
    Ok((engine, exec))
}
