//! Error types for the labeld service.
//!
//! Per-message failures (`ProtocolError`, `TensorError`, `EngineError`) are
//! recoverable: the responder logs them, answers with an empty reply, and
//! keeps serving. Only `ServerError` unwinds the loop.

use thiserror::Error;

/// Errors raised while classifying inbound wire messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Zero-length message; not even a sentinel.
    #[error("empty message")]
    Empty,

    /// Tagged framing with an unknown kind byte.
    #[error("unknown message kind tag {0:#04x}")]
    UnknownKind(u8),
}

/// Errors raised by the tensor codec.
#[derive(Debug, Error)]
pub enum TensorError {
    #[error("tensor decode failed: {0}")]
    Decode(#[source] bincode::Error),

    #[error("tensor encode failed: {0}")]
    Encode(#[source] bincode::Error),

    /// Header shape disagrees with the element buffer length.
    #[error("element buffer holds {got} bytes but shape {shape:?} needs {want}")]
    LengthMismatch {
        shape: Vec<usize>,
        want: usize,
        got: usize,
    },

    /// Header shape describes more bytes than an address space holds.
    #[error("shape {shape:?} overflows the addressable byte length")]
    ShapeOverflow { shape: Vec<usize> },

    #[error("unexpected dtype: {0}")]
    DtypeMismatch(&'static str),

    /// Result tensors must carry 2 or 3 axes.
    #[error("result tensor has {got} axes; expected 2 or 3")]
    BadArity { got: usize },
}

/// Errors raised by engine construction and inference.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown model {0:?}")]
    UnknownModel(String),

    #[error("invalid construction parameter {key}: {reason}")]
    InvalidParameter { key: &'static str, reason: String },

    #[error("invalid execution parameter {key}: {reason}")]
    InvalidExecParameter { key: &'static str, reason: String },

    #[error("engine rejected input: {0}")]
    BadInput(String),

    #[error("inference failed: {0}")]
    Inference(String),
}

/// Per-message handling failure, aggregated across the data path.
///
/// The session collapses every variant to the same outward behavior: log,
/// empty reply, state unchanged.
#[derive(Debug, Error)]
pub enum HandleError {
    #[error(transparent)]
    Tensor(#[from] TensorError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("malformed control message: {0}")]
    MalformedControl(#[from] serde_json::Error),

    #[error("no model loaded; configure first")]
    NotConfigured,

    #[error("a model is already loaded; reconfiguration is not supported")]
    AlreadyConfigured,
}

/// Fatal errors that terminate the responder loop or the process.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("zmq error: {0}")]
    Zmq(#[from] zmq::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

/// A specialized Result type for fatal server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
