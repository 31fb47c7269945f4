pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod labels;
pub mod protocol;
pub mod responder;
pub mod session;
pub mod tensor;
pub mod transport;

// Re-export commonly used types
pub use client::ReplClient;
pub use config::{resolve, ExecConfig, ResolvedParams, ServerConfig};
pub use engine::InferenceEngine;
pub use protocol::Framing;
pub use responder::{Responder, ResponderHandle};
pub use session::{Outcome, Session};
pub use tensor::TensorMessage;
pub use transport::Endpoint;
