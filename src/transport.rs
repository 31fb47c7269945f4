//! Endpoint configuration for the REQ/REP socket.
//!
//! The listen address arrives as a URI string (`ipc:///tmp/reqrep.ipc`,
//! `tcp://0.0.0.0:5555`, `inproc://name`) and is parsed once at startup.

use std::fmt;
use std::path::PathBuf;

use crate::error::{Result, ServerError};

/// Parsed socket address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// In-process endpoint (same ZMQ context only).
    Inproc { name: String },

    /// Unix domain socket endpoint.
    Ipc { path: PathBuf },

    /// TCP endpoint, `host:port`.
    Tcp { addr: String },
}

impl Endpoint {
    /// Parse a ZMQ-style URI into an endpoint.
    pub fn parse(uri: &str) -> Result<Self> {
        if let Some(name) = uri.strip_prefix("inproc://") {
            Ok(Endpoint::Inproc {
                name: name.to_string(),
            })
        } else if let Some(path) = uri.strip_prefix("ipc://") {
            Ok(Endpoint::Ipc {
                path: PathBuf::from(path),
            })
        } else if let Some(addr) = uri.strip_prefix("tcp://") {
            Ok(Endpoint::Tcp {
                addr: addr.to_string(),
            })
        } else {
            Err(ServerError::Transport(format!(
                "unsupported endpoint scheme: {uri}"
            )))
        }
    }

    /// The ZMQ endpoint string for this address.
    pub fn as_zmq(&self) -> String {
        match self {
            Endpoint::Inproc { name } => format!("inproc://{name}"),
            Endpoint::Ipc { path } => format!("ipc://{}", path.display()),
            Endpoint::Tcp { addr } => format!("tcp://{addr}"),
        }
    }

    /// Bind a server socket. IPC parent directories are created first.
    pub fn bind(&self, socket: &zmq::Socket) -> Result<()> {
        if let Endpoint::Ipc { path } = self {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
        }
        socket.bind(&self.as_zmq())?;
        Ok(())
    }

    /// Connect a client socket.
    pub fn connect(&self, socket: &zmq::Socket) -> Result<()> {
        socket.connect(&self.as_zmq())?;
        Ok(())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_zmq())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ipc() {
        let ep = Endpoint::parse("ipc:///tmp/reqrep.ipc").unwrap();
        assert_eq!(ep.as_zmq(), "ipc:///tmp/reqrep.ipc");
    }

    #[test]
    fn parses_tcp() {
        let ep = Endpoint::parse("tcp://127.0.0.1:5555").unwrap();
        assert_eq!(ep.as_zmq(), "tcp://127.0.0.1:5555");
    }

    #[test]
    fn parses_inproc() {
        let ep = Endpoint::parse("inproc://session").unwrap();
        assert_eq!(ep.as_zmq(), "inproc://session");
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!(Endpoint::parse("udp://0.0.0.0:1").is_err());
        assert!(Endpoint::parse("/tmp/plain-path").is_err());
    }
}
