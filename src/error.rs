use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong in the hub, the client, or the file server.
///
/// Startup failures (`Bind`, `FileAccess` on the served directory) are fatal
/// to the process that hits them. Everything else stays confined to the one
/// connection it happened on.
#[derive(Debug, Error)]
pub enum Error {
    #[error("could not bind listening socket: {0}")]
    Bind(#[source] io::Error),

    #[error("connection failed: {0}")]
    Connection(#[source] io::Error),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("could not deliver envelope to client {0}")]
    Routing(u64),

    #[error("unsupported command: {0:?}")]
    Protocol(String),

    #[error("cannot access {path}: {source}")]
    FileAccess { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Io(#[from] io::Error),
}
