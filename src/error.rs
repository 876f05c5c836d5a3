use std::io;

use thiserror::Error;

use crate::driver::event::Operation;

#[derive(Debug, Error)]
pub enum LoopbackError {
    /// Port could not be opened or configured. Fatal, no iteration starts.
    #[error("open {port}: {source}")]
    Connection {
        port: String,
        #[source]
        source: serialport::Error,
    },
    #[error("{op} error: {source}")]
    Io {
        op: Operation,
        #[source]
        source: io::Error,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
