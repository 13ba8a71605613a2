use thiserror::Error;

/// Errors surfaced by the relay library.
///
/// Per-packet drops on the forwarding path are not errors; they increment the
/// matching throughput counter and end the packet's life silently.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid address: {0}")]
    Address(String),

    #[error("buffer overrun reading {0}")]
    ReadOverrun(&'static str),

    #[error("buffer overrun writing {0}")]
    WriteOverrun(&'static str),

    #[error("crypto failure: {0}")]
    Crypto(&'static str),

    #[error("malformed header: {0}")]
    Header(&'static str),

    #[error("backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, RelayError>;
