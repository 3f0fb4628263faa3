use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to send segment: {0}")]
    SendFailed(#[source] io::Error),

    #[error("failed to receive segment: {0}")]
    RecvFailed(#[source] io::Error),

    #[error("wait on socket returned an unclassified failure: {0}")]
    UnknownFailure(#[source] io::Error),

    #[error("couldn't open file {path}: {source}")]
    FileOpen {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("couldn't read from file {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("couldn't write to file {path}: {source}")]
    FileWrite {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("couldn't bind UDP socket on port {port}: {source}")]
    BindFailed {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("couldn't resolve host {host}: {source}")]
    AddrResolution {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("host {host} resolved to no addresses")]
    NoAddrFound { host: String },

    #[error("requested transfer of {requested} bytes but {path} is only {available} bytes long")]
    ByteCapExceeded {
        path: String,
        requested: u64,
        available: u64,
    },
}

/// Outcome of a single bounded or unbounded receive. `Timeout` and
/// `ChecksumFailed` are control flow, not failure: callers loop or retry on
/// them, so they are not folded into [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvOutcome<T> {
    Ok(T),
    ChecksumFailed,
    Timeout,
}
