use std::fmt;
use std::io;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the relay core.
///
/// Session-local variants (`Io`, `Protocol`, `Connect`, `Timeout`) are always
/// absorbed by closing the offending session; they never propagate across
/// sessions. `Startup` variants are the only ones that reach `main`.
#[derive(Debug)]
pub enum Error {
    /// A socket read or write failed for a reason other than the peer
    /// closing the connection.
    Io(io::Error),

    /// The client's address header could not be parsed.
    Protocol(&'static str),

    /// The upstream host could not be resolved or connected to.
    Connect { host: String, port: u16, source: io::Error },

    /// The connect-timeout fired before the upstream finished connecting.
    Timeout,

    /// Binding or listening on a configured address failed.
    Bind { addr: String, source: io::Error },

    /// The configuration file or CLI arguments were invalid.
    Config(String),

    /// The configured cipher method name is not recognized.
    UnknownMethod(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "socket error: {}", err),
            Error::Protocol(msg) => write!(f, "protocol error: {}", msg),
            Error::Connect { host, port, source } => {
                write!(f, "failed to connect to {}:{}: {}", host, port, source)
            }
            Error::Timeout => write!(f, "remote timeout"),
            Error::Bind { addr, source } => write!(f, "bind {} failed: {}", addr, source),
            Error::Config(msg) => write!(f, "configuration error: {}", msg),
            Error::UnknownMethod(name) => write!(f, "unknown cipher method: {}", name),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Connect { source, .. } => Some(source),
            Error::Bind { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}
