//! Error plumbing for the non-blocking socket layer and the handlers.
//!
//! `NetError::Wait` means "not enough data / no buffer space yet, try again
//! on the next readiness event"; everything else is fatal for the affected
//! connection. Handler failures are a different animal: they carry the
//! user-visible reply text and never kill the connection.

use hotline::ProtocolError;
use std::fmt;
use std::io;

pub type NetResult<T> = Result<T, NetError>;

#[derive(Debug, Eq, PartialEq)]
pub enum NetError {
    Wait,
    Fatal(ErrorType),
}

#[derive(Debug, Eq, PartialEq)]
pub enum ErrorType {
    /// Peer closed the stream.
    Closed,
    /// Malformed frame, bad magic, oversize payload.
    Protocol(ProtocolError),
    /// Outbound queue for the connection is full.
    BufferFull,
    /// Handshake was not completed within the deadline.
    HandshakeTimeout,
    /// No transaction received within the idle deadline.
    IdleTimeout,
    /// Login failed or the account disappeared mid-session.
    Auth,
    /// No free client ids.
    ServerFull,
    /// The peer's address is banned.
    Banned,
    /// Administratively closed.
    Disconnected,
    Io(io::ErrorKind),
}

impl From<io::Error> for NetError {
    #[inline]
    fn from(io_error: io::Error) -> Self {
        match io_error.kind() {
            io::ErrorKind::WouldBlock => NetError::Wait,
            kind => NetError::Fatal(ErrorType::Io(kind)),
        }
    }
}

impl From<ProtocolError> for NetError {
    #[inline]
    fn from(err: ProtocolError) -> Self {
        NetError::Fatal(ErrorType::Protocol(err))
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorType::Closed => write!(f, "connection closed by peer"),
            ErrorType::Protocol(err) => write!(f, "protocol violation: {}", err),
            ErrorType::BufferFull => write!(f, "outbound queue full"),
            ErrorType::HandshakeTimeout => write!(f, "handshake timeout"),
            ErrorType::IdleTimeout => write!(f, "idle timeout"),
            ErrorType::Auth => write!(f, "authentication failure"),
            ErrorType::ServerFull => write!(f, "no free client ids"),
            ErrorType::Banned => write!(f, "address is banned"),
            ErrorType::Disconnected => write!(f, "administratively disconnected"),
            ErrorType::Io(kind) => write!(f, "i/o error: {:?}", kind),
        }
    }
}

pub trait ErrorUtils {
    /// True for everything except success and `Wait`.
    fn has_failed(&self) -> bool;
}

impl<T> ErrorUtils for NetResult<T> {
    fn has_failed(&self) -> bool {
        match self {
            Ok(_) => false,
            Err(NetError::Wait) => false,
            _ => true,
        }
    }
}

/// A handler failure: the exact sentence shown to the user in the error
/// reply. These strings are protocol surface and compared byte-for-byte by
/// clients' tests, so they live in one place.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct HandlerError(pub String);

pub type HandlerResult<T> = Result<T, HandlerError>;

impl HandlerError {
    pub fn new<S: Into<String>>(message: S) -> HandlerError {
        HandlerError(message.into())
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}
