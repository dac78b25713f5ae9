use thiserror::Error;

/// A non-root process attempted to mutate the root process's receiver
/// table. Raised synchronously to the offending caller; the root's table is
/// left unchanged.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("only the root process may install receivers on the root process")]
pub struct NotMainProcessError;

/// `spawn`/`spawn_link` referenced a process body name with no matching
/// `process_body!` registration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no process body registered under name {0:?}")]
pub struct BodyNotFound(pub String);

/// Two `process_body!` registrations used the same name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("duplicate process_body! registration for name {0:?}")]
pub struct DuplicateBodyName(pub String);

/// A failure on the framed duplex channel to an OS-backed child, surfaced
/// synchronously to a caller explicitly waiting on a spawn handshake.
/// Ordinary `send` stays silent on a dead peer, per the mailbox contract.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("transport io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("transport encoding error: {0}")]
    Encoding(#[from] bincode::Error),
    #[error("child process exited before completing the spawn handshake")]
    ChildExitedDuringHandshake,
}
