//! Error types for the gateway engine and its peers

use thiserror::Error;

/// Errors surfaced by peers and the engine
///
/// Steady-state I/O problems are absorbed by the peers themselves (a
/// failed read is just "no frame"); these errors are for lifecycle
/// operations where the caller has to act.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Socket or file I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Wire data could not be decoded
    #[error("protocol error: {0}")]
    Proto(#[from] dmr_proto::ProtoError),

    /// A voice vocabulary file is missing or malformed
    #[error("voice vocabulary error: {0}")]
    Voice(String),

    /// A peer could not be brought up
    #[error("peer open failed: {0}")]
    Open(String),
}
