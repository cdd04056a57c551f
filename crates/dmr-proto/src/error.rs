//! Error types for the DMR wire format

use thiserror::Error;

/// Errors raised while decoding wire data
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Packet shorter than the format requires
    #[error("packet too short: {got} bytes, need {need}")]
    Truncated {
        /// Bytes available
        got: usize,
        /// Bytes required
        need: usize,
    },

    /// Packet tag did not match the expected format
    #[error("unexpected packet tag {0:02x?}")]
    BadTag([u8; 4]),
}
