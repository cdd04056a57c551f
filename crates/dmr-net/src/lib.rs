//! UDP Transports
//!
//! The two peers of the gateway's wire world, both speaking the HomeBrew
//! protocol over non-blocking UDP sockets:
//!
//! - [`MmdvmNetwork`]: the master side, facing the MMDVM repeater. It
//!   accepts the repeater's login, captures its configuration blob and
//!   options, answers keepalives, and exchanges `DMRD` frames plus the
//!   out-of-band position/talker-alias reports.
//! - [`HomebrewNetwork`]: the client side, facing DMR masters and XLX
//!   reflectors. A clock-driven handshake state machine with keepalives,
//!   retry and dead-link recovery.
//!
//! Neither peer ever blocks: sockets are drained from `clock`, decoded
//! frames sit in a bounded queue, and `read` is a queue pop.

pub mod modem;
pub mod network;

pub use modem::MmdvmNetwork;
pub use network::HomebrewNetwork;

/// Frames buffered per peer before the oldest ones are dropped
pub(crate) const RX_QUEUE_DEPTH: usize = 64;
