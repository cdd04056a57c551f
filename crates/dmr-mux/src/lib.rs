//! DMR Gateway Engine
//!
//! This crate is the dispatch-and-rewrite core of the gateway. It
//! multiplexes five asynchronous frame streams (one MMDVM repeater, two
//! DMR masters, two XLX reflectors) onto the repeater's two timeslots:
//!
//! - [`Rewrite`]: the ordered rewrite-rule pipeline that maps frames
//!   between address spaces (talk-group, private-call, type and source
//!   rewrites plus the fixed XLX bridge)
//! - [`SlotState`]: per-timeslot ownership with an inactivity timer, so a
//!   transmission in progress is not corrupted by cross-traffic
//! - [`XlxSession`]: the in-band reflector link-control protocol carried
//!   in ordinary user-to-user frames
//! - [`Gateway`]: the single cooperative loop body that polls every peer,
//!   routes frames through the rewrite chains and drives all timers
//!
//! The engine does no I/O of its own: peers implement the [`Peer`] traits
//! and are polled, never awaited. One `tick` reads at most one frame from
//! each peer, which keeps per-peer latency bounded and makes the whole
//! engine deterministic under test.

pub mod engine;
pub mod error;
pub mod peer;
pub mod rewrite;
pub mod slot;
pub mod xlx;

pub use engine::Gateway;
pub use error::GatewayError;
pub use peer::{ModemPeer, NetworkPeer, Peer, VoiceSource};
pub use rewrite::{apply_first, BridgeRewrite, PcRewrite, Rewrite, SrcRewrite, TgRewrite, TypeRewrite};
pub use slot::{SlotOwner, SlotState, Timer};
pub use xlx::{LinkChange, XlxSession, XLX_SLOT, XLX_TG};
