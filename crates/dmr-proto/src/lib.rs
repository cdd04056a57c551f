//! DMR Data Model and Wire Format
//!
//! This crate provides the data unit exchanged between the repeater and the
//! upstream networks, and the HomeBrew UDP wire format used by all of them:
//!
//! - [`DmrData`]: one DMR voice/data frame as a plain value (slot, source
//!   and destination ids, call type, data type, 33-byte payload)
//! - [`homebrew`]: the 55-byte `DMRD` packet codec and the four-letter
//!   link-control packet tags (`RPTL`, `RPTK`, `RPTACK`, ...)
//!
//! The same wire format serves DMR masters and XLX reflectors; what makes a
//! peer "XLX" is purely the traffic that flows over it, which is the
//! gateway engine's business, not this crate's.

pub mod error;
pub mod frame;
pub mod homebrew;

pub use error::ProtoError;
pub use frame::{DataType, DmrData, Flco, Slot, DMR_PAYLOAD_LENGTH};
