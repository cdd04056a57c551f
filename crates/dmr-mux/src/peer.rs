//! Peer contracts
//!
//! A peer is the minimum bidirectional frame channel the dispatcher
//! needs. Peers are polled, never event-driven: every call returns
//! promptly, and the dispatcher alone decides when anything runs. I/O
//! errors after startup are the peer's problem; it reconnects from its
//! own `clock` and the engine only ever sees "no frame".

use dmr_proto::DmrData;

use crate::error::GatewayError;

/// Non-blocking bidirectional frame channel
pub trait Peer {
    /// Bring the peer up; called once at startup, failure aborts the run
    fn open(&mut self) -> Result<(), GatewayError>;

    /// Dequeue one frame into `data`; `true` iff a frame was available
    fn read(&mut self, data: &mut DmrData) -> bool;

    /// Enqueue one frame; may drop under backpressure, the dispatcher
    /// does not retry
    fn write(&mut self, data: &DmrData) -> bool;

    /// Advance internal timers: keepalives, retries, reconnects
    fn clock(&mut self, ms: u64);

    /// Tear the peer down, releasing its sockets
    fn close(&mut self);
}

/// The repeater-facing peer
///
/// Beyond frames, the modem link is the source of the repeater identity
/// (the configuration blob the masters authenticate against) and of the
/// out-of-band position and talker-alias streams.
pub trait ModemPeer: Peer {
    /// The repeater's numeric DMR id (0 until the repeater has logged in)
    fn id(&self) -> u32;

    /// The repeater configuration blob, once received
    fn config(&self) -> Option<Vec<u8>>;

    /// The options string announced by the repeater, if any
    fn options(&self) -> String;

    /// Dequeue one pending position report
    fn read_position(&mut self) -> Option<Vec<u8>>;

    /// Dequeue one pending talker-alias report
    fn read_talker_alias(&mut self) -> Option<Vec<u8>>;
}

/// A master-facing peer (DMR network or XLX reflector)
pub trait NetworkPeer: Peer {
    /// Install the repeater configuration blob used to authenticate
    fn set_config(&mut self, config: &[u8]);

    /// Install the options string sent after login
    fn set_options(&mut self, options: &str);

    /// Forward a position report; no rewrite, no slot interaction
    fn write_position(&mut self, data: &[u8]) -> bool;

    /// Forward a talker-alias report; no rewrite, no slot interaction
    fn write_talker_alias(&mut self, data: &[u8]) -> bool;
}

/// A local source of announcement frames played back to the repeater
///
/// `read` must return without blocking even when nothing is queued; the
/// dispatcher polls it every tick.
pub trait VoiceSource {
    /// Load the vocabulary; failure disables announcements for the run
    fn open(&mut self) -> Result<(), GatewayError>;

    /// Dequeue the next due announcement frame
    fn read(&mut self, data: &mut DmrData) -> bool;

    /// Advance playback pacing
    fn clock(&mut self, ms: u64);

    /// Queue a "linked to reflector N" announcement
    fn linked_to(&mut self, reflector: u32);

    /// Queue a "not linked" announcement
    fn unlinked(&mut self);
}
