//! DMR frame representation
//!
//! A [`DmrData`] is one 30 ms DMR burst plus the addressing taken from its
//! link control: which timeslot it belongs to, who sent it, who it is for,
//! and whether it is a group or a private transmission. Frames are plain
//! values; the gateway copies them on forward and never shares them.

/// Length of the air-interface payload carried in one frame
pub const DMR_PAYLOAD_LENGTH: usize = 33;

/// A DMR timeslot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// Timeslot 1
    Slot1,
    /// Timeslot 2
    Slot2,
}

impl Slot {
    /// Parse a slot from its on-air number (1 or 2)
    pub fn from_number(n: u32) -> Option<Self> {
        match n {
            1 => Some(Slot::Slot1),
            2 => Some(Slot::Slot2),
            _ => None,
        }
    }

    /// The on-air slot number
    pub fn number(&self) -> u32 {
        match self {
            Slot::Slot1 => 1,
            Slot::Slot2 => 2,
        }
    }

    /// Zero-based index, for slot-keyed tables
    pub fn index(&self) -> usize {
        match self {
            Slot::Slot1 => 0,
            Slot::Slot2 => 1,
        }
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Full Link Control Opcode: the DMR call type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flco {
    /// One-to-many (talk-group) call
    Group,
    /// One-to-one (private) call
    UserToUser,
}

/// The kind of burst a frame carries
///
/// Voice frames within a superframe are distinguished by their position
/// (`VoiceSync` for frame A, `Voice` for B..F); everything else comes from
/// the slot type field of a data burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Voice LC header, opens a voice transmission
    VoiceLcHeader,
    /// Privacy indicator header
    VoicePiHeader,
    /// Terminator with LC, closes a transmission
    TerminatorWithLc,
    /// Control signalling block
    Csbk,
    /// Data header
    DataHeader,
    /// Rate 1/2 data
    Rate12Data,
    /// Rate 3/4 data
    Rate34Data,
    /// Rate 1 data
    Rate1Data,
    /// Idle filler
    Idle,
    /// Voice frame A (carries the sync pattern)
    VoiceSync,
    /// Voice frames B through F
    Voice,
}

/// One DMR frame with its addressing
///
/// The payload is the raw 33-byte burst; the gateway never looks inside it,
/// it only rewrites the addressing around it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmrData {
    /// Timeslot the frame travels on
    pub slot: Slot,
    /// 24-bit source id
    pub src_id: u32,
    /// 24-bit destination id (a talk-group for group calls)
    pub dst_id: u32,
    /// Call type
    pub flco: Flco,
    /// Burst kind
    pub data_type: DataType,
    /// Identifies the transmission this frame belongs to
    pub stream_id: u32,
    /// Sequence number within the stream
    pub seq_no: u8,
    /// Raw air-interface payload
    pub payload: [u8; DMR_PAYLOAD_LENGTH],
}

impl DmrData {
    /// A frame with neutral addressing, for buffers that are filled by a
    /// peer's `read`
    pub fn new() -> Self {
        Self {
            slot: Slot::Slot1,
            src_id: 0,
            dst_id: 0,
            flco: Flco::Group,
            data_type: DataType::Idle,
            stream_id: 0,
            seq_no: 0,
            payload: [0u8; DMR_PAYLOAD_LENGTH],
        }
    }

    /// Whether this frame ends a transmission
    pub fn is_terminator(&self) -> bool {
        self.data_type == DataType::TerminatorWithLc
    }
}

impl Default for DmrData {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_numbering_round_trips() {
        assert_eq!(Slot::from_number(1), Some(Slot::Slot1));
        assert_eq!(Slot::from_number(2), Some(Slot::Slot2));
        assert_eq!(Slot::from_number(0), None);
        assert_eq!(Slot::from_number(3), None);

        assert_eq!(Slot::Slot1.number(), 1);
        assert_eq!(Slot::Slot2.number(), 2);
        assert_eq!(Slot::Slot1.index(), 0);
        assert_eq!(Slot::Slot2.index(), 1);
    }

    #[test]
    fn terminator_detection() {
        let mut data = DmrData::new();
        assert!(!data.is_terminator());

        data.data_type = DataType::TerminatorWithLc;
        assert!(data.is_terminator());
    }
}
