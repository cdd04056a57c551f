//! XLX reflector link control
//!
//! XLX reflectors speak the same wire protocol as any DMR master; what
//! makes them XLX is the traffic convention: voice flows on slot 2,
//! talk-group 9, and a private call to `base + n` means "link me to
//! reflector `4000 + n`". `base + 0` unlinks (reflector 4000 is "none").
//!
//! An [`XlxSession`] holds the per-reflector state: the repeater-side
//! primary slot/TG, the dial base, the currently linked reflector, and
//! whether the last link command changed it. A change is announced to
//! the repeater once the transmission that carried it ends.

use dmr_proto::{DmrData, Flco, Slot};
use tracing::info;

use crate::rewrite::{BridgeRewrite, Rewrite};

/// Slot XLX reflectors carry traffic on
pub const XLX_SLOT: Slot = Slot::Slot2;

/// Talk-group XLX reflectors carry traffic on
pub const XLX_TG: u32 = 9;

/// Number of dialable reflectors above the base (4001..=4026)
const REFLECTOR_COUNT: u32 = 26;

/// Reflector number meaning "not linked"
const REFLECTOR_NONE: u32 = 4000;

/// A committed link change, to be announced to the repeater
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkChange {
    /// The session dropped its reflector
    Unlinked,
    /// The session linked to this reflector
    Linked(u32),
}

/// State of one XLX reflector session
#[derive(Debug)]
pub struct XlxSession {
    name: String,
    slot: Slot,
    tg: u32,
    base: u32,
    reflector: u32,
    changed: bool,
    outbound: Rewrite,
    inbound: Rewrite,
}

impl XlxSession {
    /// `slot`/`tg` are the repeater-side pair this session bridges;
    /// `base` offsets the user-dialled link-control range
    pub fn new(name: &str, slot: Slot, tg: u32, base: u32) -> Self {
        Self {
            name: name.to_string(),
            slot,
            tg,
            base,
            reflector: REFLECTOR_NONE,
            changed: false,
            outbound: Rewrite::Bridge(BridgeRewrite::new(name, slot, tg, XLX_SLOT, XLX_TG)),
            inbound: Rewrite::Bridge(BridgeRewrite::new(name, XLX_SLOT, XLX_TG, slot, tg)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The repeater-side slot this session uses
    pub fn slot(&self) -> Slot {
        self.slot
    }

    /// The currently linked reflector (4000 when unlinked)
    pub fn reflector(&self) -> u32 {
        self.reflector
    }

    /// Whether a frame from the repeater is voice traffic for this session
    pub fn matches_voice(&self, data: &DmrData) -> bool {
        data.flco == Flco::Group && data.slot == self.slot && data.dst_id == self.tg
    }

    /// Whether a frame from the repeater is a link command for this session
    pub fn matches_link_control(&self, data: &DmrData) -> bool {
        data.flco == Flco::UserToUser
            && data.slot == self.slot
            && data.dst_id >= self.base
            && data.dst_id <= self.base + REFLECTOR_COUNT
    }

    /// Rewrite repeater voice onto the reflector slot/TG
    pub fn rewrite_outbound(&self, data: &mut DmrData) -> bool {
        self.outbound.process(data)
    }

    /// Rewrite reflector voice back onto the repeater slot/TG
    pub fn rewrite_inbound(&self, data: &mut DmrData) -> bool {
        self.inbound.process(data)
    }

    /// Interpret a link command addressed to `dst_id`
    ///
    /// Updates the linked reflector and arms the change flag when the
    /// request differs from the current link. The caller still forwards
    /// the frame to the reflector, which sees the command on the wire.
    pub fn apply_link_command(&mut self, dst_id: u32) {
        let requested = REFLECTOR_NONE + (dst_id - self.base);
        if requested == self.reflector {
            return;
        }

        if requested == REFLECTOR_NONE {
            info!("{}, Unlinking", self.name);
        } else {
            info!("{}, Linking to reflector {}", self.name, requested);
        }

        self.reflector = requested;
        self.changed = true;
    }

    /// Commit a pending link change at end of transmission
    ///
    /// Returns the announcement to play when the terminator closes a
    /// transmission that changed the link, clearing the change flag.
    pub fn take_link_change(&mut self) -> Option<LinkChange> {
        if !self.changed {
            return None;
        }
        self.changed = false;

        if self.reflector == REFLECTOR_NONE {
            Some(LinkChange::Unlinked)
        } else {
            Some(LinkChange::Linked(self.reflector))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dmr_proto::DataType;

    fn session() -> XlxSession {
        XlxSession::new("XLX-1", Slot::Slot1, 8, 64000)
    }

    fn frame(flco: Flco, slot: Slot, dst_id: u32) -> DmrData {
        DmrData {
            slot,
            src_id: 1234567,
            dst_id,
            flco,
            data_type: DataType::VoiceSync,
            ..DmrData::new()
        }
    }

    #[test]
    fn voice_pattern_is_primary_slot_and_tg() {
        let s = session();
        assert!(s.matches_voice(&frame(Flco::Group, Slot::Slot1, 8)));
        assert!(!s.matches_voice(&frame(Flco::Group, Slot::Slot2, 8)));
        assert!(!s.matches_voice(&frame(Flco::Group, Slot::Slot1, 9)));
        assert!(!s.matches_voice(&frame(Flco::UserToUser, Slot::Slot1, 8)));
    }

    #[test]
    fn link_control_range_is_inclusive() {
        let s = session();
        assert!(s.matches_link_control(&frame(Flco::UserToUser, Slot::Slot1, 64000)));
        assert!(s.matches_link_control(&frame(Flco::UserToUser, Slot::Slot1, 64026)));
        assert!(!s.matches_link_control(&frame(Flco::UserToUser, Slot::Slot1, 63999)));
        assert!(!s.matches_link_control(&frame(Flco::UserToUser, Slot::Slot1, 64027)));
        assert!(!s.matches_link_control(&frame(Flco::Group, Slot::Slot1, 64005)));
    }

    #[test]
    fn link_command_maps_base_offset_to_reflector() {
        let mut s = session();
        s.apply_link_command(64005);
        assert_eq!(s.reflector(), 4005);
        assert_eq!(s.take_link_change(), Some(LinkChange::Linked(4005)));
    }

    #[test]
    fn unlink_command_resets_to_4000() {
        let mut s = session();
        s.apply_link_command(64005);
        s.take_link_change();

        s.apply_link_command(64000);
        assert_eq!(s.reflector(), 4000);
        assert_eq!(s.take_link_change(), Some(LinkChange::Unlinked));
    }

    #[test]
    fn repeated_command_does_not_rearm_announcement() {
        let mut s = session();
        s.apply_link_command(64005);
        assert_eq!(s.take_link_change(), Some(LinkChange::Linked(4005)));

        // Same reflector again: no change, nothing to announce
        s.apply_link_command(64005);
        assert_eq!(s.take_link_change(), None);
    }

    #[test]
    fn voice_round_trip_restores_addressing() {
        let s = session();

        let mut data = frame(Flco::Group, Slot::Slot1, 8);
        assert!(s.rewrite_outbound(&mut data));
        assert_eq!(data.slot, XLX_SLOT);
        assert_eq!(data.dst_id, XLX_TG);

        assert!(s.rewrite_inbound(&mut data));
        assert_eq!(data.slot, Slot::Slot1);
        assert_eq!(data.dst_id, 8);
    }
}
