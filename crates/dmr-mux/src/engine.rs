//! The gateway dispatcher
//!
//! A single cooperative loop body. One [`Gateway::tick`] polls every peer
//! once, routes what it finds through the direction-appropriate rewrite
//! chains, enforces slot ownership, and advances every timer. The caller
//! owns pacing: measure elapsed wall-clock time, call `tick(ms)`, sleep.
//!
//! Within a tick the read sources are polled in priority order: modem,
//! XLX-1, XLX-2, DMR-1, DMR-2, then the voice sources. Slot-ownership
//! checks gate the DMR paths, the network-to-modem paths and voice
//! playback; modem-originated XLX traffic asserts ownership
//! unconditionally, since the repeater is already transmitting it and
//! there is nothing left to protect.

use dmr_proto::{DmrData, Flco, Slot};
use tracing::{debug, warn};

use crate::peer::{ModemPeer, NetworkPeer, Peer, VoiceSource};
use crate::rewrite::{apply_first, Rewrite};
use crate::slot::{SlotOwner, SlotState};
use crate::xlx::{LinkChange, XlxSession, XLX_SLOT};

/// A DMR master connection with its two rewrite chains
struct DmrNetwork {
    peer: Box<dyn NetworkPeer>,
    rf_rewrites: Vec<Rewrite>,
    net_rewrites: Vec<Rewrite>,
    owner: SlotOwner,
}

/// An XLX reflector connection with its session state and optional
/// announcement source
struct XlxBridge {
    peer: Box<dyn NetworkPeer>,
    session: XlxSession,
    voice: Option<Box<dyn VoiceSource>>,
    owner: SlotOwner,
}

/// The dispatch-and-rewrite engine
///
/// Owns the modem peer, up to four network peers, the per-network rewrite
/// chains, both slot states and the XLX sessions. All state lives here;
/// there is no concurrency to reason about.
pub struct Gateway {
    modem: Box<dyn ModemPeer>,
    dmr1: Option<DmrNetwork>,
    dmr2: Option<DmrNetwork>,
    xlx1: Option<XlxBridge>,
    xlx2: Option<XlxBridge>,
    slots: [SlotState; 2],
}

impl Gateway {
    /// `timeout_secs` is the per-slot inactivity timeout
    pub fn new(modem: Box<dyn ModemPeer>, timeout_secs: u64) -> Self {
        let timeout_ms = timeout_secs * 1000;
        Self {
            modem,
            dmr1: None,
            dmr2: None,
            xlx1: None,
            xlx2: None,
            slots: [SlotState::new(timeout_ms), SlotState::new(timeout_ms)],
        }
    }

    /// Attach DMR master 1 with its ordered rewrite chains
    pub fn set_dmr1(&mut self, peer: Box<dyn NetworkPeer>, rf: Vec<Rewrite>, net: Vec<Rewrite>) {
        self.dmr1 = Some(DmrNetwork {
            peer,
            rf_rewrites: rf,
            net_rewrites: net,
            owner: SlotOwner::DmrNet1,
        });
    }

    /// Attach DMR master 2 with its ordered rewrite chains
    pub fn set_dmr2(&mut self, peer: Box<dyn NetworkPeer>, rf: Vec<Rewrite>, net: Vec<Rewrite>) {
        self.dmr2 = Some(DmrNetwork {
            peer,
            rf_rewrites: rf,
            net_rewrites: net,
            owner: SlotOwner::DmrNet2,
        });
    }

    /// Attach XLX reflector 1
    pub fn set_xlx1(
        &mut self,
        peer: Box<dyn NetworkPeer>,
        session: XlxSession,
        voice: Option<Box<dyn VoiceSource>>,
    ) {
        self.xlx1 = Some(XlxBridge {
            peer,
            session,
            voice,
            owner: SlotOwner::XlxRefl1,
        });
    }

    /// Attach XLX reflector 2
    pub fn set_xlx2(
        &mut self,
        peer: Box<dyn NetworkPeer>,
        session: XlxSession,
        voice: Option<Box<dyn VoiceSource>>,
    ) {
        self.xlx2 = Some(XlxBridge {
            peer,
            session,
            voice,
            owner: SlotOwner::XlxRefl2,
        });
    }

    /// The XLX-1 session, if configured
    pub fn xlx1(&self) -> Option<&XlxSession> {
        self.xlx1.as_ref().map(|x| &x.session)
    }

    /// The XLX-2 session, if configured
    pub fn xlx2(&self) -> Option<&XlxSession> {
        self.xlx2.as_ref().map(|x| &x.session)
    }

    /// Current owner of a repeater slot
    pub fn slot_owner(&self, slot: Slot) -> Option<SlotOwner> {
        self.slots[slot.index()].owner()
    }

    /// One iteration of the dispatch loop
    ///
    /// `ms` is the wall-clock time elapsed since the previous tick and
    /// drives every timer in the system.
    pub fn tick(&mut self, ms: u64) {
        self.route_from_modem();

        if let Some(bridge) = self.xlx1.as_mut() {
            Self::xlx_to_modem(bridge, &mut self.slots, &mut *self.modem);
        }
        if let Some(bridge) = self.xlx2.as_mut() {
            Self::xlx_to_modem(bridge, &mut self.slots, &mut *self.modem);
        }
        if let Some(net) = self.dmr1.as_mut() {
            Self::dmr_to_modem(net, &mut self.slots, &mut *self.modem);
        }
        if let Some(net) = self.dmr2.as_mut() {
            Self::dmr_to_modem(net, &mut self.slots, &mut *self.modem);
        }

        self.forward_metadata();

        if let Some(bridge) = self.xlx1.as_mut() {
            Self::poll_voice(bridge, &mut self.slots, &mut *self.modem);
        }
        if let Some(bridge) = self.xlx2.as_mut() {
            Self::poll_voice(bridge, &mut self.slots, &mut *self.modem);
        }

        self.clock(ms);
    }

    /// Close every peer, releasing their sockets
    pub fn close(&mut self) {
        self.modem.close();
        if let Some(net) = self.dmr1.as_mut() {
            net.peer.close();
        }
        if let Some(net) = self.dmr2.as_mut() {
            net.peer.close();
        }
        if let Some(bridge) = self.xlx1.as_mut() {
            bridge.peer.close();
        }
        if let Some(bridge) = self.xlx2.as_mut() {
            bridge.peer.close();
        }
    }

    /// Step 1: one frame from the repeater, routed to the first taker
    fn route_from_modem(&mut self) {
        let mut data = DmrData::new();
        if !self.modem.read(&mut data) {
            return;
        }

        // XLX voice and link control come first and assert ownership
        // unconditionally; the claim is keyed by the slot the frame
        // arrived on, before any rewrite moves it.
        if let Some(bridge) = self.xlx1.as_mut() {
            if bridge.session.matches_voice(&data) {
                let claimed = data.slot;
                bridge.session.rewrite_outbound(&mut data);
                bridge.peer.write(&data);
                self.slots[claimed.index()].claim(bridge.owner);
                return;
            }
        }

        if let Some(bridge) = self.xlx2.as_mut() {
            if bridge.session.matches_voice(&data) {
                let claimed = data.slot;
                bridge.session.rewrite_outbound(&mut data);
                bridge.peer.write(&data);
                self.slots[claimed.index()].claim(bridge.owner);
                return;
            }
        }

        if let Some(bridge) = self.xlx1.as_mut() {
            if bridge.session.matches_link_control(&data) {
                Self::link_control(bridge, &mut self.slots, &mut data);
                return;
            }
        }

        if let Some(bridge) = self.xlx2.as_mut() {
            if bridge.session.matches_link_control(&data) {
                Self::link_control(bridge, &mut self.slots, &mut data);
                return;
            }
        }

        // DMR chains: a match on network 1 settles the frame's fate even
        // when ownership then suppresses it; network 2 is not consulted.
        if let Some(net) = self.dmr1.as_mut() {
            if apply_first(&net.rf_rewrites, &mut data) {
                let index = data.slot.index();
                if self.slots[index].permits(net.owner) {
                    net.peer.write(&data);
                    self.slots[index].claim(net.owner);
                }
                return;
            }
        }

        if let Some(net) = self.dmr2.as_mut() {
            if apply_first(&net.rf_rewrites, &mut data) {
                let index = data.slot.index();
                if self.slots[index].permits(net.owner) {
                    net.peer.write(&data);
                    self.slots[index].claim(net.owner);
                }
                return;
            }
        }

        // No taker: by design, not an error
        debug!(
            "No route for RF frame on slot {} {}{}",
            data.slot,
            if data.flco == Flco::Group { "TG" } else { "" },
            data.dst_id
        );
    }

    /// A link command from the repeater: update the session, forward the
    /// frame on the reflector slot, and queue an announcement once the
    /// transmission carrying the command ends
    fn link_control(bridge: &mut XlxBridge, slots: &mut [SlotState; 2], data: &mut DmrData) {
        let claimed = data.slot;

        bridge.session.apply_link_command(data.dst_id);

        data.slot = XLX_SLOT;
        bridge.peer.write(data);
        slots[claimed.index()].claim(bridge.owner);

        if let Some(voice) = bridge.voice.as_mut() {
            if data.is_terminator() {
                match bridge.session.take_link_change() {
                    Some(LinkChange::Unlinked) => voice.unlinked(),
                    Some(LinkChange::Linked(reflector)) => voice.linked_to(reflector),
                    None => {}
                }
            }
        }
    }

    /// Step 2 (XLX): one frame from a reflector back to the repeater
    fn xlx_to_modem(bridge: &mut XlxBridge, slots: &mut [SlotState; 2], modem: &mut dyn ModemPeer) {
        let mut data = DmrData::new();
        if !bridge.peer.read(&mut data) {
            return;
        }

        let slot = bridge.session.slot();
        if !slots[slot.index()].permits(bridge.owner) {
            return;
        }

        if bridge.session.rewrite_inbound(&mut data) {
            modem.write(&data);
            slots[slot.index()].claim(bridge.owner);
        } else {
            warn!(
                "{}, Unexpected data from slot {} {}{}",
                bridge.session.name(),
                data.slot,
                if data.flco == Flco::Group { "TG" } else { "" },
                data.dst_id
            );
        }
    }

    /// Step 2 (DMR): one frame from a master back to the repeater
    fn dmr_to_modem(net: &mut DmrNetwork, slots: &mut [SlotState; 2], modem: &mut dyn ModemPeer) {
        let mut data = DmrData::new();
        if !net.peer.read(&mut data) {
            return;
        }

        if !apply_first(&net.net_rewrites, &mut data) {
            return;
        }

        let index = data.slot.index();
        if slots[index].permits(net.owner) {
            modem.write(&data);
            slots[index].claim(net.owner);
        }
    }

    /// Step 3: broadcast position and talker-alias reports to every
    /// network; no rewrite, no slot interaction
    fn forward_metadata(&mut self) {
        if let Some(report) = self.modem.read_position() {
            if let Some(bridge) = self.xlx1.as_mut() {
                bridge.peer.write_position(&report);
            }
            if let Some(bridge) = self.xlx2.as_mut() {
                bridge.peer.write_position(&report);
            }
            if let Some(net) = self.dmr1.as_mut() {
                net.peer.write_position(&report);
            }
            if let Some(net) = self.dmr2.as_mut() {
                net.peer.write_position(&report);
            }
        }

        if let Some(report) = self.modem.read_talker_alias() {
            if let Some(bridge) = self.xlx1.as_mut() {
                bridge.peer.write_talker_alias(&report);
            }
            if let Some(bridge) = self.xlx2.as_mut() {
                bridge.peer.write_talker_alias(&report);
            }
            if let Some(net) = self.dmr1.as_mut() {
                net.peer.write_talker_alias(&report);
            }
            if let Some(net) = self.dmr2.as_mut() {
                net.peer.write_talker_alias(&report);
            }
        }
    }

    /// Step 4: one pending announcement frame per voice source
    fn poll_voice(bridge: &mut XlxBridge, slots: &mut [SlotState; 2], modem: &mut dyn ModemPeer) {
        let Some(voice) = bridge.voice.as_mut() else {
            return;
        };

        let mut data = DmrData::new();
        if voice.read(&mut data) {
            modem.write(&data);
            slots[bridge.session.slot().index()].claim(bridge.owner);
        }
    }

    /// Step 5: advance every peer, voice source and slot timer
    fn clock(&mut self, ms: u64) {
        self.modem.clock(ms);

        if let Some(net) = self.dmr1.as_mut() {
            net.peer.clock(ms);
        }
        if let Some(net) = self.dmr2.as_mut() {
            net.peer.clock(ms);
        }
        if let Some(bridge) = self.xlx1.as_mut() {
            bridge.peer.clock(ms);
            if let Some(voice) = bridge.voice.as_mut() {
                voice.clock(ms);
            }
        }
        if let Some(bridge) = self.xlx2.as_mut() {
            bridge.peer.clock(ms);
            if let Some(voice) = bridge.voice.as_mut() {
                voice.clock(ms);
            }
        }

        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(owner) = slot.clock(ms) {
                debug!("Slot {} released by {}", index + 1, owner);
            }
        }
    }
}
