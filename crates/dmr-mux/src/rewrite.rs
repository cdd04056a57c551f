//! Frame rewriting between address spaces
//!
//! Each upstream network sees the repeater through its own addressing: a
//! talk-group block, a private-call id block, or a single fixed slot/TG
//! pair. A [`Rewrite`] is a pure transformer over one frame: it either
//! claims the frame (mutating its addressing in place) or leaves it
//! untouched. Rules are parameterised at construction and carry no state.
//!
//! Two ordered chains exist per DMR network, one per direction; the first
//! rule that claims a frame wins and the rest of the chain is skipped.
//! [`apply_first`] expresses that search once for all six call sites.
//!
//! Block mappings are uniform shifts: `result − toBase = input − fromBase`
//! for every id in the configured range.

use dmr_proto::{DmrData, Flco, Slot};
use tracing::trace;

/// A single rewrite rule
///
/// A closed set of five shapes; no rule types are added at runtime, so an
/// exhaustive match beats virtual dispatch here.
#[derive(Debug, Clone)]
pub enum Rewrite {
    /// Map a contiguous talk-group block between slots
    Tg(TgRewrite),
    /// Map a contiguous private-call destination block between slots
    Pc(PcRewrite),
    /// Turn one talk-group into a private call
    Type(TypeRewrite),
    /// Turn a source-id block into a talk-group
    Src(SrcRewrite),
    /// Fixed slot/TG pair mapping, used for the XLX voice path
    Bridge(BridgeRewrite),
}

impl Rewrite {
    /// Apply this rule to a frame
    ///
    /// Returns `true` and mutates the frame iff the rule matches. A
    /// non-matching frame is left exactly as it was.
    pub fn process(&self, data: &mut DmrData) -> bool {
        match self {
            Rewrite::Tg(r) => r.process(data),
            Rewrite::Pc(r) => r.process(data),
            Rewrite::Type(r) => r.process(data),
            Rewrite::Src(r) => r.process(data),
            Rewrite::Bridge(r) => r.process(data),
        }
    }
}

/// Apply the first matching rule of a chain
///
/// Returns `true` iff some rule claimed the frame. Later rules are not
/// evaluated once one matches.
pub fn apply_first(chain: &[Rewrite], data: &mut DmrData) -> bool {
    chain.iter().any(|rule| rule.process(data))
}

/// Talk-group block rewrite
///
/// Matches group calls on `from_slot` with a destination in
/// `[from_tg, from_tg + range)` and shifts them onto `to_slot` /
/// `to_tg + offset`.
#[derive(Debug, Clone)]
pub struct TgRewrite {
    name: String,
    from_slot: Slot,
    from_tg: u32,
    to_slot: Slot,
    to_tg: u32,
    range: u32,
}

impl TgRewrite {
    /// `range >= 1`; a range of 1 is a single TG mapping
    pub fn new(name: &str, from_slot: Slot, from_tg: u32, to_slot: Slot, to_tg: u32, range: u32) -> Self {
        debug_assert!(range >= 1);
        Self {
            name: name.to_string(),
            from_slot,
            from_tg,
            to_slot,
            to_tg,
            range,
        }
    }

    fn process(&self, data: &mut DmrData) -> bool {
        let matched = data.flco == Flco::Group
            && data.slot == self.from_slot
            && data.dst_id >= self.from_tg
            && data.dst_id < self.from_tg + self.range;
        if !matched {
            return false;
        }

        data.slot = self.to_slot;
        data.dst_id = self.to_tg + (data.dst_id - self.from_tg);
        trace!("{}, TG rewrite to {}:TG{}", self.name, data.slot, data.dst_id);
        true
    }
}

/// Private-call destination block rewrite
#[derive(Debug, Clone)]
pub struct PcRewrite {
    name: String,
    from_slot: Slot,
    from_id: u32,
    to_slot: Slot,
    to_id: u32,
    range: u32,
}

impl PcRewrite {
    /// `range >= 1`; a range of 1 is a single id mapping
    pub fn new(name: &str, from_slot: Slot, from_id: u32, to_slot: Slot, to_id: u32, range: u32) -> Self {
        debug_assert!(range >= 1);
        Self {
            name: name.to_string(),
            from_slot,
            from_id,
            to_slot,
            to_id,
            range,
        }
    }

    fn process(&self, data: &mut DmrData) -> bool {
        let matched = data.flco == Flco::UserToUser
            && data.slot == self.from_slot
            && data.dst_id >= self.from_id
            && data.dst_id < self.from_id + self.range;
        if !matched {
            return false;
        }

        data.slot = self.to_slot;
        data.dst_id = self.to_id + (data.dst_id - self.from_id);
        trace!("{}, PC rewrite to {}:{}", self.name, data.slot, data.dst_id);
        true
    }
}

/// Call-type rewrite: one talk-group becomes one private call
#[derive(Debug, Clone)]
pub struct TypeRewrite {
    name: String,
    from_slot: Slot,
    from_tg: u32,
    to_slot: Slot,
    to_id: u32,
}

impl TypeRewrite {
    pub fn new(name: &str, from_slot: Slot, from_tg: u32, to_slot: Slot, to_id: u32) -> Self {
        Self {
            name: name.to_string(),
            from_slot,
            from_tg,
            to_slot,
            to_id,
        }
    }

    fn process(&self, data: &mut DmrData) -> bool {
        let matched =
            data.flco == Flco::Group && data.slot == self.from_slot && data.dst_id == self.from_tg;
        if !matched {
            return false;
        }

        data.slot = self.to_slot;
        data.dst_id = self.to_id;
        data.flco = Flco::UserToUser;
        trace!("{}, type rewrite to {}:{}", self.name, data.slot, data.dst_id);
        true
    }
}

/// Source-id rewrite: traffic from an id block lands on one talk-group
///
/// Matches on the source rather than the destination, regardless of call
/// type; the result is always a group call.
#[derive(Debug, Clone)]
pub struct SrcRewrite {
    name: String,
    from_slot: Slot,
    from_id: u32,
    to_slot: Slot,
    to_tg: u32,
    range: u32,
}

impl SrcRewrite {
    /// `range >= 1`; a range of 1 is a single id mapping
    pub fn new(name: &str, from_slot: Slot, from_id: u32, to_slot: Slot, to_tg: u32, range: u32) -> Self {
        debug_assert!(range >= 1);
        Self {
            name: name.to_string(),
            from_slot,
            from_id,
            to_slot,
            to_tg,
            range,
        }
    }

    fn process(&self, data: &mut DmrData) -> bool {
        let matched = data.slot == self.from_slot
            && data.src_id >= self.from_id
            && data.src_id < self.from_id + self.range;
        if !matched {
            return false;
        }

        data.slot = self.to_slot;
        data.dst_id = self.to_tg;
        data.flco = Flco::Group;
        trace!("{}, src rewrite to {}:TG{}", self.name, data.slot, data.dst_id);
        true
    }
}

/// Fixed slot/TG bridge
///
/// Matches exactly one group slot/TG pair and maps it onto another; the
/// call stays a group call. The XLX voice path is a pair of these, one per
/// direction, created when the session opens.
#[derive(Debug, Clone)]
pub struct BridgeRewrite {
    name: String,
    from_slot: Slot,
    from_tg: u32,
    to_slot: Slot,
    to_tg: u32,
}

impl BridgeRewrite {
    pub fn new(name: &str, from_slot: Slot, from_tg: u32, to_slot: Slot, to_tg: u32) -> Self {
        Self {
            name: name.to_string(),
            from_slot,
            from_tg,
            to_slot,
            to_tg,
        }
    }

    fn process(&self, data: &mut DmrData) -> bool {
        let matched =
            data.flco == Flco::Group && data.slot == self.from_slot && data.dst_id == self.from_tg;
        if !matched {
            return false;
        }

        data.slot = self.to_slot;
        data.dst_id = self.to_tg;
        data.flco = Flco::Group;
        trace!("{}, bridged to {}:TG{}", self.name, data.slot, data.dst_id);
        true
    }
}
