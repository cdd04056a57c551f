//! HomeBrew wire format
//!
//! The de-facto UDP protocol spoken between repeaters and DMR master
//! servers. Every packet opens with an ASCII tag; `DMRD` packets carry one
//! DMR frame, the rest drive the login handshake and keepalives.
//!
//! # DMRD layout
//!
//! ```text
//! 0        4     5        8        11        15     16         20        53      55
//! "DMRD" | seq | src(24) | dst(24) | rptr(32) | bits | stream id | payload | ber rssi
//! ```
//!
//! `bits` packs the slot (bit 7), the call type (bit 6), the frame type
//! (bits 4..=5) and either the data type or the voice sequence letter
//! (bits 0..=3). The trailing BER/RSSI bytes were added by MMDVMHost;
//! parsing accepts packets with or without them.

use crate::error::ProtoError;
use crate::frame::{DataType, DmrData, Flco, Slot, DMR_PAYLOAD_LENGTH};

/// Frame data: `DMRD`
pub const TAG_DMR_DATA: &[u8] = b"DMRD";
/// Repeater login, carries the repeater id: `RPTL`
pub const TAG_LOGIN: &[u8] = b"RPTL";
/// Login response to the salt challenge: `RPTK`
pub const TAG_AUTH: &[u8] = b"RPTK";
/// Repeater configuration blob: `RPTC`
pub const TAG_CONFIG: &[u8] = b"RPTC";
/// Options string: `RPTO`
pub const TAG_OPTIONS: &[u8] = b"RPTO";
/// Positive acknowledgement from the master: `RPTACK`
pub const TAG_ACK: &[u8] = b"RPTACK";
/// Negative acknowledgement from the master: `MSTNAK`
pub const TAG_NAK: &[u8] = b"MSTNAK";
/// Repeater keepalive: `RPTPING`
pub const TAG_PING: &[u8] = b"RPTPING";
/// Master keepalive reply: `MSTPONG`
pub const TAG_PONG: &[u8] = b"MSTPONG";
/// Master is closing the link: `MSTCL`
pub const TAG_MASTER_CLOSING: &[u8] = b"MSTCL";
/// Repeater is closing the link: `RPTCL`
pub const TAG_REPEATER_CLOSING: &[u8] = b"RPTCL";
/// GPS position report: `DMRG`
pub const TAG_POSITION: &[u8] = b"DMRG";
/// Talker alias report: `DMRA`
pub const TAG_TALKER_ALIAS: &[u8] = b"DMRA";

/// Length of an encoded `DMRD` packet including BER/RSSI
pub const DMRD_PACKET_LENGTH: usize = 55;

/// Minimum parseable `DMRD` packet (without BER/RSSI)
const DMRD_MIN_LENGTH: usize = 53;

// Data type values carried in the low nibble of a data-sync frame,
// per ETSI TS 102 361-1.
const DT_VOICE_PI_HEADER: u8 = 0x00;
const DT_VOICE_LC_HEADER: u8 = 0x01;
const DT_TERMINATOR_WITH_LC: u8 = 0x02;
const DT_CSBK: u8 = 0x03;
const DT_DATA_HEADER: u8 = 0x06;
const DT_RATE_12_DATA: u8 = 0x07;
const DT_RATE_34_DATA: u8 = 0x08;
const DT_IDLE: u8 = 0x09;
const DT_RATE_1_DATA: u8 = 0x0A;

/// Encode one frame into a `DMRD` packet
pub fn encode_dmr_data(data: &DmrData, repeater_id: u32) -> [u8; DMRD_PACKET_LENGTH] {
    let mut buffer = [0u8; DMRD_PACKET_LENGTH];

    buffer[0..4].copy_from_slice(TAG_DMR_DATA);
    buffer[4] = data.seq_no;
    buffer[5..8].copy_from_slice(&data.src_id.to_be_bytes()[1..]);
    buffer[8..11].copy_from_slice(&data.dst_id.to_be_bytes()[1..]);
    buffer[11..15].copy_from_slice(&repeater_id.to_be_bytes());

    let mut bits = 0u8;
    if data.slot == Slot::Slot2 {
        bits |= 0x80;
    }
    if data.flco == Flco::UserToUser {
        bits |= 0x40;
    }
    bits |= match data.data_type {
        DataType::Voice => 0x00,
        DataType::VoiceSync => 0x10,
        DataType::VoicePiHeader => 0x20 | DT_VOICE_PI_HEADER,
        DataType::VoiceLcHeader => 0x20 | DT_VOICE_LC_HEADER,
        DataType::TerminatorWithLc => 0x20 | DT_TERMINATOR_WITH_LC,
        DataType::Csbk => 0x20 | DT_CSBK,
        DataType::DataHeader => 0x20 | DT_DATA_HEADER,
        DataType::Rate12Data => 0x20 | DT_RATE_12_DATA,
        DataType::Rate34Data => 0x20 | DT_RATE_34_DATA,
        DataType::Idle => 0x20 | DT_IDLE,
        DataType::Rate1Data => 0x20 | DT_RATE_1_DATA,
    };
    if data.data_type == DataType::Voice {
        // Voice frames B..F carry their position in the superframe
        bits |= data.seq_no % 6;
    }
    buffer[15] = bits;

    buffer[16..20].copy_from_slice(&data.stream_id.to_be_bytes());
    buffer[20..20 + DMR_PAYLOAD_LENGTH].copy_from_slice(&data.payload);

    buffer
}

/// Decode a `DMRD` packet into a frame
///
/// Accepts packets with or without the trailing BER/RSSI bytes. Returns the
/// repeater id alongside the frame so callers can check the sender.
pub fn parse_dmr_data(packet: &[u8]) -> Result<(DmrData, u32), ProtoError> {
    if packet.len() < DMRD_MIN_LENGTH {
        return Err(ProtoError::Truncated {
            got: packet.len(),
            need: DMRD_MIN_LENGTH,
        });
    }

    if &packet[0..4] != TAG_DMR_DATA {
        let mut tag = [0u8; 4];
        tag.copy_from_slice(&packet[0..4]);
        return Err(ProtoError::BadTag(tag));
    }

    let seq_no = packet[4];
    let src_id = u32::from_be_bytes([0, packet[5], packet[6], packet[7]]);
    let dst_id = u32::from_be_bytes([0, packet[8], packet[9], packet[10]]);
    let repeater_id = u32::from_be_bytes([packet[11], packet[12], packet[13], packet[14]]);

    let bits = packet[15];
    let slot = if bits & 0x80 != 0 { Slot::Slot2 } else { Slot::Slot1 };
    let flco = if bits & 0x40 != 0 { Flco::UserToUser } else { Flco::Group };

    let data_type = match (bits >> 4) & 0x03 {
        0x00 => DataType::Voice,
        0x01 => DataType::VoiceSync,
        _ => match bits & 0x0F {
            DT_VOICE_PI_HEADER => DataType::VoicePiHeader,
            DT_VOICE_LC_HEADER => DataType::VoiceLcHeader,
            DT_TERMINATOR_WITH_LC => DataType::TerminatorWithLc,
            DT_CSBK => DataType::Csbk,
            DT_DATA_HEADER => DataType::DataHeader,
            DT_RATE_12_DATA => DataType::Rate12Data,
            DT_RATE_34_DATA => DataType::Rate34Data,
            DT_RATE_1_DATA => DataType::Rate1Data,
            _ => DataType::Idle,
        },
    };

    let stream_id = u32::from_be_bytes([packet[16], packet[17], packet[18], packet[19]]);

    let mut payload = [0u8; DMR_PAYLOAD_LENGTH];
    payload.copy_from_slice(&packet[20..20 + DMR_PAYLOAD_LENGTH]);

    Ok((
        DmrData {
            slot,
            src_id,
            dst_id,
            flco,
            data_type,
            stream_id,
            seq_no,
            payload,
        },
        repeater_id,
    ))
}

/// Whether a packet starts with the given tag
pub fn has_tag(packet: &[u8], tag: &[u8]) -> bool {
    packet.len() >= tag.len() && &packet[..tag.len()] == tag
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice_frame() -> DmrData {
        let mut payload = [0u8; DMR_PAYLOAD_LENGTH];
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte = i as u8;
        }
        DmrData {
            slot: Slot::Slot2,
            src_id: 2345678,
            dst_id: 9,
            flco: Flco::Group,
            data_type: DataType::VoiceSync,
            stream_id: 0x1234_5678,
            seq_no: 12,
            payload,
        }
    }

    #[test]
    fn dmr_data_encodes_addressing() {
        let packet = encode_dmr_data(&voice_frame(), 234567801);

        assert_eq!(&packet[0..4], b"DMRD");
        assert_eq!(packet[4], 12);
        assert_eq!(&packet[5..8], &2345678u32.to_be_bytes()[1..]);
        assert_eq!(&packet[8..11], &[0x00, 0x00, 0x09]);
        assert_eq!(&packet[11..15], &234567801u32.to_be_bytes());
        // Slot 2, group call, voice sync
        assert_eq!(packet[15], 0x90);
    }

    #[test]
    fn dmr_data_parse_inverts_encode() {
        let frame = voice_frame();
        let packet = encode_dmr_data(&frame, 234567801);

        let (parsed, repeater_id) = parse_dmr_data(&packet).unwrap();
        assert_eq!(parsed, frame);
        assert_eq!(repeater_id, 234567801);
    }

    #[test]
    fn terminator_bits_survive() {
        let mut frame = voice_frame();
        frame.flco = Flco::UserToUser;
        frame.data_type = DataType::TerminatorWithLc;
        frame.seq_no = 3;

        let packet = encode_dmr_data(&frame, 1);
        let (parsed, _) = parse_dmr_data(&packet).unwrap();

        assert_eq!(parsed.flco, Flco::UserToUser);
        assert_eq!(parsed.data_type, DataType::TerminatorWithLc);
    }

    #[test]
    fn short_packet_rejected() {
        let err = parse_dmr_data(&[0u8; 20]).unwrap_err();
        assert!(matches!(err, ProtoError::Truncated { got: 20, .. }));
    }

    #[test]
    fn wrong_tag_rejected() {
        let mut packet = encode_dmr_data(&voice_frame(), 1);
        packet[0..4].copy_from_slice(b"MSTX");
        assert!(matches!(
            parse_dmr_data(&packet),
            Err(ProtoError::BadTag(_))
        ));
    }

    #[test]
    fn tag_matching() {
        assert!(has_tag(b"RPTPING1234", TAG_PING));
        assert!(!has_tag(b"RPTP", TAG_PING));
        assert!(!has_tag(b"MSTNAK", TAG_PONG));
    }
}
