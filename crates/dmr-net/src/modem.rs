//! MMDVM repeater link
//!
//! The gateway plays master to the repeater's MMDVMHost: it answers the
//! repeater's `RPTL`/`RPTK`/`RPTC` handshake, keeps the configuration
//! blob and options string the repeater announces (the DMR masters are
//! authenticated with that same blob later), answers `RPTPING` with
//! `MSTPONG`, and exchanges `DMRD` frames. `DMRG` and `DMRA` packets
//! carry the out-of-band position and talker-alias reports.
//!
//! The peer address is fixed by configuration; packets from anywhere
//! else are ignored.

use std::collections::VecDeque;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use rand::Rng;
use tracing::{debug, info, trace, warn};

use dmr_mux::{GatewayError, ModemPeer, Peer};
use dmr_proto::homebrew::{
    encode_dmr_data, has_tag, parse_dmr_data, TAG_ACK, TAG_AUTH, TAG_CONFIG, TAG_DMR_DATA,
    TAG_LOGIN, TAG_OPTIONS, TAG_PING, TAG_PONG, TAG_POSITION, TAG_REPEATER_CLOSING,
    TAG_TALKER_ALIAS,
};
use dmr_proto::DmrData;

use crate::RX_QUEUE_DEPTH;

/// The repeater-facing peer
pub struct MmdvmNetwork {
    rpt_address: String,
    rpt_port: u16,
    local_address: String,
    local_port: u16,
    debug: bool,

    socket: Option<UdpSocket>,
    rpt_addr: Option<SocketAddr>,
    salt: [u8; 4],

    id: u32,
    config: Vec<u8>,
    options: String,
    logged_in: bool,

    rx_queue: VecDeque<DmrData>,
    positions: VecDeque<Vec<u8>>,
    aliases: VecDeque<Vec<u8>>,
}

impl MmdvmNetwork {
    pub fn new(rpt_address: &str, rpt_port: u16, local_address: &str, local_port: u16, debug: bool) -> Self {
        Self {
            rpt_address: rpt_address.to_string(),
            rpt_port,
            local_address: local_address.to_string(),
            local_port,
            debug,
            socket: None,
            rpt_addr: None,
            salt: [0u8; 4],
            id: 0,
            config: Vec::new(),
            options: String::new(),
            logged_in: false,
            rx_queue: VecDeque::new(),
            positions: VecDeque::new(),
            aliases: VecDeque::new(),
        }
    }

    /// The address this peer bound, for diagnostics and tests
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    fn send(&self, payload: &[u8]) {
        let (Some(socket), Some(addr)) = (self.socket.as_ref(), self.rpt_addr) else {
            return;
        };
        if self.debug {
            trace!("MMDVM, TX {} bytes", payload.len());
        }
        if let Err(e) = socket.send_to(payload, addr) {
            warn!("MMDVM, send error: {}", e);
        }
    }

    fn send_ack(&self, with_salt: bool) {
        let mut packet = TAG_ACK.to_vec();
        if with_salt {
            packet.extend_from_slice(&self.salt);
        }
        self.send(&packet);
    }

    fn handle_packet(&mut self, packet: &[u8]) {
        if has_tag(packet, TAG_DMR_DATA) {
            if !self.logged_in {
                return;
            }
            match parse_dmr_data(packet) {
                Ok((data, _repeater_id)) => {
                    if self.rx_queue.len() >= RX_QUEUE_DEPTH {
                        debug!("MMDVM, RX queue full, dropping oldest frame");
                        self.rx_queue.pop_front();
                    }
                    self.rx_queue.push_back(data);
                }
                Err(e) => warn!("MMDVM, undecodable DMRD packet: {}", e),
            }
        } else if has_tag(packet, TAG_PING) {
            self.send(TAG_PONG);
        } else if has_tag(packet, TAG_LOGIN) {
            if packet.len() >= TAG_LOGIN.len() + 4 {
                let body = &packet[TAG_LOGIN.len()..];
                self.id = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
            }
            info!("MMDVM, Repeater {} logging in", self.id);
            self.send_ack(true);
        } else if has_tag(packet, TAG_AUTH) {
            // The repeater is on a trusted local link; the answer is not
            // checked, the handshake is completed for protocol's sake
            self.send_ack(false);
        } else if has_tag(packet, TAG_REPEATER_CLOSING) {
            // Checked ahead of RPTC, which is its prefix
            warn!("MMDVM, Repeater is closing down");
            self.logged_in = false;
            self.config.clear();
        } else if has_tag(packet, TAG_CONFIG) {
            self.config = packet[TAG_CONFIG.len()..].to_vec();
            self.logged_in = true;
            info!("MMDVM, Repeater configuration received ({} bytes)", self.config.len());
            self.send_ack(false);
        } else if has_tag(packet, TAG_OPTIONS) {
            let body = &packet[TAG_OPTIONS.len()..];
            // Options may be prefixed by the repeater id
            let text = if body.len() >= 4 { &body[4..] } else { body };
            self.options = String::from_utf8_lossy(text).trim_end_matches('\0').to_string();
            self.send_ack(false);
        } else if has_tag(packet, TAG_POSITION) {
            self.positions.push_back(packet[TAG_POSITION.len()..].to_vec());
        } else if has_tag(packet, TAG_TALKER_ALIAS) {
            self.aliases.push_back(packet[TAG_TALKER_ALIAS.len()..].to_vec());
        } else if self.debug {
            debug!("MMDVM, Unknown packet of {} bytes", packet.len());
        }
    }

    fn drain_socket(&mut self) {
        let mut buffer = [0u8; 512];
        loop {
            let Some(socket) = self.socket.as_ref() else {
                return;
            };
            match socket.recv_from(&mut buffer) {
                Ok((len, from)) => {
                    if Some(from) != self.rpt_addr {
                        debug!("MMDVM, Packet from unknown source {}", from);
                        continue;
                    }
                    let packet = buffer[..len].to_vec();
                    self.handle_packet(&packet);
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    warn!("MMDVM, recv error: {}", e);
                    return;
                }
            }
        }
    }
}

impl Peer for MmdvmNetwork {
    fn open(&mut self) -> Result<(), GatewayError> {
        let rpt_addr = (self.rpt_address.as_str(), self.rpt_port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| GatewayError::Open(format!("MMDVM: cannot resolve {}", self.rpt_address)))?;

        let socket = UdpSocket::bind((self.local_address.as_str(), self.local_port))?;
        socket.set_nonblocking(true)?;

        self.salt = rand::rng().random();

        info!("MMDVM, Listening on {}:{}", self.local_address, self.local_port);

        self.socket = Some(socket);
        self.rpt_addr = Some(rpt_addr);

        Ok(())
    }

    fn read(&mut self, data: &mut DmrData) -> bool {
        match self.rx_queue.pop_front() {
            Some(frame) => {
                *data = frame;
                true
            }
            None => false,
        }
    }

    fn write(&mut self, data: &DmrData) -> bool {
        if !self.logged_in {
            return false;
        }
        let packet = encode_dmr_data(data, self.id);
        self.send(&packet);
        true
    }

    fn clock(&mut self, _ms: u64) {
        if self.socket.is_some() {
            self.drain_socket();
        }
    }

    fn close(&mut self) {
        self.socket = None;
        self.rpt_addr = None;
        self.logged_in = false;
        self.rx_queue.clear();
        info!("MMDVM, Closed");
    }
}

impl ModemPeer for MmdvmNetwork {
    fn id(&self) -> u32 {
        self.id
    }

    fn config(&self) -> Option<Vec<u8>> {
        if self.config.is_empty() {
            None
        } else {
            Some(self.config.clone())
        }
    }

    fn options(&self) -> String {
        self.options.clone()
    }

    fn read_position(&mut self) -> Option<Vec<u8>> {
        self.positions.pop_front()
    }

    fn read_talker_alias(&mut self) -> Option<Vec<u8>> {
        self.aliases.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dmr_proto::{DataType, Flco, Slot};
    use std::time::Duration;

    /// A scripted repeater on a loopback socket
    struct Repeater {
        socket: UdpSocket,
        gateway: SocketAddr,
    }

    impl Repeater {
        fn send(&self, payload: &[u8]) {
            self.socket.send_to(payload, self.gateway).unwrap();
        }

        fn recv(&self) -> Vec<u8> {
            let mut buffer = [0u8; 512];
            let (len, _) = self.socket.recv_from(&mut buffer).unwrap();
            buffer[..len].to_vec()
        }
    }

    fn settle() {
        std::thread::sleep(Duration::from_millis(30));
    }

    /// Bind the modem peer and a scripted repeater that has completed the
    /// login handshake
    fn connected_pair() -> (MmdvmNetwork, Repeater) {
        // The repeater socket is bound first so the peer can be pointed
        // at its port
        let repeater_socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        repeater_socket
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let rpt_port = repeater_socket.local_addr().unwrap().port();

        let mut modem = MmdvmNetwork::new("127.0.0.1", rpt_port, "127.0.0.1", 0, false);
        modem.open().unwrap();

        let repeater = Repeater {
            socket: repeater_socket,
            gateway: modem.local_addr().unwrap(),
        };

        // Login
        let mut login = b"RPTL".to_vec();
        login.extend_from_slice(&234567801u32.to_be_bytes());
        repeater.send(&login);
        settle();
        modem.clock(10);

        let ack = repeater.recv();
        assert_eq!(&ack[..6], b"RPTACK");
        assert_eq!(ack.len(), 10, "login ACK carries the salt");

        // Authorisation
        repeater.send(b"RPTK00000000");
        settle();
        modem.clock(10);
        assert_eq!(&repeater.recv()[..6], b"RPTACK");

        // Configuration
        let mut config = b"RPTC".to_vec();
        config.extend_from_slice(b"CALLSIGN 435.000");
        repeater.send(&config);
        settle();
        modem.clock(10);
        assert_eq!(&repeater.recv()[..6], b"RPTACK");

        assert_eq!(modem.id(), 234567801);
        assert_eq!(modem.config(), Some(b"CALLSIGN 435.000".to_vec()));

        (modem, repeater)
    }

    #[test]
    fn repeater_login_captures_id_and_config() {
        let _ = connected_pair();
    }

    #[test]
    fn frames_flow_both_ways() {
        let (mut modem, repeater) = connected_pair();

        let frame = DmrData {
            slot: Slot::Slot1,
            src_id: 1234567,
            dst_id: 8,
            flco: Flco::Group,
            data_type: DataType::VoiceLcHeader,
            stream_id: 7,
            ..DmrData::new()
        };

        // Repeater to gateway
        repeater.send(&encode_dmr_data(&frame, 234567801));
        settle();
        modem.clock(10);

        let mut received = DmrData::new();
        assert!(modem.read(&mut received));
        assert_eq!(received, frame);

        // Gateway to repeater
        assert!(modem.write(&frame));
        let (decoded, _) = parse_dmr_data(&repeater.recv()).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn ping_is_answered_with_pong() {
        let (mut modem, repeater) = connected_pair();

        repeater.send(b"RPTPING");
        settle();
        modem.clock(10);

        assert_eq!(&repeater.recv()[..7], b"MSTPONG");
    }

    #[test]
    fn position_and_alias_reports_are_queued() {
        let (mut modem, repeater) = connected_pair();

        repeater.send(b"DMRGposition-report");
        repeater.send(b"DMRAalias-report");
        settle();
        modem.clock(10);

        assert_eq!(modem.read_position(), Some(b"position-report".to_vec()));
        assert_eq!(modem.read_position(), None);
        assert_eq!(modem.read_talker_alias(), Some(b"alias-report".to_vec()));
    }

    #[test]
    fn frames_before_login_are_ignored() {
        let probe = UdpSocket::bind("127.0.0.1:0").unwrap();
        let rpt_port = probe.local_addr().unwrap().port();

        let mut modem = MmdvmNetwork::new("127.0.0.1", rpt_port, "127.0.0.1", 0, false);
        modem.open().unwrap();

        probe
            .send_to(
                &encode_dmr_data(&DmrData::new(), 1),
                modem.local_addr().unwrap(),
            )
            .unwrap();
        settle();
        modem.clock(10);

        let mut data = DmrData::new();
        assert!(!modem.read(&mut data));
        assert!(modem.config().is_none());
    }
}
