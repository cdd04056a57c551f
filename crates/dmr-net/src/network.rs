//! HomeBrew master client
//!
//! Connects the gateway to a DMR master server or XLX reflector. The
//! handshake runs `RPTL` (login) → `RPTK` (SHA-256 of the master's salt
//! and the password) → `RPTC` (the repeater configuration blob), after
//! which the link carries `DMRD` frames and 5-second `RPTPING`
//! keepalives. A `MSTNAK` or 60 seconds of silence restarts the
//! handshake; a retry timer paces re-login attempts at 10-second
//! intervals so a dead master is not hammered.

use std::collections::VecDeque;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use sha2::{Digest, Sha256};
use tracing::{debug, info, trace, warn};

use dmr_mux::{GatewayError, NetworkPeer, Peer, Timer};
use dmr_proto::homebrew::{
    encode_dmr_data, has_tag, parse_dmr_data, TAG_ACK, TAG_AUTH, TAG_CONFIG, TAG_DMR_DATA,
    TAG_LOGIN, TAG_MASTER_CLOSING, TAG_NAK, TAG_OPTIONS, TAG_PING, TAG_PONG, TAG_POSITION,
    TAG_REPEATER_CLOSING, TAG_TALKER_ALIAS,
};
use dmr_proto::DmrData;

use crate::RX_QUEUE_DEPTH;

const RETRY_INTERVAL_MS: u64 = 10_000;
const PING_INTERVAL_MS: u64 = 5_000;
const DEAD_LINK_MS: u64 = 60_000;

/// Handshake progress of the master link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    Closed,
    WaitingLogin,
    WaitingAuthorisation,
    WaitingConfig,
    Running,
}

/// A connection to one HomeBrew master or XLX reflector
pub struct HomebrewNetwork {
    name: String,
    remote: String,
    port: u16,
    local_port: u16,
    id: u32,
    password: String,
    debug: bool,

    socket: Option<UdpSocket>,
    remote_addr: Option<SocketAddr>,
    state: LinkState,
    config: Vec<u8>,
    options: String,

    rx_queue: VecDeque<DmrData>,
    retry_timer: Timer,
    ping_timer: Timer,
    silent_ms: u64,
}

impl HomebrewNetwork {
    /// `local_port` 0 binds an ephemeral port
    pub fn new(name: &str, remote: &str, port: u16, local_port: u16, id: u32, password: &str, debug: bool) -> Self {
        Self {
            name: name.to_string(),
            remote: remote.to_string(),
            port,
            local_port,
            id,
            password: password.to_string(),
            debug,
            socket: None,
            remote_addr: None,
            state: LinkState::Closed,
            config: Vec::new(),
            options: String::new(),
            rx_queue: VecDeque::new(),
            retry_timer: Timer::new(RETRY_INTERVAL_MS),
            ping_timer: Timer::new(PING_INTERVAL_MS),
            silent_ms: 0,
        }
    }

    /// Whether the login handshake has completed
    pub fn is_running(&self) -> bool {
        self.state == LinkState::Running
    }

    fn send(&self, payload: &[u8]) {
        let (Some(socket), Some(addr)) = (self.socket.as_ref(), self.remote_addr) else {
            return;
        };
        if self.debug {
            trace!("{}, TX {} bytes", self.name, payload.len());
        }
        if let Err(e) = socket.send_to(payload, addr) {
            warn!("{}, send error: {}", self.name, e);
        }
    }

    fn send_tagged(&self, tag: &[u8], body: &[u8]) {
        let mut packet = Vec::with_capacity(tag.len() + body.len());
        packet.extend_from_slice(tag);
        packet.extend_from_slice(body);
        self.send(&packet);
    }

    fn send_login(&mut self) {
        self.send_tagged(TAG_LOGIN, &self.id.to_be_bytes());
        self.state = LinkState::WaitingLogin;
        self.retry_timer.start();
    }

    fn send_authorisation(&mut self, salt: &[u8]) {
        let mut hasher = Sha256::new();
        hasher.update(salt);
        hasher.update(self.password.as_bytes());
        let digest = hasher.finalize();

        let mut body = Vec::with_capacity(4 + digest.len());
        body.extend_from_slice(&self.id.to_be_bytes());
        body.extend_from_slice(&digest);
        self.send_tagged(TAG_AUTH, &body);

        self.state = LinkState::WaitingAuthorisation;
        self.retry_timer.start();
    }

    fn send_config(&mut self) {
        let config = self.config.clone();
        self.send_tagged(TAG_CONFIG, &config);
        self.state = LinkState::WaitingConfig;
        self.retry_timer.start();
    }

    fn send_options(&self) {
        if !self.options.is_empty() {
            let mut body = self.id.to_be_bytes().to_vec();
            body.extend_from_slice(self.options.as_bytes());
            self.send_tagged(TAG_OPTIONS, &body);
        }
    }

    fn handle_ack(&mut self, packet: &[u8]) {
        match self.state {
            LinkState::WaitingLogin => {
                // The ACK to a login carries the challenge salt
                let salt = &packet[TAG_ACK.len()..];
                self.send_authorisation(salt);
            }
            LinkState::WaitingAuthorisation => {
                self.send_config();
            }
            LinkState::WaitingConfig => {
                info!("{}, Logged into the master successfully", self.name);
                self.state = LinkState::Running;
                self.retry_timer.stop();
                self.ping_timer.start();
                self.send_options();
            }
            LinkState::Running | LinkState::Closed => {}
        }
    }

    fn handle_packet(&mut self, packet: &[u8]) {
        self.silent_ms = 0;

        if has_tag(packet, TAG_DMR_DATA) {
            if self.state != LinkState::Running {
                return;
            }
            match parse_dmr_data(packet) {
                Ok((data, _repeater_id)) => {
                    if self.rx_queue.len() >= RX_QUEUE_DEPTH {
                        debug!("{}, RX queue full, dropping oldest frame", self.name);
                        self.rx_queue.pop_front();
                    }
                    self.rx_queue.push_back(data);
                }
                Err(e) => warn!("{}, undecodable DMRD packet: {}", self.name, e),
            }
        } else if has_tag(packet, TAG_ACK) {
            self.handle_ack(packet);
        } else if has_tag(packet, TAG_NAK) {
            warn!("{}, Login refused by the master", self.name);
            self.state = LinkState::WaitingLogin;
            self.retry_timer.start();
        } else if has_tag(packet, TAG_PONG) {
            // Silence counter already reset above
        } else if has_tag(packet, TAG_MASTER_CLOSING) {
            warn!("{}, Master is closing down", self.name);
            self.state = LinkState::WaitingLogin;
            self.retry_timer.start();
        } else if self.debug {
            debug!("{}, Unknown packet of {} bytes", self.name, packet.len());
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
                    if Some(from) != self.remote_addr {
                        debug!("{}, Packet from unknown source {}", self.name, from);
                        continue;
                    }
                    let packet = buffer[..len].to_vec();
                    self.handle_packet(&packet);
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    warn!("{}, recv error: {}", self.name, e);
                    return;
                }
            }
        }
    }
}

impl Peer for HomebrewNetwork {
    fn open(&mut self) -> Result<(), GatewayError> {
        let remote_addr = (self.remote.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| GatewayError::Open(format!("{}: cannot resolve {}", self.name, self.remote)))?;

        let socket = UdpSocket::bind(("0.0.0.0", self.local_port))?;
        socket.set_nonblocking(true)?;

        info!("{}, Connecting to {}", self.name, remote_addr);

        self.socket = Some(socket);
        self.remote_addr = Some(remote_addr);
        self.send_login();

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
        if self.state != LinkState::Running {
            return false;
        }
        let packet = encode_dmr_data(data, self.id);
        self.send(&packet);
        true
    }

    fn clock(&mut self, ms: u64) {
        if self.state == LinkState::Closed {
            return;
        }

        self.drain_socket();

        self.silent_ms += ms;
        if self.state == LinkState::Running && self.silent_ms > DEAD_LINK_MS {
            warn!("{}, Link to the master has gone quiet, relogging in", self.name);
            self.silent_ms = 0;
            self.ping_timer.stop();
            self.send_login();
            return;
        }

        self.retry_timer.clock(ms);
        if self.retry_timer.has_expired() {
            // Restart the handshake from the top rather than replaying
            // whatever packet went unanswered
            self.send_login();
        }

        self.ping_timer.clock(ms);
        if self.ping_timer.has_expired() {
            self.send_tagged(TAG_PING, &self.id.to_be_bytes());
            self.ping_timer.start();
        }
    }

    fn close(&mut self) {
        if self.socket.is_some() {
            self.send_tagged(TAG_REPEATER_CLOSING, &self.id.to_be_bytes());
        }
        self.socket = None;
        self.remote_addr = None;
        self.state = LinkState::Closed;
        self.rx_queue.clear();
        info!("{}, Closed", self.name);
    }
}

impl NetworkPeer for HomebrewNetwork {
    fn set_config(&mut self, config: &[u8]) {
        self.config = config.to_vec();
    }

    fn set_options(&mut self, options: &str) {
        self.options = options.to_string();
    }

    fn write_position(&mut self, data: &[u8]) -> bool {
        if self.state != LinkState::Running {
            return false;
        }
        self.send_tagged(TAG_POSITION, data);
        true
    }

    fn write_talker_alias(&mut self, data: &[u8]) -> bool {
        if self.state != LinkState::Running {
            return false;
        }
        self.send_tagged(TAG_TALKER_ALIAS, data);
        true
    }
}
