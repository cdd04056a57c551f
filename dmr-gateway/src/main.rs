//! DMR Gateway
//!
//! Connects one MMDVM repeater to up to four upstream networks: two
//! HomeBrew DMR masters and two XLX reflectors. Frames are rewritten
//! between address spaces on the way through, XLX link commands embedded
//! in private calls are interpreted and confirmed with voice
//! announcements, and each repeater timeslot is held for one network at
//! a time while a transmission is in progress.
//!
//! The process is a single cooperative loop: all peers are non-blocking,
//! one engine tick polls everything once, and a 10 ms sleep paces the
//! loop. SIGTERM shuts down; SIGHUP tears the whole gateway down and
//! builds it again from a fresh read of the configuration.

mod config;
mod voice;

use std::path::Path;
use std::process;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use eyre::WrapErr;
use tracing::{error, info, warn};
use tracing_subscriber::filter::LevelFilter;

use dmr_mux::{
    Gateway, ModemPeer, NetworkPeer, PcRewrite, Peer, Rewrite, SrcRewrite, TgRewrite, TypeRewrite,
    VoiceSource, XlxSession,
};
use dmr_net::{HomebrewNetwork, MmdvmNetwork};

use config::{Config, DmrNetworkConfig, LogConfig, VoiceConfig, XlxNetworkConfig};
use voice::Voice;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(unix)]
const DEFAULT_INI_FILE: &str = "/etc/DMRGateway.ini";
#[cfg(not(unix))]
const DEFAULT_INI_FILE: &str = "DMRGateway.ini";

const HEADER1: &str = "This software is for use on amateur radio networks only,";
const HEADER2: &str = "it is to be used for educational purposes only.";

// Signal state is process-wide by necessity: handlers cannot carry
// context. The loop consults these between iterations and nothing else
// happens in the handler.
static KILLED: AtomicBool = AtomicBool::new(false);
static RECEIVED_SIGNAL: AtomicI32 = AtomicI32::new(0);

#[cfg(unix)]
extern "C" fn handle_signal(signum: nix::libc::c_int) {
    KILLED.store(true, Ordering::Relaxed);
    RECEIVED_SIGNAL.store(signum, Ordering::Relaxed);
}

#[cfg(unix)]
fn install_signal_handlers() {
    use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

    let action = SigAction::new(
        SigHandler::Handler(handle_signal),
        SaFlags::empty(),
        SigSet::empty(),
    );

    unsafe {
        let _ = sigaction(Signal::SIGTERM, &action);
        let _ = sigaction(Signal::SIGHUP, &action);
    }
}

/// Detach from the terminal and drop root to the `mmdvm` user
#[cfg(unix)]
fn daemonize() -> eyre::Result<()> {
    use nix::unistd::{chdir, close, fork, getuid, setgid, setuid, setsid, ForkResult, Uid, User};

    match unsafe { fork() }.wrap_err("fork failed")? {
        ForkResult::Parent { .. } => process::exit(0),
        ForkResult::Child => {}
    }

    setsid().wrap_err("setsid failed")?;
    chdir("/").wrap_err("chdir / failed")?;

    let _ = close(0);
    let _ = close(1);
    let _ = close(2);

    if getuid().is_root() {
        let user = User::from_name("mmdvm")
            .wrap_err("mmdvm user lookup failed")?
            .ok_or_else(|| eyre::eyre!("no mmdvm user"))?;

        setgid(user.gid).wrap_err("could not set the mmdvm GID")?;
        setuid(user.uid).wrap_err("could not set the mmdvm UID")?;

        if setuid(Uid::from_raw(0)).is_ok() {
            return Err(eyre::eyre!("root privileges can be regained"));
        }
    }

    Ok(())
}

fn level_filter(level: u8) -> LevelFilter {
    match level {
        0 => LevelFilter::OFF,
        1 => LevelFilter::DEBUG,
        2 => LevelFilter::INFO,
        3 => LevelFilter::WARN,
        _ => LevelFilter::ERROR,
    }
}

/// Stdout and daily-rolling file output, each with its own level
fn init_logging(conf: &LogConfig) -> eyre::Result<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer};

    std::fs::create_dir_all(&conf.file_path)
        .wrap_err_with(|| format!("cannot create log directory {}", conf.file_path))?;

    let appender = tracing_appender::rolling::daily(&conf.file_path, &conf.file_root);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer)
                .with_filter(level_filter(conf.file_level)),
        )
        .with(fmt::layer().with_filter(level_filter(conf.display_level)))
        .try_init()
        .map_err(|e| eyre::eyre!("logging setup failed: {}", e))?;

    Ok(guard)
}

fn main() {
    let mut ini_file = DEFAULT_INI_FILE.to_string();

    for arg in std::env::args().skip(1) {
        if arg == "-v" || arg == "--version" {
            println!("dmr-gateway version {}", VERSION);
            return;
        } else if arg.starts_with('-') {
            eprintln!("Usage: dmr-gateway [-v|--version] [filename]");
            process::exit(1);
        } else {
            ini_file = arg;
        }
    }

    // Logging and daemonization are process-wide and set up once; a
    // SIGHUP restart re-reads everything else.
    let conf = match Config::from_file(Path::new(&ini_file)) {
        Ok(conf) => conf,
        Err(e) => {
            eprintln!("dmr-gateway: cannot read the ini file: {}", e);
            process::exit(1);
        }
    };

    let _log_guard = match init_logging(&conf.log) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("dmr-gateway: unable to open the log file: {:#}", e);
            process::exit(1);
        }
    };

    #[cfg(unix)]
    if conf.general.daemon {
        if let Err(e) = daemonize() {
            error!("Daemonise failed: {:#}", e);
            process::exit(-1);
        }
    }

    #[cfg(unix)]
    install_signal_handlers();

    loop {
        KILLED.store(false, Ordering::Relaxed);
        RECEIVED_SIGNAL.store(0, Ordering::Relaxed);

        let code = run(Path::new(&ini_file));

        let signum = RECEIVED_SIGNAL.load(Ordering::Relaxed);

        #[cfg(unix)]
        {
            if signum == nix::libc::SIGHUP {
                info!("Caught SIGHUP, restarting");
                continue;
            }
            if signum == nix::libc::SIGTERM {
                info!("Caught SIGTERM, exiting");
            }
        }

        let _ = signum;
        process::exit(code);
    }
}

/// One gateway lifetime: configuration read to peer teardown
fn run(ini_file: &Path) -> i32 {
    let conf = match Config::from_file(ini_file) {
        Ok(conf) => conf,
        Err(e) => {
            error!("Cannot read the ini file: {}", e);
            return 1;
        }
    };

    info!("{}", HEADER1);
    info!("{}", HEADER2);
    info!("dmr-gateway-{} is starting", VERSION);

    info!("MMDVM Network Parameters");
    info!("    Rpt Address: {}", conf.general.rpt_address);
    info!("    Rpt Port: {}", conf.general.rpt_port);
    info!("    Local Address: {}", conf.general.local_address);
    info!("    Local Port: {}", conf.general.local_port);

    let mut modem = MmdvmNetwork::new(
        &conf.general.rpt_address,
        conf.general.rpt_port,
        &conf.general.local_address,
        conf.general.local_port,
        conf.general.debug,
    );

    if let Err(e) = modem.open() {
        error!("Cannot open the MMDVM network: {}", e);
        return 1;
    }

    info!("Waiting for MMDVM to connect.....");

    let repeater_config = loop {
        if KILLED.load(Ordering::Relaxed) {
            modem.close();
            return 0;
        }
        if let Some(config) = modem.config() {
            break config;
        }
        modem.clock(10);
        thread::sleep(Duration::from_millis(10));
    };

    info!("MMDVM has connected");

    let modem_id = modem.id();
    let modem_options = modem.options();

    let mut gateway = Gateway::new(Box::new(modem), conf.general.timeout_secs);

    if conf.dmr1.enabled {
        match create_dmr_network("DMR-1", &conf.dmr1, modem_id, &modem_options, &repeater_config) {
            Ok((peer, rf, net)) => gateway.set_dmr1(Box::new(peer), rf, net),
            Err(e) => {
                error!("{:#}", e);
                gateway.close();
                return 1;
            }
        }
    }

    if conf.dmr2.enabled {
        match create_dmr_network("DMR-2", &conf.dmr2, modem_id, &modem_options, &repeater_config) {
            Ok((peer, rf, net)) => gateway.set_dmr2(Box::new(peer), rf, net),
            Err(e) => {
                error!("{:#}", e);
                gateway.close();
                return 1;
            }
        }
    }

    if conf.xlx1.enabled {
        match create_xlx_network("XLX-1", &conf.xlx1, &conf.voice, modem_id, &repeater_config) {
            Ok((peer, session, voice)) => gateway.set_xlx1(Box::new(peer), session, voice),
            Err(e) => {
                error!("{:#}", e);
                gateway.close();
                return 1;
            }
        }
    }

    if conf.xlx2.enabled {
        match create_xlx_network("XLX-2", &conf.xlx2, &conf.voice, modem_id, &repeater_config) {
            Ok((peer, session, voice)) => gateway.set_xlx2(Box::new(peer), session, voice),
            Err(e) => {
                error!("{:#}", e);
                gateway.close();
                return 1;
            }
        }
    }

    info!("dmr-gateway-{} is running", VERSION);

    let mut stopwatch = Instant::now();

    while !KILLED.load(Ordering::Relaxed) {
        let ms = stopwatch.elapsed().as_millis() as u64;
        stopwatch = Instant::now();

        gateway.tick(ms);

        if ms < 10 {
            thread::sleep(Duration::from_millis(10));
        }
    }

    info!("dmr-gateway-{} is exiting", VERSION);
    gateway.close();

    0
}

/// Build, configure and open one DMR master connection, together with
/// its RF-to-network and network-to-RF rewrite chains
fn create_dmr_network(
    name: &str,
    conf: &DmrNetworkConfig,
    modem_id: u32,
    modem_options: &str,
    repeater_config: &[u8],
) -> eyre::Result<(HomebrewNetwork, Vec<Rewrite>, Vec<Rewrite>)> {
    let id = if conf.id != 0 { conf.id } else { modem_id };

    info!("{} Network Parameters", name);
    info!("    Id: {}", id);
    info!("    Address: {}", conf.address);
    info!("    Port: {}", conf.port);
    if conf.local > 0 {
        info!("    Local: {}", conf.local);
    } else {
        info!("    Local: random");
    }

    let mut peer = HomebrewNetwork::new(
        name,
        &conf.address,
        conf.port,
        conf.local,
        id,
        &conf.password,
        conf.debug,
    );

    let options = if conf.options.is_empty() {
        modem_options.to_string()
    } else {
        conf.options.clone()
    };
    if !options.is_empty() {
        info!("    Options: {}", options);
        peer.set_options(&options);
    }

    peer.set_config(repeater_config);
    peer.open().wrap_err_with(|| format!("cannot open {}", name))?;

    let mut rf_rewrites = Vec::new();
    let mut net_rewrites = Vec::new();

    for r in &conf.tg_rewrites {
        info!(
            "    Rewrite RF: {}:TG{}-TG{} -> {}:TG{}-TG{}",
            r.from_slot,
            r.from_tg,
            r.from_tg + r.range - 1,
            r.to_slot,
            r.to_tg,
            r.to_tg + r.range - 1
        );
        info!(
            "    Rewrite Net: {}:TG{}-TG{} -> {}:TG{}-TG{}",
            r.to_slot,
            r.to_tg,
            r.to_tg + r.range - 1,
            r.from_slot,
            r.from_tg,
            r.from_tg + r.range - 1
        );

        rf_rewrites.push(Rewrite::Tg(TgRewrite::new(
            name, r.from_slot, r.from_tg, r.to_slot, r.to_tg, r.range,
        )));
        net_rewrites.push(Rewrite::Tg(TgRewrite::new(
            name, r.to_slot, r.to_tg, r.from_slot, r.from_tg, r.range,
        )));
    }

    for r in &conf.pc_rewrites {
        info!(
            "    Rewrite RF: {}:{}-{} -> {}:{}-{}",
            r.from_slot,
            r.from_id,
            r.from_id + r.range - 1,
            r.to_slot,
            r.to_id,
            r.to_id + r.range - 1
        );
        rf_rewrites.push(Rewrite::Pc(PcRewrite::new(
            name, r.from_slot, r.from_id, r.to_slot, r.to_id, r.range,
        )));
    }

    for r in &conf.type_rewrites {
        info!(
            "    Rewrite RF: {}:TG{} -> {}:{}",
            r.from_slot, r.from_tg, r.to_slot, r.to_id
        );
        rf_rewrites.push(Rewrite::Type(TypeRewrite::new(
            name, r.from_slot, r.from_tg, r.to_slot, r.to_id,
        )));
    }

    for r in &conf.src_rewrites {
        info!(
            "    Rewrite Net: {}:{}-{} -> {}:TG{}",
            r.from_slot,
            r.from_id,
            r.from_id + r.range - 1,
            r.to_slot,
            r.to_tg
        );
        net_rewrites.push(Rewrite::Src(SrcRewrite::new(
            name, r.from_slot, r.from_id, r.to_slot, r.to_tg, r.range,
        )));
    }

    Ok((peer, rf_rewrites, net_rewrites))
}

/// Build, configure and open one XLX reflector connection with its
/// session state and, when enabled and loadable, its voice source
fn create_xlx_network(
    name: &str,
    conf: &XlxNetworkConfig,
    voice_conf: &VoiceConfig,
    modem_id: u32,
    repeater_config: &[u8],
) -> eyre::Result<(HomebrewNetwork, XlxSession, Option<Box<dyn VoiceSource>>)> {
    let id = if conf.id != 0 { conf.id } else { modem_id };

    info!("{} Network Parameters", name);
    info!("    Id: {}", id);
    info!("    Address: {}", conf.address);
    info!("    Port: {}", conf.port);
    if conf.local > 0 {
        info!("    Local: {}", conf.local);
    } else {
        info!("    Local: random");
    }
    info!("    Slot: {}", conf.slot);
    info!("    TG: {}", conf.tg);
    info!("    Base: {}", conf.base);

    let mut peer = HomebrewNetwork::new(
        name,
        &conf.address,
        conf.port,
        conf.local,
        id,
        &conf.password,
        conf.debug,
    );

    if !conf.options.is_empty() {
        info!("    Options: {}", conf.options);
        peer.set_options(&conf.options);
    }

    peer.set_config(repeater_config);
    peer.open().wrap_err_with(|| format!("cannot open {}", name))?;

    let session = XlxSession::new(name, conf.slot, conf.tg, conf.base);

    let voice: Option<Box<dyn VoiceSource>> = if voice_conf.enabled {
        let mut voice = Voice::new(
            &voice_conf.directory,
            &voice_conf.language,
            modem_id,
            conf.slot,
            conf.tg,
        );
        match voice.open() {
            Ok(()) => {
                info!("    Voice: {} from {}", voice_conf.language, voice_conf.directory);
                Some(Box::new(voice))
            }
            Err(e) => {
                warn!("{}, announcements disabled: {}", name, e);
                None
            }
        }
    } else {
        None
    };

    Ok((peer, session, voice))
}
