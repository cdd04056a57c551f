//! Configuration file handling
//!
//! The gateway reads a sectioned INI file (`Key=Value`, `#` or `;`
//! comments). Unknown keys are ignored so configurations can carry
//! annotations; malformed values are hard errors naming the section and
//! key. Rewrite entries may repeat within a network section and their
//! file order is the rule-chain order.
//!
//! ```ini
//! [DMR Network 1]
//! Enabled=1
//! Address=44.131.4.1
//! Port=62031
//! Password=PASSWORD
//! TGRewrite=2,9,2,9,1
//! PCRewrite=2,94000,2,4000,1001
//! ```

use std::fs;
use std::path::Path;

use dmr_proto::Slot;
use thiserror::Error;

/// Errors raised while loading the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read at all
    #[error("cannot read {path}: {source}")]
    Unreadable {
        path: String,
        source: std::io::Error,
    },

    /// A value failed to parse
    #[error("[{section}] {key}: bad value {value:?}")]
    BadValue {
        section: String,
        key: String,
        value: String,
    },
}

/// `[General]`
#[derive(Debug, Clone)]
pub struct GeneralConfig {
    pub timeout_secs: u64,
    pub rpt_address: String,
    pub rpt_port: u16,
    pub local_address: String,
    pub local_port: u16,
    pub debug: bool,
    pub daemon: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            rpt_address: "127.0.0.1".to_string(),
            rpt_port: 62032,
            local_address: "127.0.0.1".to_string(),
            local_port: 62031,
            debug: false,
            daemon: false,
        }
    }
}

/// `[Log]`: levels are 0 off, 1 debug, 2 info, 3 warnings, 4 errors only
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub display_level: u8,
    pub file_level: u8,
    pub file_path: String,
    pub file_root: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            display_level: 2,
            file_level: 2,
            file_path: ".".to_string(),
            file_root: "DMRGateway".to_string(),
        }
    }
}

/// `[Voice]`
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    pub enabled: bool,
    pub language: String,
    pub directory: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            language: "en_GB".to_string(),
            directory: "./Audio".to_string(),
        }
    }
}

/// One `TGRewrite=fromSlot,fromTG,toSlot,toTG,range` entry
#[derive(Debug, Clone)]
pub struct TgRewriteConfig {
    pub from_slot: Slot,
    pub from_tg: u32,
    pub to_slot: Slot,
    pub to_tg: u32,
    pub range: u32,
}

/// One `PCRewrite=fromSlot,fromId,toSlot,toId,range` entry
#[derive(Debug, Clone)]
pub struct PcRewriteConfig {
    pub from_slot: Slot,
    pub from_id: u32,
    pub to_slot: Slot,
    pub to_id: u32,
    pub range: u32,
}

/// One `TypeRewrite=fromSlot,fromTG,toSlot,toId` entry
#[derive(Debug, Clone)]
pub struct TypeRewriteConfig {
    pub from_slot: Slot,
    pub from_tg: u32,
    pub to_slot: Slot,
    pub to_id: u32,
}

/// One `SrcRewrite=fromSlot,fromId,toSlot,toTG,range` entry
#[derive(Debug, Clone)]
pub struct SrcRewriteConfig {
    pub from_slot: Slot,
    pub from_id: u32,
    pub to_slot: Slot,
    pub to_tg: u32,
    pub range: u32,
}

/// `[DMR Network 1]` / `[DMR Network 2]`
#[derive(Debug, Clone, Default)]
pub struct DmrNetworkConfig {
    pub enabled: bool,
    pub address: String,
    pub port: u16,
    pub local: u16,
    pub id: u32,
    pub password: String,
    pub options: String,
    pub debug: bool,
    pub tg_rewrites: Vec<TgRewriteConfig>,
    pub pc_rewrites: Vec<PcRewriteConfig>,
    pub type_rewrites: Vec<TypeRewriteConfig>,
    pub src_rewrites: Vec<SrcRewriteConfig>,
}

/// `[XLX Network 1]` / `[XLX Network 2]`
#[derive(Debug, Clone)]
pub struct XlxNetworkConfig {
    pub enabled: bool,
    pub address: String,
    pub port: u16,
    pub local: u16,
    pub id: u32,
    pub password: String,
    pub options: String,
    pub slot: Slot,
    pub tg: u32,
    pub base: u32,
    pub debug: bool,
}

impl Default for XlxNetworkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: String::new(),
            port: 62030,
            local: 0,
            id: 0,
            password: String::new(),
            options: String::new(),
            slot: Slot::Slot1,
            tg: 8,
            base: 64000,
            debug: false,
        }
    }
}

/// The whole configuration file
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub general: GeneralConfig,
    pub log: LogConfig,
    pub voice: VoiceConfig,
    pub dmr1: DmrNetworkConfig,
    pub dmr2: DmrNetworkConfig,
    pub xlx1: XlxNetworkConfig,
    pub xlx2: XlxNetworkConfig,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.display().to_string(),
            source,
        })?;

        let mut config = Config::default();
        let mut section = String::new();

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                section = line[1..line.len() - 1].trim().to_string();
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();

            match section.as_str() {
                "General" => config.general.apply(&section, key, value)?,
                "Log" => config.log.apply(&section, key, value)?,
                "Voice" => config.voice.apply(&section, key, value)?,
                "DMR Network 1" => config.dmr1.apply(&section, key, value)?,
                "DMR Network 2" => config.dmr2.apply(&section, key, value)?,
                "XLX Network 1" => config.xlx1.apply(&section, key, value)?,
                "XLX Network 2" => config.xlx2.apply(&section, key, value)?,
                _ => {}
            }
        }

        Ok(config)
    }
}

fn bad_value(section: &str, key: &str, value: &str) -> ConfigError {
    ConfigError::BadValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_bool(section: &str, key: &str, value: &str) -> Result<bool, ConfigError> {
    match value {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(bad_value(section, key, value)),
    }
}

fn parse_number<T: std::str::FromStr>(section: &str, key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| bad_value(section, key, value))
}

fn parse_slot(section: &str, key: &str, value: &str) -> Result<Slot, ConfigError> {
    let number: u32 = parse_number(section, key, value)?;
    Slot::from_number(number).ok_or_else(|| bad_value(section, key, value))
}

/// A rewrite range covers at least one id
fn parse_range(section: &str, key: &str, value: &str) -> Result<u32, ConfigError> {
    let range: u32 = parse_number(section, key, value)?;
    if range == 0 {
        return Err(bad_value(section, key, value));
    }
    Ok(range)
}

/// Split a rewrite value into exactly `count` comma-separated fields
fn split_fields<'a>(
    section: &str,
    key: &str,
    value: &'a str,
    count: usize,
) -> Result<Vec<&'a str>, ConfigError> {
    let fields: Vec<&str> = value.split(',').map(str::trim).collect();
    if fields.len() != count {
        return Err(bad_value(section, key, value));
    }
    Ok(fields)
}

impl GeneralConfig {
    fn apply(&mut self, section: &str, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "Timeout" => self.timeout_secs = parse_number(section, key, value)?,
            "RptAddress" => self.rpt_address = value.to_string(),
            "RptPort" => self.rpt_port = parse_number(section, key, value)?,
            "LocalAddress" => self.local_address = value.to_string(),
            "LocalPort" => self.local_port = parse_number(section, key, value)?,
            "Debug" => self.debug = parse_bool(section, key, value)?,
            "Daemon" => self.daemon = parse_bool(section, key, value)?,
            _ => {}
        }
        Ok(())
    }
}

impl LogConfig {
    fn apply(&mut self, section: &str, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "DisplayLevel" => self.display_level = parse_number(section, key, value)?,
            "FileLevel" => self.file_level = parse_number(section, key, value)?,
            "FilePath" => self.file_path = value.to_string(),
            "FileRoot" => self.file_root = value.to_string(),
            _ => {}
        }
        Ok(())
    }
}

impl VoiceConfig {
    fn apply(&mut self, section: &str, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "Enabled" => self.enabled = parse_bool(section, key, value)?,
            "Language" => self.language = value.to_string(),
            "Directory" => self.directory = value.to_string(),
            _ => {}
        }
        Ok(())
    }
}

impl DmrNetworkConfig {
    fn apply(&mut self, section: &str, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "Enabled" => self.enabled = parse_bool(section, key, value)?,
            "Address" => self.address = value.to_string(),
            "Port" => self.port = parse_number(section, key, value)?,
            "Local" => self.local = parse_number(section, key, value)?,
            "Id" => self.id = parse_number(section, key, value)?,
            "Password" => self.password = value.to_string(),
            "Options" => self.options = value.to_string(),
            "Debug" => self.debug = parse_bool(section, key, value)?,
            "TGRewrite" => {
                let f = split_fields(section, key, value, 5)?;
                self.tg_rewrites.push(TgRewriteConfig {
                    from_slot: parse_slot(section, key, f[0])?,
                    from_tg: parse_number(section, key, f[1])?,
                    to_slot: parse_slot(section, key, f[2])?,
                    to_tg: parse_number(section, key, f[3])?,
                    range: parse_range(section, key, f[4])?,
                });
            }
            "PCRewrite" => {
                let f = split_fields(section, key, value, 5)?;
                self.pc_rewrites.push(PcRewriteConfig {
                    from_slot: parse_slot(section, key, f[0])?,
                    from_id: parse_number(section, key, f[1])?,
                    to_slot: parse_slot(section, key, f[2])?,
                    to_id: parse_number(section, key, f[3])?,
                    range: parse_range(section, key, f[4])?,
                });
            }
            "TypeRewrite" => {
                let f = split_fields(section, key, value, 4)?;
                self.type_rewrites.push(TypeRewriteConfig {
                    from_slot: parse_slot(section, key, f[0])?,
                    from_tg: parse_number(section, key, f[1])?,
                    to_slot: parse_slot(section, key, f[2])?,
                    to_id: parse_number(section, key, f[3])?,
                });
            }
            "SrcRewrite" => {
                let f = split_fields(section, key, value, 5)?;
                self.src_rewrites.push(SrcRewriteConfig {
                    from_slot: parse_slot(section, key, f[0])?,
                    from_id: parse_number(section, key, f[1])?,
                    to_slot: parse_slot(section, key, f[2])?,
                    to_tg: parse_number(section, key, f[3])?,
                    range: parse_range(section, key, f[4])?,
                });
            }
            _ => {}
        }
        Ok(())
    }
}

impl XlxNetworkConfig {
    fn apply(&mut self, section: &str, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "Enabled" => self.enabled = parse_bool(section, key, value)?,
            "Address" => self.address = value.to_string(),
            "Port" => self.port = parse_number(section, key, value)?,
            "Local" => self.local = parse_number(section, key, value)?,
            "Id" => self.id = parse_number(section, key, value)?,
            "Password" => self.password = value.to_string(),
            "Options" => self.options = value.to_string(),
            "Slot" => self.slot = parse_slot(section, key, value)?,
            "TG" => self.tg = parse_number(section, key, value)?,
            "Base" => self.base = parse_number(section, key, value)?,
            "Debug" => self.debug = parse_bool(section, key, value)?,
            _ => {}
        }
        Ok(())
    }
}
