//! Cartridge host: container validation, program binding, identity.
//!
//! A cartridge image starts with a small container header (magic, version,
//! export table, program id). The header is validated here; the program
//! unit itself runs natively behind [`Program`] and touches the console
//! only through the [`Env`] binding, never through ambient state.

use std::collections::HashMap;

use log::{info, warn};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::core::Bus16;

/// Magic at the front of every cartridge image.
pub const ROM_MAGIC: [u8; 4] = *b"BBX0";
const ROM_VERSION: u8 = 1;

const EXPORT_UPDATE: u8 = 0x01;
const EXPORT_INIT: u8 = 0x02;

/// Errors raised while loading a cartridge.
#[derive(Debug, Error)]
pub enum CartridgeError {
    /// The image could not be parsed or instantiated.
    #[error("cartridge image is unloadable: {0}")]
    LoadFailure(String),
    /// The image carries no per-frame `update` entry point.
    #[error("cartridge does not export an update entry point")]
    MissingEntryPoint,
}

/// Entry points a program unit exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exports {
    /// Required per-frame entry point.
    pub update: bool,
    /// Optional one-time entry point.
    pub init: bool,
}

/// A natively-executing cartridge program.
///
/// The console never interprets cartridge code. The unit runs as compiled
/// code behind this trait; `update` fires once per logic tick and `init`
/// (when exported) once after load, before the first tick.
pub trait Program {
    fn update(&mut self, env: &mut Env<'_>);

    fn init(&mut self, _env: &mut Env<'_>) {}
}

/// Host functions bound to the cartridge at load time.
///
/// This is the whole surface a program can reach: bounds-checked bus
/// access plus a diagnostic hook. Faults are logged and recovered here so
/// a misbehaving cartridge can never take the session down.
pub struct Env<'a> {
    bus: &'a mut Bus16,
}

impl<'a> Env<'a> {
    pub(crate) fn new(bus: &'a mut Bus16) -> Self {
        Self { bus }
    }

    /// Bus read; out-of-range addresses log and return 0.
    pub fn peek(&self, addr: u32) -> u8 {
        match self.bus.read(addr) {
            Ok(value) => value,
            Err(fault) => {
                warn!("peek: {fault}");
                0
            }
        }
    }

    /// Bus write; an out-of-range address or value logs and leaves memory
    /// untouched.
    pub fn poke(&mut self, addr: u32, value: u32) {
        if let Err(fault) = self.bus.write(addr, value) {
            warn!("poke: {fault}");
        }
    }

    /// Debug hook: decode `bytes` from the program's own memory as UTF-8
    /// and forward it to the diagnostic channel. Emulated state is
    /// unaffected.
    pub fn trace(&self, bytes: &[u8]) {
        info!("trace: {}", String::from_utf8_lossy(bytes));
    }
}

/// Parsed container header of a cartridge image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomHeader {
    pub version: u8,
    pub exports: Exports,
    pub program_id: String,
}

impl RomHeader {
    /// Parse and validate the container header at the front of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self, CartridgeError> {
        if bytes.len() < 7 {
            return Err(CartridgeError::LoadFailure(
                "image too short for header".into(),
            ));
        }
        if bytes[0..4] != ROM_MAGIC {
            return Err(CartridgeError::LoadFailure("bad magic".into()));
        }
        let version = bytes[4];
        if version != ROM_VERSION {
            return Err(CartridgeError::LoadFailure(format!(
                "unsupported container version {version}"
            )));
        }
        let flags = bytes[5];
        let id_len = bytes[6] as usize;
        let id_end = 7 + id_len;
        if bytes.len() < id_end {
            return Err(CartridgeError::LoadFailure(
                "truncated program id".into(),
            ));
        }
        let program_id = std::str::from_utf8(&bytes[7..id_end])
            .map_err(|_| CartridgeError::LoadFailure("program id is not UTF-8".into()))?
            .to_string();
        Ok(Self {
            version,
            exports: Exports {
                update: flags & EXPORT_UPDATE != 0,
                init: flags & EXPORT_INIT != 0,
            },
            program_id,
        })
    }
}

/// Build a loadable image around a native program id.
pub fn assemble_rom(program_id: &str, exports: Exports, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(7 + program_id.len() + payload.len());
    out.extend_from_slice(&ROM_MAGIC);
    out.push(ROM_VERSION);
    let mut flags = 0u8;
    if exports.update {
        flags |= EXPORT_UPDATE;
    }
    if exports.init {
        flags |= EXPORT_INIT;
    }
    out.push(flags);
    out.push(program_id.len() as u8);
    out.extend_from_slice(program_id.as_bytes());
    out.extend_from_slice(payload);
    out
}

/// Turns a validated cartridge image into a running program instance.
pub trait Loader {
    fn instantiate(
        &mut self,
        header: &RomHeader,
        rom: &[u8],
    ) -> Result<Box<dyn Program>, CartridgeError>;
}

type Factory = Box<dyn Fn() -> Box<dyn Program>>;

/// Built-in loader: the header's program id resolves to a registered
/// native factory.
#[derive(Default)]
pub struct Registry {
    factories: HashMap<String, Factory>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, program_id: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Program> + 'static,
    {
        self.factories.insert(program_id.into(), Box::new(factory));
    }
}

impl Loader for Registry {
    fn instantiate(
        &mut self,
        header: &RomHeader,
        _rom: &[u8],
    ) -> Result<Box<dyn Program>, CartridgeError> {
        let factory = self.factories.get(&header.program_id).ok_or_else(|| {
            CartridgeError::LoadFailure(format!(
                "unknown program id {:?}",
                header.program_id
            ))
        })?;
        Ok(factory())
    }
}

/// An instantiated cartridge: the program unit plus its raw image.
pub struct Cartridge {
    program: Box<dyn Program>,
    exports: Exports,
    rom: Vec<u8>,
    identity: String,
}

impl Cartridge {
    /// Validate `bytes` and instantiate its program unit through `loader`.
    pub fn instantiate(bytes: &[u8], loader: &mut dyn Loader) -> Result<Self, CartridgeError> {
        let header = RomHeader::parse(bytes)?;
        if !header.exports.update {
            return Err(CartridgeError::MissingEntryPoint);
        }
        let program = loader.instantiate(&header, bytes)?;
        Ok(Self {
            program,
            exports: header.exports,
            rom: bytes.to_vec(),
            identity: identity(bytes),
        })
    }

    /// Raw image the cartridge was loaded from.
    pub fn rom(&self) -> &[u8] {
        &self.rom
    }

    /// Stable identifier derived from the image content; keys save data.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub(crate) fn run_init(&mut self, bus: &mut Bus16) {
        if self.exports.init {
            self.program.init(&mut Env::new(bus));
        }
    }

    pub(crate) fn run_update(&mut self, bus: &mut Bus16) {
        self.program.update(&mut Env::new(bus));
    }
}

/// Content digest truncated to 16 hex characters.
pub fn identity(rom: &[u8]) -> String {
    let digest = Sha256::digest(rom);
    digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
}
