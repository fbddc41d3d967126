//! Fixed region map of the 64 KB bus.
//!
//! Every peripheral interprets one of these byte ranges; none of them
//! overlap. Addresses are `u16` on purpose: a region constant can never
//! name a byte outside the bus.

use bitflags::bitflags;

/// System flags byte.
pub const SYSFLAGS: u16 = 0x0040;
/// Random seed byte, written once at load time.
pub const SEED: u16 = 0x0041;
/// ASCII game identifier, cartridge-writable.
pub const GAME_NAME: u16 = 0x0044;
pub const GAME_NAME_LEN: usize = 24;
/// Raw copy of the loaded program image. Purely cosmetic.
pub const PROGRAM: u16 = 0x0100;
pub const PROGRAM_LEN: usize = 58 * 1024;
/// Save RAM window persisted across sessions.
pub const WRAM: u16 = 0xE100;
pub const WRAM_LEN: usize = 1024;
/// Packed 2-bit-per-pixel framebuffer, 4 pixels per byte.
pub const VIDEO: u16 = 0xE900;
pub const VIDEO_LEN: usize = (160 * 144) / 4;
/// 4 colors x 3 bytes (R, G, B).
pub const PALETTE: u16 = 0xFF84;
pub const PALETTE_LEN: usize = 12;
/// One byte per player, bit-per-button.
pub const GAMEPAD: u16 = 0xFF94;
/// Bit-per-channel "currently playing" flags, host-owned.
pub const SOUND_STATUS: u16 = 0xFF97;
/// 4 channels x 4 register bytes.
pub const SOUND_SFX: u16 = 0xFF98;
pub const SOUND_SFX_LEN: usize = 16;

bitflags! {
    /// Bits of the [`SYSFLAGS`] byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SysFlags: u8 {
        /// Cartridge update is skipped while set.
        const HALT = 0x01;
        /// Consumed by the persistence peripheral on its next tick.
        const SAVE_REQUEST = 0x02;
    }
}
