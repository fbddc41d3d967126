//! Input peripheral: gamepad bitmask encoding.
//!
//! Two players own one byte each of the gamepad region. Sources never
//! overwrite a whole byte: a press ORs its bit in, a release ANDs the
//! complement, so physical keys and virtual on-screen buttons compose
//! freely.

use bitflags::bitflags;

use crate::core::{Bus16, map};

bitflags! {
    /// Button bits of one gamepad byte (1 = pressed).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Buttons: u8 {
        const BUTTON_2 = 0x01;
        const BUTTON_1 = 0x02;
        const RIGHT = 0x10;
        const DOWN = 0x20;
        const UP = 0x40;
        const LEFT = 0x80;
    }
}

/// Player slots backed by the two gamepad bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Player {
    One,
    Two,
}

impl Player {
    fn addr(self) -> u16 {
        match self {
            Player::One => map::GAMEPAD,
            Player::Two => map::GAMEPAD + 1,
        }
    }
}

/// Physical keys the stock keymaps understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    ArrowLeft,
    ArrowUp,
    ArrowDown,
    ArrowRight,
    Z,
    X,
    NumpadMultiply, // alternative buttons
    NumpadSubtract,
    W,
    A,
    S,
    D,
    K,
    L,
}

/// Software representation of the gamepad encoder.
///
/// The peripheral holds no source registrations of its own; it is rebuilt
/// with the bus on every cartridge load, which is what detaches stale
/// input sources across reloads.
pub struct Pad;

impl Pad {
    pub fn new() -> Self {
        Self
    }

    /// Fixed player-one table: arrows + Z/X, numpad alternates.
    fn p1(key: Key) -> Option<Buttons> {
        Some(match key {
            Key::ArrowLeft => Buttons::LEFT,
            Key::ArrowUp => Buttons::UP,
            Key::ArrowDown => Buttons::DOWN,
            Key::ArrowRight => Buttons::RIGHT,
            Key::Z | Key::NumpadMultiply => Buttons::BUTTON_1,
            Key::X | Key::NumpadSubtract => Buttons::BUTTON_2,
            _ => return None,
        })
    }

    /// Fixed player-two table: WASD + K/L.
    fn p2(key: Key) -> Option<Buttons> {
        Some(match key {
            Key::A => Buttons::LEFT,
            Key::W => Buttons::UP,
            Key::S => Buttons::DOWN,
            Key::D => Buttons::RIGHT,
            Key::K => Buttons::BUTTON_1,
            Key::L => Buttons::BUTTON_2,
            _ => return None,
        })
    }

    /// Route a physical key press through both player tables.
    pub fn key_down(&mut self, bus: &mut Bus16, key: Key) {
        if let Some(buttons) = Self::p1(key) {
            self.press(bus, Player::One, buttons);
        }
        if let Some(buttons) = Self::p2(key) {
            self.press(bus, Player::Two, buttons);
        }
    }

    /// Route a physical key release through both player tables.
    pub fn key_up(&mut self, bus: &mut Bus16, key: Key) {
        if let Some(buttons) = Self::p1(key) {
            self.release(bus, Player::One, buttons);
        }
        if let Some(buttons) = Self::p2(key) {
            self.release(bus, Player::Two, buttons);
        }
    }

    /// Set button bits directly; virtual sources land here.
    pub fn press(&mut self, bus: &mut Bus16, player: Player, buttons: Buttons) {
        bus.set_bits(player.addr(), buttons.bits());
    }

    /// Clear button bits directly.
    pub fn release(&mut self, bus: &mut Bus16, player: Player, buttons: Buttons) {
        bus.clear_bits(player.addr(), buttons.bits());
    }
}

impl Default for Pad {
    fn default() -> Self {
        Self::new()
    }
}
