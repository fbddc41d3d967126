// Copyright (C) 2025 ByteBox Contributors
// ByteBox Game Console Runtime
// This file is part of ByteBox.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version. See the LICENSE file in the project root for details.
// SPDX-License-Identifier: GPL-3.0-or-later

//! ByteBox Game Console Runtime
//!
//! This library provides the runtime core of the ByteBox console: the
//! shared 64 KB memory bus, the cartridge host, and the peripheral
//! emulators (video, audio, input, persistence) driven in lockstep by a
//! fixed-timestep scheduler. Presentation frontends consume the decoded
//! frames and tone events through the sink traits.

pub mod apu;
pub mod cartridge;
pub mod console;
pub mod core;
pub mod pad;
pub mod scheduler;
pub mod vdp;
pub mod wram;

pub use apu::{Apu, AudioSink, NullAudio, Tone, VoiceHandle, Waveform};
pub use cartridge::{Cartridge, CartridgeError, Env, Loader, Program, Registry, assemble_rom};
pub use console::ByteBox;
// Re-export commonly used core types
pub use crate::core::{Bus16, BusFault};
pub use pad::{Buttons, Key, Pad, Player};
pub use scheduler::Scheduler;
pub use vdp::{NullVideo, Vdp, VideoSink};
pub use wram::{FileStore, MemoryStore, SaveStore, Wram};
