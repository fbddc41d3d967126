// Copyright (C) 2025 ByteBox Contributors
// ByteBox Game Console Runtime
// This file is part of ByteBox.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version. See the LICENSE file in the project root for details.
// SPDX-License-Identifier: GPL-3.0-or-later

// A demo cartridge for the ByteBox console, driven headless.
use std::time::Duration;

use bytebox_core::cartridge::{Exports, identity};
use bytebox_core::core::map;
use bytebox_core::core::map::SysFlags;
use bytebox_core::{
    AudioSink, ByteBox, Env, FileStore, NullVideo, Program, Registry, Scheduler, Tone,
    VoiceHandle, assemble_rom,
};

/// Scrolls a stripe through the framebuffer, blips a tone every second,
/// and saves its frame counter now and then.
struct PulseDemo {
    t: u32,
}

impl Program for PulseDemo {
    fn init(&mut self, env: &mut Env<'_>) {
        for (i, b) in b"PULSE DEMO".iter().enumerate() {
            env.poke(map::GAME_NAME as u32 + i as u32, *b as u32);
        }
        env.trace(b"pulse demo ready");
    }

    fn update(&mut self, env: &mut Env<'_>) {
        self.t += 1;

        // one framebuffer row is 160 / 4 packed bytes
        let seed = env.peek(map::SEED as u32) as u32;
        let row = (self.t + seed) % 144;
        for x in 0..40 {
            env.poke(map::VIDEO as u32 + row * 40 + x, 0b1110_0100);
        }

        if self.t % 60 == 1 {
            let base = map::SOUND_SFX as u32;
            env.poke(base, 40); // sweep start
            env.poke(base + 1, 120); // sweep end
            env.poke(base + 2, (10 << 3) | 5); // 0.32 s at volume 5/7
            env.poke(base + 3, (2 << 4) | (2 << 1) | 1); // vibrato 2, square, trigger
        }

        if self.t % 300 == 0 {
            env.poke(map::WRAM as u32, self.t % 251);
            let flags = env.peek(map::SYSFLAGS as u32) as u32;
            env.poke(
                map::SYSFLAGS as u32,
                flags | SysFlags::SAVE_REQUEST.bits() as u32,
            );
        }
    }
}

/// Renders each tone offline and reports it instead of playing it.
struct ConsoleAudio;

impl AudioSink for ConsoleAudio {
    fn play(&mut self, channel: usize, tone: Tone, voice: VoiceHandle) {
        let samples = tone.render(44_100);
        println!(
            "  channel {channel}: {:.0} Hz -> {:.0} Hz, {:?}, {} samples",
            tone.freq_start,
            tone.freq_end,
            tone.waveform,
            samples.len()
        );
        voice.finish();
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    println!("ByteBox Console v0.1.0");
    println!("======================");
    println!();

    let mut registry = Registry::new();
    registry.register("pulse-demo", || Box::new(PulseDemo { t: 0 }));
    let rom = assemble_rom(
        "pulse-demo",
        Exports {
            update: true,
            init: true,
        },
        b"pulse demo payload",
    );

    let mut console = ByteBox::new(
        Box::new(NullVideo),
        Box::new(ConsoleAudio),
        Box::new(FileStore::new("saves")),
    );

    println!("Loading demo cartridge ({} bytes)...", rom.len());
    console.load(&rom, &mut registry)?;

    println!("Running 5 seconds of emulated time...");
    for _ in 0..300 {
        console.advance(Scheduler::TICK);
    }

    println!();
    println!("Session state:");
    println!("  Game name:  {}", console.game_name());
    println!("  Identity:   {}", identity(&rom));
    println!("  Frames:     {}", console.frame_count());
    println!("  Seed byte:  0x{:02X}", console.bus().get(map::SEED));
    println!("  Gamepad:    0x{:02X}", console.bus().get(map::GAMEPAD));

    // pause and resume survive without duplicating the loop
    console.pause();
    console.advance(Duration::from_millis(100));
    console.resume();
    console.advance(Scheduler::TICK);
    println!("  Frames after pause/resume: {}", console.frame_count());

    Ok(())
}
