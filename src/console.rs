//! ByteBox console session.
//!
//! This module provides the session struct that owns the bus, the
//! peripherals, and the loaded cartridge, and drives them in lockstep
//! from the fixed-timestep scheduler. There is no ambient state: one
//! [`ByteBox`] value is one console.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{error, info, warn};

use crate::apu::{Apu, AudioSink, NullAudio};
use crate::cartridge::{Cartridge, CartridgeError, Loader};
use crate::core::map::SysFlags;
use crate::core::{Bus16, map};
use crate::pad::{Buttons, Key, Pad, Player};
use crate::scheduler::Scheduler;
use crate::vdp::{NullVideo, Vdp, VideoSink};
use crate::wram::{MemoryStore, SaveStore, Wram};

/// Fault indicator: palette color 0 forced to saturated red.
const FAULT_COLOR: [u8; 3] = [255, 0, 0];

/// One console session: bus, peripherals, cartridge, loop state.
///
/// The bus and every peripheral are rebuilt from scratch on each load;
/// only the presentation collaborators and the save store belong to the
/// session itself and survive a reload.
pub struct ByteBox {
    bus: Bus16,
    vdp: Vdp,
    apu: Apu,
    pad: Pad,
    wram: Option<Wram>,
    cartridge: Option<Cartridge>,
    scheduler: Scheduler,
    ready: bool,
    frame_count: u64,

    video: Box<dyn VideoSink>,
    audio: Box<dyn AudioSink>,
    store: Box<dyn SaveStore>,
}

impl ByteBox {
    /// Create a session wired to the given collaborators.
    pub fn new(
        video: Box<dyn VideoSink>,
        audio: Box<dyn AudioSink>,
        store: Box<dyn SaveStore>,
    ) -> Self {
        let mut bus = Bus16::new();
        let vdp = Vdp::new(&mut bus);
        Self {
            bus,
            vdp,
            apu: Apu::new(),
            pad: Pad::new(),
            wram: None,
            cartridge: None,
            scheduler: Scheduler::new(),
            ready: false,
            frame_count: 0,
            video,
            audio,
            store,
        }
    }

    /// Headless session: frames and tones are discarded, saves are held
    /// in memory.
    pub fn headless() -> Self {
        Self::new(
            Box::new(NullVideo),
            Box::new(NullAudio),
            Box::new(MemoryStore::new()),
        )
    }

    /// Tear down the running session and build fresh hardware against a
    /// zeroed bus. Nothing survives this except the save store.
    fn setup(&mut self) {
        self.scheduler.stop();
        self.bus = Bus16::new();
        self.vdp = Vdp::new(&mut self.bus);
        self.apu = Apu::new();
        self.pad = Pad::new();
        self.wram = None;
        self.cartridge = None;
        self.ready = false;
        self.frame_count = 0;
    }

    /// Load a cartridge image, replacing any running session. Drag-and-
    /// drop restarts and reloads arrive here too.
    ///
    /// On failure the session stays not-ready with the fault palette set
    /// and never starts ticking.
    pub fn load(&mut self, bytes: &[u8], loader: &mut dyn Loader) -> Result<(), CartridgeError> {
        self.setup();

        let mut cartridge = match Cartridge::instantiate(bytes, loader) {
            Ok(cartridge) => cartridge,
            Err(err) => {
                self.fault(&err);
                return Err(err);
            }
        };

        // cartridges derive pseudo-randomness from this one byte
        self.bus.set(map::SEED, time_seed());

        let wram = Wram::new(cartridge.identity());
        wram.sync(&mut self.bus, self.store.as_ref());
        self.wram = Some(wram);

        cartridge.run_init(&mut self.bus);

        if bytes.len() <= map::PROGRAM_LEN {
            // cosmetic "game in RAM" image; oversized programs skip it
            let _ = self.bus.load(map::PROGRAM as u32, bytes);
        } else {
            warn!(
                "program image ({} bytes) exceeds the reserved region",
                bytes.len()
            );
        }

        self.cartridge = Some(cartridge);
        self.ready = true;
        self.scheduler.start();
        info!("game \"{}\" is running", self.game_name());
        Ok(())
    }

    fn fault(&mut self, err: &CartridgeError) {
        error!("{err}");
        for (i, channel) in FAULT_COLOR.iter().enumerate() {
            self.bus.set(map::PALETTE + i as u16, *channel);
        }
    }

    /// One presentation callback: drain pending logic ticks, then decode
    /// and present a single frame regardless of how many ticks ran.
    pub fn advance(&mut self, elapsed: Duration) {
        if !self.ready {
            return;
        }
        let ticks = self.scheduler.drain(elapsed);
        for _ in 0..ticks {
            self.tick();
        }
        if self.scheduler.is_running() {
            self.vdp.present(&self.bus, self.video.as_mut());
            self.frame_count += 1;
        }
    }

    /// One whole logic tick. Skipped entirely while the halt flag is set;
    /// otherwise the update/audio-scan/flush-check sequence runs to
    /// completion.
    fn tick(&mut self) {
        if self.bus.test_bits(map::SYSFLAGS, SysFlags::HALT.bits()) {
            return;
        }
        if let Some(cartridge) = self.cartridge.as_mut() {
            cartridge.run_update(&mut self.bus);
        }
        self.apu.scan(&mut self.bus, self.audio.as_mut());
        if let Some(wram) = self.wram.as_ref() {
            wram.flush_check(&mut self.bus, self.store.as_mut());
        }
    }

    /// Stop scheduling ticks until [`ByteBox::resume`].
    pub fn pause(&mut self) {
        if self.scheduler.is_running() {
            self.scheduler.stop();
            warn!("game paused");
        }
    }

    /// Resume a paused session. A no-op unless a cartridge is loaded.
    pub fn resume(&mut self) {
        if !self.scheduler.is_running() && self.ready {
            self.scheduler.start();
            warn!("game resumed");
        }
    }

    /// Route a physical key press into the gamepad region. Input may
    /// arrive between frames; it only touches the gamepad bytes.
    pub fn key_down(&mut self, key: Key) {
        self.pad.key_down(&mut self.bus, key);
    }

    /// Route a physical key release into the gamepad region.
    pub fn key_up(&mut self, key: Key) {
        self.pad.key_up(&mut self.bus, key);
    }

    /// Virtual button press (on-screen pads and the like).
    pub fn press(&mut self, player: Player, buttons: Buttons) {
        self.pad.press(&mut self.bus, player, buttons);
    }

    /// Virtual button release.
    pub fn release(&mut self, player: Player, buttons: Buttons) {
        self.pad.release(&mut self.bus, player, buttons);
    }

    /// ASCII identifier the cartridge wrote into the game-name region.
    pub fn game_name(&self) -> String {
        let raw = self.bus.region(map::GAME_NAME, map::GAME_NAME_LEN);
        String::from_utf8_lossy(raw)
            .trim_end_matches('\0')
            .trim()
            .to_string()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Read-only bus view for display surfaces and inspectors.
    pub fn bus(&self) -> &Bus16 {
        &self.bus
    }
}

/// Low byte of wall-clock milliseconds, written to the seed register once
/// per load.
fn time_seed() -> u8 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u8)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::cartridge::{Env, Exports, Program, Registry, assemble_rom};

    const COUNTER: u32 = 0x0200;

    /// Writes its name at init and counts updates in a bus byte.
    struct Counter;

    impl Program for Counter {
        fn init(&mut self, env: &mut Env<'_>) {
            for (i, b) in b"COUNTER".iter().enumerate() {
                env.poke(map::GAME_NAME as u32 + i as u32, *b as u32);
            }
        }

        fn update(&mut self, env: &mut Env<'_>) {
            let count = env.peek(COUNTER);
            env.poke(COUNTER, count as u32 + 1);
        }
    }

    fn counter_rom() -> Vec<u8> {
        assemble_rom(
            "counter",
            Exports {
                update: true,
                init: true,
            },
            &[],
        )
    }

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.register("counter", || Box::new(Counter));
        registry
    }

    #[test]
    fn three_tick_intervals_mean_three_updates_then_one_present() {
        struct Presents(Rc<Cell<u32>>);
        impl VideoSink for Presents {
            fn present(&mut self, _frame: &[u8]) {
                self.0.set(self.0.get() + 1);
            }
        }

        let presents = Rc::new(Cell::new(0));
        let mut console = ByteBox::new(
            Box::new(Presents(presents.clone())),
            Box::new(NullAudio),
            Box::new(MemoryStore::new()),
        );
        console.load(&counter_rom(), &mut registry()).unwrap();

        console.advance(Scheduler::TICK * 3);
        assert_eq!(console.bus().get(COUNTER as u16), 3);
        assert_eq!(presents.get(), 1);
    }

    #[test]
    fn init_runs_once_before_the_first_tick() {
        let mut console = ByteBox::headless();
        console.load(&counter_rom(), &mut registry()).unwrap();
        assert_eq!(console.game_name(), "COUNTER");
        assert_eq!(console.bus().get(COUNTER as u16), 0);
    }

    #[test]
    fn halt_flag_skips_updates_without_stopping_presentation() {
        let mut console = ByteBox::headless();
        console.load(&counter_rom(), &mut registry()).unwrap();

        console.advance(Scheduler::TICK);
        assert_eq!(console.bus().get(COUNTER as u16), 1);

        // a halted console still presents but runs no cartridge code
        console.bus.set_bits(map::SYSFLAGS, SysFlags::HALT.bits());
        console.advance(Scheduler::TICK * 4);
        assert_eq!(console.bus().get(COUNTER as u16), 1);
        assert_eq!(console.frame_count(), 2);

        console.bus.clear_bits(map::SYSFLAGS, SysFlags::HALT.bits());
        console.advance(Scheduler::TICK);
        assert_eq!(console.bus().get(COUNTER as u16), 2);
    }

    #[test]
    fn pause_cancels_ticks_and_presentation_until_resume() {
        let mut console = ByteBox::headless();
        console.load(&counter_rom(), &mut registry()).unwrap();

        console.pause();
        console.pause(); // idempotent
        console.advance(Scheduler::TICK * 10);
        assert_eq!(console.bus().get(COUNTER as u16), 0);
        assert_eq!(console.frame_count(), 0);

        console.resume();
        console.advance(Scheduler::TICK);
        assert_eq!(console.bus().get(COUNTER as u16), 1);
        assert_eq!(console.frame_count(), 1);
    }

    #[test]
    fn load_failure_sets_the_fault_palette_and_stays_not_ready() {
        let mut console = ByteBox::headless();
        let err = console.load(b"garbage", &mut registry());
        assert!(err.is_err());
        assert!(!console.is_ready());
        assert!(!console.is_running());
        assert_eq!(console.bus().region(map::PALETTE, 3), &FAULT_COLOR);

        // a not-ready session never ticks or presents
        console.advance(Scheduler::TICK * 5);
        assert_eq!(console.frame_count(), 0);
    }

    #[test]
    fn reload_discards_bus_state_but_keeps_saved_data() {
        // stamps save RAM and requests a flush on every update
        struct Saver;
        impl Program for Saver {
            fn update(&mut self, env: &mut Env<'_>) {
                env.poke(map::WRAM as u32, 0x42);
                let flags = env.peek(map::SYSFLAGS as u32);
                env.poke(
                    map::SYSFLAGS as u32,
                    flags as u32 | SysFlags::SAVE_REQUEST.bits() as u32,
                );
            }
        }

        let mut registry = Registry::new();
        registry.register("saver", || Box::new(Saver));
        let rom = assemble_rom(
            "saver",
            Exports {
                update: true,
                init: false,
            },
            &[],
        );

        let mut console = ByteBox::headless();
        console.load(&rom, &mut registry).unwrap();
        console.advance(Scheduler::TICK); // update + flush
        console.bus.set(0x0300, 0x99); // scratch state, not saved

        console.load(&rom, &mut registry).unwrap();
        // scratch state is gone, the save-RAM window came back
        assert_eq!(console.bus().get(0x0300), 0);
        assert_eq!(console.bus().get(map::WRAM), 0x42);
    }

    #[test]
    fn save_data_is_keyed_by_program_identity() {
        struct Stamp;
        impl Program for Stamp {
            fn update(&mut self, env: &mut Env<'_>) {
                env.poke(map::WRAM as u32, 0x7E);
                env.poke(map::SYSFLAGS as u32, SysFlags::SAVE_REQUEST.bits() as u32);
            }
        }

        let mut registry = Registry::new();
        registry.register("stamp", || Box::new(Stamp));
        let rom_a = assemble_rom(
            "stamp",
            Exports {
                update: true,
                init: false,
            },
            b"variant a",
        );
        let rom_b = assemble_rom(
            "stamp",
            Exports {
                update: true,
                init: false,
            },
            b"variant b",
        );

        let mut console = ByteBox::headless();
        console.load(&rom_a, &mut registry).unwrap();
        console.advance(Scheduler::TICK);

        // same program id, different content: a different save key
        console.load(&rom_b, &mut registry).unwrap();
        assert_eq!(console.bus().get(map::WRAM), 0);

        console.load(&rom_a, &mut registry).unwrap();
        assert_eq!(console.bus().get(map::WRAM), 0x7E);
    }

    #[test]
    fn program_image_is_copied_when_it_fits() {
        let rom = counter_rom();
        let mut console = ByteBox::headless();
        console.load(&rom, &mut registry()).unwrap();
        assert_eq!(console.bus().region(map::PROGRAM, rom.len()), &rom[..]);
    }

    #[test]
    fn keys_reach_the_gamepad_between_frames() {
        let mut console = ByteBox::headless();
        console.load(&counter_rom(), &mut registry()).unwrap();

        console.key_down(Key::ArrowLeft);
        console.key_down(Key::X);
        assert_eq!(
            console.bus().get(map::GAMEPAD),
            (Buttons::LEFT | Buttons::BUTTON_2).bits()
        );
        console.key_up(Key::ArrowLeft);
        assert_eq!(console.bus().get(map::GAMEPAD), Buttons::BUTTON_2.bits());
    }

    #[test]
    fn presentation_runs_even_when_no_tick_is_due() {
        let mut console = ByteBox::headless();
        console.load(&counter_rom(), &mut registry()).unwrap();
        console.advance(Scheduler::TICK / 4);
        assert_eq!(console.bus().get(COUNTER as u16), 0);
        assert_eq!(console.frame_count(), 1);
    }
}
