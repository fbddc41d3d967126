// Copyright (C) 2025 ByteBox Contributors
// ByteBox Game Console Runtime
// This file is part of ByteBox.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version. See the LICENSE file in the project root for details.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Audio peripheral: sound channel registers and tone synthesis.
//!
//! Four monophonic channels, 4 register bytes each:
//! byte 0 frequency-sweep start, byte 1 sweep end,
//! byte 2 = duration (bits 3-7) | volume (bits 0-2),
//! byte 3 = vibrato (bits 4-6) | waveform (bits 1-2) | trigger (bit 0).
//!
//! The cartridge sets a channel's trigger bit; the per-tick scan consumes
//! it (clearing the bit back), decodes the registers into a [`Tone`], sets
//! the channel's status bit, and hands the tone to the [`AudioSink`].
//! Playback completion arrives on the sink's own clock through a
//! [`VoiceHandle`] and is folded into the status byte on the next scan.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::core::{Bus16, map};

/// Number of sound channels.
pub const CHANNEL_COUNT: usize = 4;

/// Each channel has a fixed window of registers
const CHANNEL_STRIDE: u16 = 4;

const TRIGGER_BIT: u8 = 0x01;

// Register-to-tone scaling, matching the console's tone hardware.
const FREQ_BASE_HZ: f32 = 20.0;
const FREQ_STEP_HZ: f32 = 3.84;
const DURATION_STEP_S: f32 = 0.032;
const VOLUME_SCALE: f32 = 0.5;
const DECAY_FLOOR: f32 = 0.001;

/// Channel oscillator shapes, selected by byte 3 bits 1-2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Waveform {
    Sine = 0,
    Sawtooth = 1,
    Square = 2,
    Triangle = 3,
}

impl Waveform {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Waveform::Sine,
            1 => Waveform::Sawtooth,
            2 => Waveform::Square,
            _ => Waveform::Triangle,
        }
    }

    /// Sample the shape at `phase` in [0, 1).
    fn sample(self, phase: f32) -> f32 {
        match self {
            Waveform::Sine => (std::f32::consts::TAU * phase).sin(),
            Waveform::Sawtooth => 2.0 * phase - 1.0,
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
        }
    }
}

/// One decoded tone event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tone {
    pub freq_start: f32,
    pub freq_end: f32,
    /// Seconds, up to 31 * 0.032.
    pub duration: f32,
    /// Normalized and capped below full scale.
    pub volume: f32,
    /// 0 disables the vibrato LFO.
    pub vibrato: u8,
    pub waveform: Waveform,
}

impl Tone {
    /// Decode a 4-byte channel register window.
    pub fn decode(regs: [u8; 4]) -> Self {
        Self {
            freq_start: FREQ_BASE_HZ + regs[0] as f32 * FREQ_STEP_HZ,
            freq_end: FREQ_BASE_HZ + regs[1] as f32 * FREQ_STEP_HZ,
            duration: ((regs[2] >> 3) & 0x1F) as f32 * DURATION_STEP_S,
            volume: (regs[2] & 0x07) as f32 / 7.0 * VOLUME_SCALE,
            vibrato: (regs[3] >> 4) & 0x07,
            waveform: Waveform::from_bits((regs[3] >> 1) & 0x03),
        }
    }

    /// LFO rate and depth in Hz for the vibrato field, or `None` when the
    /// field is zero.
    pub fn lfo(&self) -> Option<(f32, f32)> {
        (self.vibrato > 0).then(|| {
            (
                8.0 + self.vibrato as f32 * 2.0,
                10.0 + self.vibrato as f32 * 15.0,
            )
        })
    }

    /// Render the tone as mono samples at `sample_rate` Hz.
    ///
    /// Frequency sweeps exponentially from start to end over the duration
    /// and amplitude decays exponentially to near silence by its end; a
    /// nonzero vibrato adds a sine LFO on top of the sweep. A zero
    /// duration or volume renders nothing.
    pub fn render(&self, sample_rate: u32) -> Vec<f32> {
        let count = (self.duration * sample_rate as f32) as usize;
        if count == 0 || self.volume <= 0.0 {
            return Vec::new();
        }
        let dt = 1.0 / sample_rate as f32;
        let start = self.freq_start.max(FREQ_BASE_HZ);
        let sweep = self.freq_end.max(FREQ_BASE_HZ) / start;
        let decay = DECAY_FLOOR / self.volume;
        let lfo = self.lfo();

        let mut samples = Vec::with_capacity(count);
        let mut phase = 0.0f32;
        for i in 0..count {
            let t = i as f32 * dt;
            let progress = t / self.duration;
            let mut freq = start * sweep.powf(progress);
            if let Some((rate, depth)) = lfo {
                freq += depth * (std::f32::consts::TAU * rate * t).sin();
            }
            phase = (phase + freq.max(0.0) * dt).fract();
            let amp = self.volume * decay.powf(progress);
            samples.push(amp * self.waveform.sample(phase));
        }
        samples
    }
}

/// Completion flag for a playing channel.
///
/// The sink keeps its clone alive for as long as the tone is audible and
/// calls [`VoiceHandle::finish`] from whatever clock drives playback; the
/// scan folds the flag into the Sound Status byte afterwards.
#[derive(Debug, Clone, Default)]
pub struct VoiceHandle {
    done: Arc<AtomicBool>,
}

impl VoiceHandle {
    pub fn finish(&self) {
        self.done.store(true, Ordering::Release);
    }

    fn is_finished(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

/// Consumes tone events; the playback side of the console.
pub trait AudioSink {
    fn play(&mut self, channel: usize, tone: Tone, voice: VoiceHandle);
}

/// Discards tones, completing each voice immediately, so headless
/// sessions never wedge a channel in the busy state.
pub struct NullAudio;

impl AudioSink for NullAudio {
    fn play(&mut self, _channel: usize, _tone: Tone, voice: VoiceHandle) {
        voice.finish();
    }
}

/// Software representation of the sound peripheral.
pub struct Apu {
    voices: [Option<VoiceHandle>; CHANNEL_COUNT],
}

impl Apu {
    pub fn new() -> Self {
        Self {
            voices: Default::default(),
        }
    }

    /// Per-tick trigger scan.
    ///
    /// A channel whose status bit is still set ignores new triggers; the
    /// trigger bit is acknowledged (cleared) either way so the cartridge
    /// observes edge-triggered firing.
    pub fn scan(&mut self, bus: &mut Bus16, sink: &mut dyn AudioSink) {
        self.reap(bus);
        for chan in 0..CHANNEL_COUNT {
            let base = map::SOUND_SFX + chan as u16 * CHANNEL_STRIDE;
            let control = bus.get(base + 3);
            if control & TRIGGER_BIT == 0 {
                continue;
            }
            let status_mask = 1u8 << chan;
            if !bus.test_bits(map::SOUND_STATUS, status_mask) {
                let tone = Tone::decode([
                    bus.get(base),
                    bus.get(base + 1),
                    bus.get(base + 2),
                    control,
                ]);
                #[cfg(feature = "apu-trace")]
                log::trace!("channel {chan} fired: {tone:?}");
                let voice = VoiceHandle::default();
                self.voices[chan] = Some(voice.clone());
                bus.set_bits(map::SOUND_STATUS, status_mask);
                sink.play(chan, tone, voice);
            }
            bus.clear_bits(base + 3, TRIGGER_BIT);
        }
    }

    /// Fold asynchronous voice completions into the status byte.
    fn reap(&mut self, bus: &mut Bus16) {
        for (chan, slot) in self.voices.iter_mut().enumerate() {
            if slot.as_ref().is_some_and(|voice| voice.is_finished()) {
                bus.clear_bits(map::SOUND_STATUS, 1 << chan);
                *slot = None;
            }
        }
    }
}

impl Default for Apu {
    fn default() -> Self {
        Self::new()
    }
}
