//! Sound effects synthesised at startup and played through macroquad audio.
//!
//! Every effect is a single sine tone with an exponential decay to near silence.
//! Tones are rendered once into 16-bit mono WAV buffers owned by [`AudioOutput`],
//! which the frame loop holds for as long as the window is open.

use log::{debug, warn};
use macroquad::audio::{load_sound_from_bytes, play_sound, PlaySoundParams, Sound};
use std::collections::HashMap;
use std::f32::consts::TAU;
use thiserror::Error;

pub const SAMPLE_RATE: u32 = 22_050;
pub const MASTER_VOLUME: f32 = 0.3;

/// Level the decay envelope reaches at the end of a tone
const DECAY_FLOOR: f32 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundEffect {
    Move,
    Hit,
    Clear,
}

impl SoundEffect {
    pub const ALL: [SoundEffect; 3] = [SoundEffect::Move, SoundEffect::Hit, SoundEffect::Clear];

    pub fn tone(self) -> Tone {
        match self {
            SoundEffect::Move => Tone::steady(440.0, 0.05, 0.3),
            SoundEffect::Hit => Tone::steady(120.0, 0.1, 0.5),
            SoundEffect::Clear => Tone {
                start_hz: 660.0,
                end_hz: 880.0,
                sweep_secs: 0.2,
                duration_secs: 0.5,
                volume: 0.4,
            },
        }
    }
}

/// A sine tone whose pitch ramps linearly from `start_hz` to `end_hz` over
/// `sweep_secs`, then holds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tone {
    pub start_hz: f32,
    pub end_hz: f32,
    pub sweep_secs: f32,
    pub duration_secs: f32,
    pub volume: f32,
}

impl Tone {
    pub fn steady(hz: f32, duration_secs: f32, volume: f32) -> Self {
        Self {
            start_hz: hz,
            end_hz: hz,
            sweep_secs: 0.0,
            duration_secs,
            volume,
        }
    }

    pub fn frequency_at(&self, t: f32) -> f32 {
        if self.sweep_secs <= 0.0 || t >= self.sweep_secs {
            self.end_hz
        } else {
            self.start_hz + (self.end_hz - self.start_hz) * (t / self.sweep_secs)
        }
    }

    /// Exponential ramp from `volume` down to the decay floor at `duration_secs`
    pub fn gain_at(&self, t: f32) -> f32 {
        let progress = (t / self.duration_secs).clamp(0.0, 1.0);
        self.volume * (DECAY_FLOOR / self.volume).powf(progress)
    }
}

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("failed to load {effect:?} sound: {reason}")]
    Load { effect: SoundEffect, reason: String },
}

/// Renders a tone to samples in [-1, 1]
pub fn synthesize(tone: &Tone, sample_rate: u32) -> Vec<f32> {
    let count = (tone.duration_secs * sample_rate as f32).round() as usize;
    let step = 1.0 / sample_rate as f32;
    let mut phase = 0.0_f32;

    (0..count)
        .map(|i| {
            let t = i as f32 * step;
            let sample = phase.sin() * tone.gain_at(t);
            phase = (phase + TAU * tone.frequency_at(t) * step) % TAU;
            sample
        })
        .collect()
}

/// Packs samples into a 16-bit PCM mono WAV file
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    const BITS_PER_SAMPLE: u16 = 16;
    const CHANNELS: u16 = 1;

    let block_align = CHANNELS * BITS_PER_SAMPLE / 8;
    let byte_rate = sample_rate * block_align as u32;
    let data_len = (samples.len() * block_align as usize) as u32;

    let mut wav = Vec::with_capacity(44 + data_len as usize);
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVE");

    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&CHANNELS.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    for sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        wav.extend_from_slice(&value.to_le_bytes());
    }

    wav
}

/// Owned handle to the loaded effects
pub struct AudioOutput {
    master_volume: f32,
    sounds: HashMap<SoundEffect, Sound>,
}

impl AudioOutput {
    pub async fn load(master_volume: f32) -> Result<Self, AudioError> {
        let mut sounds = HashMap::new();

        for effect in SoundEffect::ALL {
            let wav = encode_wav(&synthesize(&effect.tone(), SAMPLE_RATE), SAMPLE_RATE);
            let sound = load_sound_from_bytes(&wav)
                .await
                .map_err(|e| AudioError::Load {
                    effect,
                    reason: format!("{:?}", e),
                })?;
            sounds.insert(effect, sound);
        }

        debug!("Loaded {} sound effects", sounds.len());
        Ok(Self {
            master_volume,
            sounds,
        })
    }

    pub fn play(&self, effect: SoundEffect) {
        match self.sounds.get(&effect) {
            Some(sound) => play_sound(
                sound,
                PlaySoundParams {
                    looped: false,
                    volume: self.master_volume,
                },
            ),
            None => warn!("No sound loaded for {:?}", effect),
        }
    }
}
