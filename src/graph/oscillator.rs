use crate::graph::node::{AudioNode, Block};
use serde::{Deserialize, Serialize};
use std::any::Any;

pub const MIN_FREQUENCY_HZ: f32 = 20.0;
pub const MAX_FREQUENCY_HZ: f32 = 2000.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

impl std::fmt::Display for Waveform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Waveform::Sine => write!(f, "sine"),
            Waveform::Square => write!(f, "square"),
            Waveform::Sawtooth => write!(f, "sawtooth"),
            Waveform::Triangle => write!(f, "triangle"),
        }
    }
}

/// Naive (non-bandlimited) test oscillator, mono duplicated to both
/// channels. Phase accumulates in [0, 1).
pub struct OscillatorNode {
    waveform: Waveform,
    frequency_hz: f32,
    phase: f32,
    sample_rate: f32,
}

impl OscillatorNode {
    pub fn new(waveform: Waveform, frequency_hz: f32, sample_rate: f32) -> Self {
        Self {
            waveform,
            frequency_hz: frequency_hz.clamp(MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ),
            phase: 0.0,
            sample_rate,
        }
    }

    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.waveform = waveform;
    }

    pub fn set_frequency(&mut self, hz: f32) {
        self.frequency_hz = hz.clamp(MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ);
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    pub fn frequency(&self) -> f32 {
        self.frequency_hz
    }

    #[inline]
    fn sample(&self, phase: f32) -> f32 {
        match self.waveform {
            Waveform::Sine => (phase * std::f32::consts::TAU).sin(),
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Sawtooth => 2.0f32.mul_add(phase, -1.0),
            Waveform::Triangle => 4.0 * (phase - 0.5).abs() - 1.0,
        }
    }
}

impl AudioNode for OscillatorNode {
    fn process(&mut self, _input: &Block, output: &mut Block) {
        let step = self.frequency_hz / self.sample_rate;
        for i in 0..output.frames() {
            let s = self.sample(self.phase);
            output.left[i] = s;
            output.right[i] = s;
            self.phase += step;
            if self.phase >= 1.0 {
                self.phase -= 1.0;
            }
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
