use std::f64::consts::TAU;
use std::sync::{Arc, Mutex};

use crate::notes::NoteState;

/// Phase accumulator for a single sine voice. Phase stays in [0, TAU) and
/// wraps by subtraction so the waveform never jumps across a wrap.
pub struct Oscillator {
    phase: f64,
    frequency: f64,
    phase_increment: f64,
    sample_rate: f64,
}

impl Oscillator {
    pub fn new(frequency: f64, sample_rate: f64) -> Self {
        let mut oscillator = Self {
            phase: 0.0,
            frequency: 0.0,
            phase_increment: 0.0,
            sample_rate: sample_rate.max(1.0),
        };
        oscillator.set_frequency(frequency);
        oscillator
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn set_frequency(&mut self, frequency: f64) {
        self.frequency = frequency;
        self.phase_increment = TAU * frequency / self.sample_rate;
    }

    fn next_sample(&mut self) -> f64 {
        let value = self.phase.sin();
        self.phase += self.phase_increment;
        if self.phase >= TAU {
            self.phase -= TAU;
        }
        value
    }
}

pub struct SampleProducer {
    oscillator: Oscillator,
    note: Arc<Mutex<NoteState>>,
    amplitude: f64,
}

impl SampleProducer {
    pub fn new(note: Arc<Mutex<NoteState>>, amplitude: i16, sample_rate: f64) -> Self {
        let frequency = note.lock().expect("lock note state").pitch.frequency();
        Self {
            oscillator: Oscillator::new(frequency, sample_rate),
            note,
            amplitude: f64::from(amplitude),
        }
    }

    pub fn gate(&self) -> bool {
        self.note.lock().expect("lock note state").gate
    }

    /// Fills one block of mono samples. Gate and frequency are snapshotted
    /// once per call, so a key event lands at the next block boundary at the
    /// latest. With the gate closed the block is silence and the phase is
    /// left untouched; the tone resumes exactly where it paused.
    pub fn produce(&mut self, out: &mut [i16]) {
        let (gate, frequency) = {
            let guard = self.note.lock().expect("lock note state");
            (guard.gate, guard.pitch.frequency())
        };
        if !gate {
            out.fill(0);
            return;
        }
        if frequency != self.oscillator.frequency() {
            self.oscillator.set_frequency(frequency);
        }
        for slot in out.iter_mut() {
            *slot = (self.amplitude * self.oscillator.next_sample()) as i16;
        }
    }
}
