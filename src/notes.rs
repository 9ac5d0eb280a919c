use std::sync::{Arc, Mutex, mpsc};

use tokio::runtime::Runtime;

const FREQUENCY_A4: f64 = 440.0;

/// Closed set of playable pitches, equal-tempered steps up from A4.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pitch {
    A,
    ASharp,
    B,
    C,
}

impl Pitch {
    pub fn label(&self) -> &'static str {
        match self {
            Pitch::A => "A",
            Pitch::ASharp => "A#",
            Pitch::B => "B",
            Pitch::C => "C",
        }
    }

    fn semitones(&self) -> i32 {
        match self {
            Pitch::A => 0,
            Pitch::ASharp => 1,
            Pitch::B => 2,
            Pitch::C => 3,
        }
    }

    pub fn frequency(&self) -> f64 {
        FREQUENCY_A4 * 2.0f64.powf(f64::from(self.semitones()) / 12.0)
    }
}

#[derive(Debug)]
pub struct NoteState {
    pub gate: bool,
    pub pitch: Pitch,
}

impl NoteState {
    pub fn new() -> Self {
        Self {
            gate: false,
            pitch: Pitch::A,
        }
    }

    pub fn set_note(&mut self, pitch: Pitch) {
        self.pitch = pitch;
        self.gate = true;
    }

    pub fn release(&mut self) {
        self.gate = false;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoteCommand {
    NoteOn(Pitch),
    NoteOff,
}

pub type NoteHandle = (Arc<Mutex<NoteState>>, mpsc::Sender<NoteCommand>);

pub fn spawn_note_controller(runtime: &Runtime) -> NoteHandle {
    let (tx, rx) = mpsc::channel();
    let state = Arc::new(Mutex::new(NoteState::new()));
    let thread_state = state.clone();

    runtime.spawn_blocking(move || {
        while let Ok(cmd) = rx.recv() {
            let mut guard = thread_state.lock().expect("lock note state");
            match cmd {
                NoteCommand::NoteOn(pitch) => guard.set_note(pitch),
                NoteCommand::NoteOff => guard.release(),
            }
        }
    });

    (state, tx)
}
