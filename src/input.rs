use std::collections::HashMap;

use macroquad::prelude::*;

use crate::notes::{NoteCommand, Pitch};

#[derive(Clone, Copy)]
pub struct KeyBinding {
    pub keycode: KeyCode,
    pub pitch: Pitch,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeySignal {
    Down(KeyCode),
    Up(KeyCode),
}

pub struct InputMapper {
    bindings: Vec<KeyBinding>,
    lookup: HashMap<KeyCode, Pitch>,
}

impl InputMapper {
    pub fn new() -> Self {
        let bindings = vec![
            KeyBinding {
                keycode: KeyCode::A,
                pitch: Pitch::A,
            },
            KeyBinding {
                keycode: KeyCode::S,
                pitch: Pitch::ASharp,
            },
            KeyBinding {
                keycode: KeyCode::D,
                pitch: Pitch::B,
            },
            KeyBinding {
                keycode: KeyCode::F,
                pitch: Pitch::C,
            },
        ];
        let lookup = bindings
            .iter()
            .map(|binding| (binding.keycode, binding.pitch))
            .collect();
        Self { bindings, lookup }
    }

    /// Monophonic mapping: the most recent key-down owns the pitch, and any
    /// bound key-up gates off, even when another bound key is still held.
    /// Unbound keys map to nothing.
    pub fn command_for(&self, signal: KeySignal) -> Option<NoteCommand> {
        match signal {
            KeySignal::Down(code) => self
                .lookup
                .get(&code)
                .map(|pitch| NoteCommand::NoteOn(*pitch)),
            KeySignal::Up(code) => self
                .lookup
                .contains_key(&code)
                .then_some(NoteCommand::NoteOff),
        }
    }

    /// Polls macroquad's per-frame key state. Releases are mapped before
    /// presses so a new note struck on the same frame as a release wins.
    pub fn poll(&self) -> Vec<NoteCommand> {
        let mut commands = Vec::new();
        for binding in &self.bindings {
            if is_key_released(binding.keycode) {
                commands.extend(self.command_for(KeySignal::Up(binding.keycode)));
            }
        }
        for binding in &self.bindings {
            if is_key_pressed(binding.keycode) {
                commands.extend(self.command_for(KeySignal::Down(binding.keycode)));
            }
        }
        commands
    }
}
