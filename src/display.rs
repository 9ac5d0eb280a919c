use macroquad::{prelude::*, text::measure_text};

const LABEL_FONT_SIZE: u16 = 96;
const HINT_FONT_SIZE: u16 = 24;
const PAD: f32 = 24.0;

const AMBER: Color = Color {
    r: 0.98,
    g: 0.66,
    b: 0.12,
    a: 1.0,
};
const AMBER_DIM: Color = Color {
    r: 0.78,
    g: 0.52,
    b: 0.08,
    a: 0.4,
};
const BACKGROUND: Color = Color {
    r: 0.02,
    g: 0.02,
    b: 0.02,
    a: 1.0,
};

/// Placeholder cue while a note sounds: a filled plate with the note label.
pub fn show_active_note(label: &str) {
    clear_background(BACKGROUND);
    let dims = measure_text(label, None, LABEL_FONT_SIZE, 1.0);
    let x = (screen_width() - dims.width) * 0.5;
    let y = (screen_height() + dims.height) * 0.5;
    draw_rectangle(
        x - PAD,
        y - dims.height - PAD,
        dims.width + PAD * 2.0,
        dims.height + PAD * 2.0,
        AMBER_DIM,
    );
    draw_text(label, x, y, f32::from(LABEL_FONT_SIZE), AMBER);
    draw_key_hint();
}

pub fn show_silence() {
    clear_background(BACKGROUND);
    draw_key_hint();
}

fn draw_key_hint() {
    let hint = "A S D F to play, Esc to quit";
    let dims = measure_text(hint, None, HINT_FONT_SIZE, 1.0);
    draw_text(
        hint,
        (screen_width() - dims.width) * 0.5,
        screen_height() - PAD,
        f32::from(HINT_FONT_SIZE),
        AMBER_DIM,
    );
}
