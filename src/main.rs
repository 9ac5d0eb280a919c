mod display;
mod input;
mod notes;
mod oscillator;
mod output;

use input::InputMapper;
use macroquad::logging::{error, info};
use macroquad::prelude::*;
use notes::spawn_note_controller;
use oscillator::SampleProducer;
use output::{AudioConfig, CpalOutput, StreamFeeder};
use tokio::runtime::Runtime;

const SCREEN_WIDTH: f32 = 400.0;
const SCREEN_HEIGHT: f32 = 300.0;

#[macroquad::main(window_conf)]
async fn main() {
    let runtime = Runtime::new().expect("tokio runtime");
    let (note_state, note_tx) = spawn_note_controller(&runtime);

    let config = AudioConfig::default();
    let mut device = match CpalOutput::open(&config) {
        Ok(device) => device,
        Err(err) => {
            error!("failed to open audio output: {err:#}");
            std::process::exit(1);
        }
    };
    info!("audio output open at {} Hz", device.sample_rate());

    let producer = SampleProducer::new(note_state.clone(), config.amplitude, device.sample_rate());
    let mut feeder = StreamFeeder::new(producer, &config);
    let mapper = InputMapper::new();

    prevent_quit();

    loop {
        if is_quit_requested() || is_key_pressed(KeyCode::Escape) {
            break;
        }

        for command in mapper.poll() {
            if note_tx.send(command).is_err() {
                error!("note controller stopped; shutting down");
                std::process::exit(1);
            }
        }

        if let Err(err) = feeder.feed_if_needed(&mut device) {
            error!("audio output failed: {err:#}");
            std::process::exit(1);
        }

        let (gate, label) = {
            let guard = note_state.lock().expect("lock note state");
            (guard.gate, guard.pitch.label())
        };
        if gate {
            display::show_active_note(label);
        } else {
            display::show_silence();
        }

        next_frame().await;
    }

    // dropping the handle discards the pending queue and closes the stream
    drop(device);
    info!("audio output released");
}

fn window_conf() -> Conf {
    Conf {
        window_title: "Sinekeys (a-s-d-f to play)".into(),
        fullscreen: false,
        sample_count: 1,
        window_width: SCREEN_WIDTH as i32,
        window_height: SCREEN_HEIGHT as i32,
        high_dpi: false,
        ..Default::default()
    }
}
