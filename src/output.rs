use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use cpal::{
    SampleFormat, SampleRate, Stream,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};
use macroquad::logging::warn;

use crate::oscillator::SampleProducer;

type SampleQueue = Arc<Mutex<VecDeque<i16>>>;

/// Fixed at startup; no runtime reconfiguration.
pub struct AudioConfig {
    pub sample_rate: u32,
    pub amplitude: i16,
    pub block_size: usize,
    pub low_water_mark: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        let block_size = 2048;
        Self {
            sample_rate: 44_100,
            amplitude: 28_000,
            block_size,
            // refill while less than 3/4 of a block is queued: enough to
            // survive a slow frame, small enough to keep key-to-ear latency
            // under two block durations
            low_water_mark: block_size * 3 / 4,
        }
    }
}

/// What the feeder needs from an output device. The real device is cpal
/// behind a queue; tests substitute a mock with a deterministic drain.
pub trait OutputDevice {
    fn enqueue(&mut self, block: &[i16]) -> Result<()>;
    fn queued_samples(&self) -> usize;
    fn underruns(&self) -> u64;
}

pub struct CpalOutput {
    queue: SampleQueue,
    underruns: Arc<AtomicU64>,
    failed: Arc<AtomicBool>,
    sample_rate: f64,
    _stream: Stream,
}

impl CpalOutput {
    pub fn open(config: &AudioConfig) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow!("no default audio output device"))?;
        let requested = config.sample_rate;
        let supported = match device.supported_output_configs()?.find(|range| {
            range.min_sample_rate().0 <= requested && requested <= range.max_sample_rate().0
        }) {
            Some(range) => range.with_sample_rate(SampleRate(requested)),
            None => device.default_output_config()?,
        };
        let stream_config = supported.config();
        let sample_rate = f64::from(stream_config.sample_rate.0);

        let queue: SampleQueue = Arc::new(Mutex::new(VecDeque::new()));
        let underruns = Arc::new(AtomicU64::new(0));
        let failed = Arc::new(AtomicBool::new(false));

        let stream = match supported.sample_format() {
            SampleFormat::I16 => build_stream_i16(
                &device,
                &stream_config,
                queue.clone(),
                underruns.clone(),
                failed.clone(),
            )?,
            SampleFormat::U16 => build_stream_u16(
                &device,
                &stream_config,
                queue.clone(),
                underruns.clone(),
                failed.clone(),
            )?,
            _ => build_stream_f32(
                &device,
                &stream_config,
                queue.clone(),
                underruns.clone(),
                failed.clone(),
            )?,
        };
        stream.play()?;

        Ok(Self {
            queue,
            underruns,
            failed,
            sample_rate,
            _stream: stream,
        })
    }

    /// The rate the device actually opened at; the configured rate is a
    /// request, not a guarantee.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }
}

impl OutputDevice for CpalOutput {
    fn enqueue(&mut self, block: &[i16]) -> Result<()> {
        if self.failed.load(Ordering::Relaxed) {
            return Err(anyhow!(
                "audio stream reported an error; output is unusable"
            ));
        }
        let mut queue = self.queue.lock().expect("queue lock");
        queue.extend(block.iter().copied());
        Ok(())
    }

    fn queued_samples(&self) -> usize {
        self.queue.lock().expect("queue lock").len()
    }

    fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        // discard whatever is still pending so the stream drops from silence
        self.queue.lock().expect("queue lock").clear();
    }
}

fn build_stream_f32(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: SampleQueue,
    underruns: Arc<AtomicU64>,
    failed: Arc<AtomicBool>,
) -> Result<Stream> {
    let channels = config.channels as usize;
    let config = config.clone();
    let stream = device.build_output_stream(
        &config,
        move |output: &mut [f32], _| {
            fill_output_buffer(output, channels, &queue, &underruns, |sample| {
                f32::from(sample) / f32::from(i16::MAX)
            });
        },
        move |err| {
            failed.store(true, Ordering::Relaxed);
            eprintln!("audio stream error: {err}");
        },
        None,
    )?;
    Ok(stream)
}

fn build_stream_i16(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: SampleQueue,
    underruns: Arc<AtomicU64>,
    failed: Arc<AtomicBool>,
) -> Result<Stream> {
    let channels = config.channels as usize;
    let config = config.clone();
    let stream = device.build_output_stream(
        &config,
        move |output: &mut [i16], _| {
            fill_output_buffer(output, channels, &queue, &underruns, |sample| sample);
        },
        move |err| {
            failed.store(true, Ordering::Relaxed);
            eprintln!("audio stream error: {err}");
        },
        None,
    )?;
    Ok(stream)
}

fn build_stream_u16(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: SampleQueue,
    underruns: Arc<AtomicU64>,
    failed: Arc<AtomicBool>,
) -> Result<Stream> {
    let channels = config.channels as usize;
    let config = config.clone();
    let stream = device.build_output_stream(
        &config,
        move |output: &mut [u16], _| {
            fill_output_buffer(output, channels, &queue, &underruns, |sample| {
                (i32::from(sample) - i32::from(i16::MIN)) as u16
            });
        },
        move |err| {
            failed.store(true, Ordering::Relaxed);
            eprintln!("audio stream error: {err}");
        },
        None,
    )?;
    Ok(stream)
}

fn fill_output_buffer<T, F>(
    output: &mut [T],
    channels: usize,
    queue: &SampleQueue,
    underruns: &AtomicU64,
    mut convert: F,
) where
    F: FnMut(i16) -> T,
    T: Copy,
{
    let mut queue = queue.lock().expect("queue lock");
    let mut starved = false;
    for frame in output.chunks_mut(channels) {
        let sample = match queue.pop_front() {
            Some(sample) => sample,
            None => {
                starved = true;
                0
            }
        };
        let value = convert(sample);
        for channel in frame {
            *channel = value;
        }
    }
    if starved {
        underruns.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct StreamFeeder {
    producer: SampleProducer,
    block: Vec<i16>,
    low_water_mark: usize,
    seen_underruns: u64,
}

impl StreamFeeder {
    pub fn new(producer: SampleProducer, config: &AudioConfig) -> Self {
        Self {
            producer,
            block: vec![0; config.block_size],
            low_water_mark: config.low_water_mark,
            seen_underruns: 0,
        }
    }

    /// One feeding decision per main-loop iteration. Produces and enqueues a
    /// block only when the queue has drained below the low-water mark.
    /// Returns whether a block was enqueued; an enqueue error propagates and
    /// is not retried within the iteration.
    pub fn feed_if_needed<D: OutputDevice>(&mut self, device: &mut D) -> Result<bool> {
        let underruns = device.underruns();
        if underruns > self.seen_underruns && self.producer.gate() {
            warn!("audio underrun (total {underruns}); the feeder is falling behind");
        }
        self.seen_underruns = underruns;

        if device.queued_samples() >= self.low_water_mark {
            return Ok(false);
        }
        self.producer.produce(&mut self.block);
        device.enqueue(&self.block)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::{NoteState, Pitch};
    use std::f64::consts::TAU;

    struct MockDevice {
        queued: VecDeque<i16>,
        underruns: u64,
        fail_enqueue: bool,
    }

    impl MockDevice {
        fn new() -> Self {
            Self {
                queued: VecDeque::new(),
                underruns: 0,
                fail_enqueue: false,
            }
        }

        fn drain(&mut self, samples: usize) {
            for _ in 0..samples {
                if self.queued.pop_front().is_none() {
                    self.underruns += 1;
                    return;
                }
            }
        }
    }

    impl OutputDevice for MockDevice {
        fn enqueue(&mut self, block: &[i16]) -> Result<()> {
            if self.fail_enqueue {
                return Err(anyhow!("device rejected the block"));
            }
            self.queued.extend(block.iter().copied());
            Ok(())
        }

        fn queued_samples(&self) -> usize {
            self.queued.len()
        }

        fn underruns(&self) -> u64 {
            self.underruns
        }
    }

    fn gated_feeder(config: &AudioConfig) -> StreamFeeder {
        let note = Arc::new(Mutex::new(NoteState::new()));
        note.lock().expect("lock note state").set_note(Pitch::A);
        let producer = SampleProducer::new(note, config.amplitude, f64::from(config.sample_rate));
        StreamFeeder::new(producer, config)
    }

    #[test]
    fn feeder_never_lets_the_queue_run_dry() {
        let config = AudioConfig::default();
        let mut feeder = gated_feeder(&config);
        let mut device = MockDevice::new();

        // one feed opportunity every half block of drain, the nominal
        // cadence the low-water mark is tuned for
        let drain_per_cycle = config.block_size / 2;
        for cycle in 0..1_000 {
            feeder.feed_if_needed(&mut device).expect("feed");
            device.drain(drain_per_cycle);
            assert!(
                device.queued_samples() > 0,
                "queue ran dry on cycle {cycle}"
            );
            assert!(
                device.queued_samples() <= config.low_water_mark + config.block_size,
                "queue grew past one block over the low-water mark on cycle {cycle}"
            );
        }
        assert_eq!(device.underruns(), 0);
    }

    #[test]
    fn feeder_is_idle_above_the_low_water_mark() {
        let config = AudioConfig::default();
        let mut feeder = gated_feeder(&config);
        let mut device = MockDevice::new();
        device.queued.extend(vec![0i16; config.low_water_mark]);

        let fed = feeder.feed_if_needed(&mut device).expect("feed");
        assert!(!fed);
        assert_eq!(device.queued_samples(), config.low_water_mark);
    }

    #[test]
    fn feeder_enqueues_one_block_below_the_low_water_mark() {
        let config = AudioConfig::default();
        let mut feeder = gated_feeder(&config);
        let mut device = MockDevice::new();

        let fed = feeder.feed_if_needed(&mut device).expect("feed");
        assert!(fed);
        assert_eq!(device.queued_samples(), config.block_size);
    }

    #[test]
    fn enqueue_failure_propagates() {
        let config = AudioConfig::default();
        let mut feeder = gated_feeder(&config);
        let mut device = MockDevice::new();
        device.fail_enqueue = true;

        assert!(feeder.feed_if_needed(&mut device).is_err());
    }

    #[test]
    fn underruns_do_not_corrupt_the_waveform() {
        let config = AudioConfig::default();
        let mut feeder = gated_feeder(&config);
        let mut device = MockDevice::new();

        feeder.feed_if_needed(&mut device).expect("feed");
        let mut heard: Vec<i16> = device.queued.drain(..).collect();
        device.drain(16); // starved: counts an underrun, corrupts nothing
        assert_eq!(device.underruns(), 1);

        feeder.feed_if_needed(&mut device).expect("feed");
        heard.extend(device.queued.iter().copied());

        // the stream picks up where it left off
        let increment = TAU * Pitch::A.frequency() / f64::from(config.sample_rate);
        for (index, sample) in heard.iter().enumerate() {
            let phase = (index as f64 * increment) % TAU;
            let expected = (f64::from(config.amplitude) * phase.sin()) as i16;
            assert!(
                (i32::from(*sample) - i32::from(expected)).abs() <= 1,
                "sample {index}: expected {expected}, got {sample}"
            );
        }
    }
}
