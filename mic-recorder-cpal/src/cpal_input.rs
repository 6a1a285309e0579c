//! cpal input stream backend.
//!
//! `cpal::Stream` is not `Send` on every host, so each opened stream lives on
//! its own `cpal-input` owner thread. The [`CpalStream`] handle talks to that
//! thread over a command channel; dropping the handle closes the channel,
//! which drops the cpal stream and joins the thread.
//!
//! Samples arrive in whatever format the device runs natively (f32, i16, u16
//! or i32) and are packed into the requested bit depth inside the realtime
//! callback, using a scratch buffer allocated when the stream is built. A
//! device buffer larger than the scratch is delivered in several frame-aligned
//! pieces; the scratch never grows on the realtime thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender, SyncSender};
use std::sync::Arc;
use std::thread;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, SupportedBufferSize, SupportedStreamConfig};

use mic_recorder_core::models::audio_models::PcmFormat;
use mic_recorder_core::models::config::{PerformanceMode, SharingMode};
use mic_recorder_core::models::error::StreamError;
use mic_recorder_core::traits::stream_backend::{
    FrameCallback, HardwareStream, StreamBackend, StreamErrorCallback, StreamParams,
};

use crate::device_enumerator::DeviceEnumerator;
use crate::sample_convert::{pack_chunked, InputSample};

/// Scratch space reserved per stream, in milliseconds of packed audio.
const SCRATCH_MS: u32 = 100;

/// Buffer period requested for low-latency streams, in milliseconds.
const LOW_LATENCY_PERIOD_MS: u32 = 10;

type Reply = SyncSender<Result<(), StreamError>>;

enum Command {
    Play(Reply),
    Pause(Reply),
}

/// Opens input streams on the default cpal host.
#[derive(Debug, Clone, Default)]
pub struct CpalBackend {
    device_name: Option<String>,
}

impl CpalBackend {
    /// Capture from the host's default input device.
    pub fn default_device() -> Self {
        Self { device_name: None }
    }

    /// Capture from the input device called `name`.
    pub fn with_device(name: impl Into<String>) -> Self {
        Self {
            device_name: Some(name.into()),
        }
    }

    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }
}

impl StreamBackend for CpalBackend {
    type Stream = CpalStream;

    fn open_stream(
        &self,
        params: StreamParams,
        on_frames: FrameCallback,
        on_error: StreamErrorCallback,
    ) -> Result<CpalStream, StreamError> {
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<PcmFormat, StreamError>>(1);
        let (commands, command_rx) = mpsc::channel::<Command>();
        let delivering = Arc::new(AtomicBool::new(false));

        let device_name = self.device_name.clone();
        let gate = Arc::clone(&delivering);

        let handle = thread::Builder::new()
            .name("cpal-input".into())
            .spawn(move || {
                let (stream, format) =
                    match build_stream(device_name.as_deref(), params, on_frames, on_error, gate) {
                        Ok(built) => built,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                let _ = ready_tx.send(Ok(format));

                for command in command_rx {
                    match command {
                        Command::Play(reply) => {
                            let result = stream
                                .play()
                                .map_err(|e| StreamError::StartFailed(e.to_string()));
                            let _ = reply.send(result);
                        }
                        Command::Pause(reply) => {
                            let result = stream
                                .pause()
                                .map_err(|e| StreamError::StopFailed(e.to_string()));
                            let _ = reply.send(result);
                        }
                    }
                }
                drop(stream);
                log::debug!("cpal input stream closed");
            })
            .map_err(|e| StreamError::OpenFailed(format!("failed to spawn stream thread: {}", e)))?;

        let format = match ready_rx.recv() {
            Ok(Ok(format)) => format,
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(StreamError::OpenFailed(
                    "stream thread exited during setup".into(),
                ));
            }
        };

        log::info!(
            "cpal input stream open: {} Hz, {} ch, {} bit",
            format.sample_rate,
            format.channels,
            format.bit_depth
        );

        Ok(CpalStream {
            commands: Some(commands),
            thread: Some(handle),
            format,
            delivering,
        })
    }
}

/// Handle to a stream owned by a `cpal-input` thread.
pub struct CpalStream {
    commands: Option<Sender<Command>>,
    thread: Option<thread::JoinHandle<()>>,
    format: PcmFormat,
    delivering: Arc<AtomicBool>,
}

impl CpalStream {
    fn request(
        &self,
        command: fn(Reply) -> Command,
        fail: fn(String) -> StreamError,
    ) -> Result<(), StreamError> {
        let (reply, response) = mpsc::sync_channel(1);
        let sent = self
            .commands
            .as_ref()
            .is_some_and(|commands| commands.send(command(reply)).is_ok());
        if !sent {
            return Err(fail("stream thread is gone".into()));
        }
        response
            .recv()
            .unwrap_or_else(|_| Err(fail("stream thread is gone".into())))
    }
}

impl HardwareStream for CpalStream {
    fn start(&mut self) -> Result<(), StreamError> {
        // Open the gate first so the first hardware buffer is not lost.
        self.delivering.store(true, Ordering::Release);
        let result = self.request(Command::Play, StreamError::StartFailed);
        if result.is_err() {
            self.delivering.store(false, Ordering::Release);
        }
        result
    }

    fn stop(&mut self) -> Result<(), StreamError> {
        self.delivering.store(false, Ordering::Release);
        self.request(Command::Pause, StreamError::StopFailed)
    }

    fn negotiated_format(&self) -> PcmFormat {
        self.format
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        self.delivering.store(false, Ordering::Release);
        drop(self.commands.take());
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                log::error!("cpal input thread panicked");
            }
        }
    }
}

/// Runs on the owner thread.
fn build_stream(
    device_name: Option<&str>,
    params: StreamParams,
    on_frames: FrameCallback,
    on_error: StreamErrorCallback,
    gate: Arc<AtomicBool>,
) -> Result<(cpal::Stream, PcmFormat), StreamError> {
    let device = DeviceEnumerator::new().input_device(device_name)?;
    if let Ok(name) = device.name() {
        log::debug!("opening input device {:?}", name);
    }
    if params.sharing_mode_code == SharingMode::Exclusive.native_code() {
        log::debug!("exclusive sharing is not available through cpal; opening shared");
    }
    log::debug!(
        "input preset {} is left to the platform audio stack",
        params.input_preset_code
    );

    let supported = choose_config(&device, &params)?;
    let sample_format = supported.sample_format();
    let mut config = supported.config();

    let format = PcmFormat::new(config.sample_rate.0, config.channels, params.bit_depth);

    if params.performance_mode_code == PerformanceMode::LowLatency.native_code() {
        if let SupportedBufferSize::Range { min, max } = supported.buffer_size() {
            let period = config.sample_rate.0 * LOW_LATENCY_PERIOD_MS / 1000;
            config.buffer_size = BufferSize::Fixed(period.clamp(*min, *max));
        }
    }

    // One full period when it is known, so a normal buffer is a single piece.
    let period_bytes = match config.buffer_size {
        BufferSize::Fixed(frames) => frames as usize * format.frame_bytes(),
        BufferSize::Default => 0,
    };
    let scratch_bytes = period_bytes
        .max(format.bytes_for_millis(SCRATCH_MS))
        .max(format.frame_bytes());
    let scratch = Vec::with_capacity(scratch_bytes);

    let bit_depth = params.bit_depth;
    macro_rules! build {
        ($sample:ty) => {
            build_typed::<$sample>(&device, &config, bit_depth, on_frames, on_error, gate, scratch)
        };
    }
    let stream = match sample_format {
        SampleFormat::I16 => build!(i16),
        SampleFormat::U16 => build!(u16),
        SampleFormat::I32 => build!(i32),
        SampleFormat::F32 => build!(f32),
        other => {
            return Err(StreamError::OpenFailed(format!(
                "unsupported device sample format: {:?}",
                other
            )))
        }
    }
    .map_err(|e| StreamError::OpenFailed(e.to_string()))?;

    Ok((stream, format))
}

fn build_typed<T: InputSample>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    bit_depth: u16,
    mut on_frames: FrameCallback,
    on_error: StreamErrorCallback,
    gate: Arc<AtomicBool>,
    mut scratch: Vec<u8>,
) -> Result<cpal::Stream, cpal::BuildStreamError> {
    let channels = config.channels;
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            if !gate.load(Ordering::Acquire) {
                return;
            }
            pack_chunked(data, bit_depth, channels, &mut scratch, |bytes| (*on_frames)(bytes));
        },
        move |err: cpal::StreamError| (*on_error)(map_stream_error(err)),
        None,
    )
}

/// Native sample formats to try, best first, for a target bit depth.
fn preferred_formats(bit_depth: u16) -> [SampleFormat; 4] {
    if bit_depth == 16 {
        [SampleFormat::I16, SampleFormat::F32, SampleFormat::I32, SampleFormat::U16]
    } else {
        [SampleFormat::I32, SampleFormat::F32, SampleFormat::I16, SampleFormat::U16]
    }
}

/// Pick a device configuration with the requested channel count and rate.
/// Falls back to the device default, leaving rate and channel differences
/// for the session to reconcile.
fn choose_config(
    device: &cpal::Device,
    params: &StreamParams,
) -> Result<SupportedStreamConfig, StreamError> {
    let ranges: Vec<_> = device
        .supported_input_configs()
        .map_err(|e| StreamError::OpenFailed(format!("failed to query input configs: {}", e)))?
        .collect();
    let rate = cpal::SampleRate(params.sample_rate);

    for wanted in preferred_formats(params.bit_depth) {
        let found = ranges.iter().find(|range| {
            range.channels() == params.channels
                && range.sample_format() == wanted
                && range.min_sample_rate() <= rate
                && rate <= range.max_sample_rate()
        });
        if let Some(range) = found {
            return Ok(range.clone().with_sample_rate(rate));
        }
    }

    let fallback = device
        .default_input_config()
        .map_err(|e| StreamError::OpenFailed(format!("no usable input config: {}", e)))?;
    log::warn!(
        "device cannot capture {} Hz / {} ch; using its default {} Hz / {} ch",
        params.sample_rate,
        params.channels,
        fallback.sample_rate().0,
        fallback.channels()
    );
    Ok(fallback)
}

fn map_stream_error(err: cpal::StreamError) -> StreamError {
    match err {
        cpal::StreamError::DeviceNotAvailable => {
            StreamError::Disconnected("device not available".into())
        }
        cpal::StreamError::BackendSpecific { err } => StreamError::Disconnected(err.description),
    }
}
