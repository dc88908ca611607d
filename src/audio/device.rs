// Audio device clock - Sample clock driven by the default output stream
// The stream renders silence; every callback advances the clock by the frames it wrote

use super::timing::{AudioClock, ClockError, SampleClock};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("No audio output device found")]
    NoDevice,

    #[error("Audio configuration error: {0}")]
    Config(#[from] cpal::DefaultStreamConfigError),

    #[error("Unsupported sample format: {0:?}. Supported formats: F32, I16, U16")]
    UnsupportedFormat(SampleFormat),

    #[error("Error in stream creation: {0}")]
    Build(#[from] cpal::BuildStreamError),

    #[error("Error starting stream: {0}")]
    Play(#[from] cpal::PlayStreamError),

    #[error("Error pausing stream: {0}")]
    Pause(#[from] cpal::PauseStreamError),

    #[error("Failed to spawn audio clock thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Audio clock thread is gone")]
    Disconnected,
}

type Reply = Sender<Result<(), DeviceError>>;
type Opened = Result<(SampleClock, String), DeviceError>;

enum StreamRequest {
    Play(Reply),
    Pause(Reply),
}

/// Clock driven by the default audio output device
///
/// Starts suspended, like a fresh audio context: `resume` starts the output
/// stream. `cpal::Stream` is not `Send`, so the stream lives on its own
/// thread and is controlled through requests. The thread exits when the
/// clock is dropped.
pub struct DeviceClock {
    clock: SampleClock,
    device_name: String,
    requests: Sender<StreamRequest>,
}

impl DeviceClock {
    /// Open the default output device of the default host
    pub fn open_default() -> Result<Self, DeviceError> {
        let (ready_tx, ready_rx) = mpsc::channel();
        let (requests, request_rx) = mpsc::channel();

        thread::Builder::new()
            .name("audio-clock".to_string())
            .spawn(move || run_stream(ready_tx, request_rx))?;

        let (clock, device_name) = ready_rx.recv().map_err(|_| DeviceError::Disconnected)??;
        log::info!(
            "Audio clock on '{}' at {} Hz",
            device_name,
            clock.sample_rate()
        );

        Ok(Self {
            clock,
            device_name,
            requests,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Sample counter advanced by the output callback
    pub fn sample_clock(&self) -> &SampleClock {
        &self.clock
    }

    /// Pause the output stream and freeze the clock
    pub fn suspend(&self) -> Result<(), DeviceError> {
        self.request(StreamRequest::Pause)?;
        self.clock.suspend();
        Ok(())
    }

    fn request(&self, make: impl FnOnce(Reply) -> StreamRequest) -> Result<(), DeviceError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.requests
            .send(make(reply_tx))
            .map_err(|_| DeviceError::Disconnected)?;
        reply_rx.recv().map_err(|_| DeviceError::Disconnected)?
    }
}

impl AudioClock for DeviceClock {
    fn now(&self) -> f64 {
        self.clock.now()
    }

    fn is_suspended(&self) -> bool {
        self.clock.is_suspended()
    }

    fn resume(&self) -> Result<(), ClockError> {
        self.request(StreamRequest::Play)
            .map_err(|e| ClockError::ResumeFailed(e.to_string()))?;
        self.clock.resume()
    }
}

impl std::fmt::Debug for DeviceClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceClock")
            .field("device", &self.device_name)
            .field("sample_rate", &self.clock.sample_rate())
            .field("suspended", &self.clock.is_suspended())
            .finish()
    }
}

/// Owns the stream for its whole life and serves play/pause requests
fn run_stream(ready: Sender<Opened>, requests: Receiver<StreamRequest>) {
    let (stream, clock, device_name) = match open_stream() {
        Ok(opened) => opened,
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };
    if ready.send(Ok((clock, device_name))).is_err() {
        return;
    }

    while let Ok(request) = requests.recv() {
        match request {
            StreamRequest::Play(reply) => {
                let _ = reply.send(stream.play().map_err(DeviceError::from));
            }
            StreamRequest::Pause(reply) => {
                let _ = reply.send(stream.pause().map_err(DeviceError::from));
            }
        }
    }
    log::debug!("Audio clock stream closed");
}

fn open_stream() -> Result<(Stream, SampleClock, String), DeviceError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(DeviceError::NoDevice)?;
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let supported_config = device.default_output_config()?;
    let sample_format = supported_config.sample_format();
    log::debug!("Audio config: {:?}", supported_config);

    let clock = SampleClock::suspended(supported_config.sample_rate().0 as f64);
    let config: StreamConfig = supported_config.into();

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, clock.clone()),
        SampleFormat::I16 => build_stream::<i16>(&device, &config, clock.clone()),
        SampleFormat::U16 => build_stream::<u16>(&device, &config, clock.clone()),
        other => return Err(DeviceError::UnsupportedFormat(other)),
    }?;

    // Some hosts start a stream as soon as it is built
    if let Err(err) = stream.pause() {
        log::debug!("Audio stream cannot be paused: {}", err);
    }
    Ok((stream, clock, device_name))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    clock: SampleClock,
) -> Result<Stream, DeviceError>
where
    T: SizedSample + Send + 'static,
{
    let channels = config.channels.max(1) as usize;
    let error_clock = clock.clone();

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            // No allocations, no locks
            data.fill(T::EQUILIBRIUM);
            clock.advance(data.len() / channels);
        },
        move |err| {
            log::error!("Audio stream error: {}", err);
            error_clock.suspend();
        },
        None,
    )?;
    Ok(stream)
}
