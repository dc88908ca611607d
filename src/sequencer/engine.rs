// Transport engine - Runs a transport on its own frame thread
// Commands go through the transport's own lock-free queue; the latest snapshot is published for readers

use super::frame::FramePacer;
use super::subscribers::SubscriberCallback;
use super::transport::{Transport, TransportSnapshot};
use crate::messaging::channels::TransportControl;
use crate::messaging::command::TransportCommand;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Transport command queue is full")]
    QueueFull,

    #[error("Transport engine is shut down")]
    ShutDown,

    #[error("Failed to spawn transport thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Transport thread panicked")]
    Panicked,
}

fn lock(snapshot: &Mutex<TransportSnapshot>) -> MutexGuard<'_, TransportSnapshot> {
    snapshot
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Owns a `Transport` on a dedicated thread
///
/// Each frame the engine applies queued commands, runs `on_frame`, then
/// refreshes the published snapshot. Only the engine thread writes it.
pub struct TransportEngine {
    commands: TransportControl,
    snapshot: Arc<Mutex<TransportSnapshot>>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<Transport>>,
}

impl TransportEngine {
    /// Move `transport` onto a new thread ticking at `frame_rate` Hz
    pub fn spawn(transport: Transport, frame_rate: f64) -> Result<Self, EngineError> {
        let commands = transport.control();
        let snapshot = Arc::new(Mutex::new(transport.current_position()));
        let running = Arc::new(AtomicBool::new(true));

        let snapshot_clone = Arc::clone(&snapshot);
        let running_clone = Arc::clone(&running);
        let thread = thread::Builder::new()
            .name("transport-frames".to_string())
            .spawn(move || {
                run_frames(
                    transport,
                    snapshot_clone,
                    running_clone,
                    FramePacer::new(frame_rate),
                )
            })?;

        log::debug!("Transport engine started at {} fps", frame_rate);
        Ok(Self {
            commands,
            snapshot,
            running,
            thread: Some(thread),
        })
    }

    /// Queue a command for the next frame
    pub fn send(&mut self, command: TransportCommand) -> Result<(), EngineError> {
        if self.thread.is_none() {
            return Err(EngineError::ShutDown);
        }
        self.commands.send(command).map_err(|rejected| {
            log::warn!("Transport command queue full, dropping {:?}", rejected);
            EngineError::QueueFull
        })
    }

    pub fn play(&mut self) -> Result<(), EngineError> {
        self.send(TransportCommand::Play)
    }

    pub fn pause(&mut self) -> Result<(), EngineError> {
        self.send(TransportCommand::Pause)
    }

    pub fn stop(&mut self) -> Result<(), EngineError> {
        self.send(TransportCommand::Stop)
    }

    pub fn set_tempo(&mut self, bpm: f64) -> Result<(), EngineError> {
        self.send(TransportCommand::SetTempo(bpm))
    }

    pub fn subscribe(
        &mut self,
        id: impl Into<String>,
        callback: SubscriberCallback,
    ) -> Result<(), EngineError> {
        self.send(TransportCommand::Subscribe {
            id: id.into(),
            callback,
        })
    }

    /// Transport state as of the last completed frame
    pub fn snapshot(&self) -> TransportSnapshot {
        *lock(&self.snapshot)
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Stop the transport, join the thread and hand the transport back
    pub fn shutdown(mut self) -> Result<Transport, EngineError> {
        self.finish()
    }

    fn finish(&mut self) -> Result<Transport, EngineError> {
        let thread = self.thread.take().ok_or(EngineError::ShutDown)?;

        // Flag only: the queue belongs to the transport and outlives the engine
        self.running.store(false, Ordering::Release);

        let transport = thread.join().map_err(|_| EngineError::Panicked)?;
        *lock(&self.snapshot) = transport.current_position();
        log::debug!("Transport engine shut down");
        Ok(transport)
    }
}

impl Drop for TransportEngine {
    fn drop(&mut self) {
        if self.thread.is_some() {
            if let Err(err) = self.finish() {
                log::error!("Transport engine did not shut down cleanly: {}", err);
            }
        }
    }
}

impl std::fmt::Debug for TransportEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportEngine")
            .field("snapshot", &self.snapshot())
            .field("running", &self.is_running())
            .finish()
    }
}

fn run_frames(
    mut transport: Transport,
    snapshot: Arc<Mutex<TransportSnapshot>>,
    running: Arc<AtomicBool>,
    mut pacer: FramePacer,
) -> Transport {
    while running.load(Ordering::Acquire) {
        if !transport.process_commands() {
            break;
        }

        transport.on_frame();
        *lock(&snapshot) = transport.current_position();
        pacer.wait();
    }

    transport.stop();
    *lock(&snapshot) = transport.current_position();
    transport
}
