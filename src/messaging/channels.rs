// Lock-free SPSC channels

use crate::messaging::command::TransportCommand;
use crate::sequencer::scheduler::ScheduledNote;
use ringbuf::traits::Producer;
use ringbuf::{HeapRb, traits::Split};
use std::sync::{Arc, Mutex};

/// Commands buffered between two transport frames
pub const COMMAND_QUEUE_CAPACITY: usize = 256;

pub type CommandProducer = ringbuf::HeapProd<TransportCommand>;
pub type CommandConsumer = ringbuf::HeapCons<TransportCommand>;

pub fn create_command_channel(capacity: usize) -> (CommandProducer, CommandConsumer) {
    let rb = HeapRb::<TransportCommand>::new(capacity);
    rb.split()
}

/// Cloneable sending side of a transport's command queue
///
/// Commands are applied by whoever owns the transport, on its next
/// `process_commands`.
#[derive(Clone)]
pub struct TransportControl {
    producer: Arc<Mutex<CommandProducer>>,
}

impl TransportControl {
    pub fn new(producer: CommandProducer) -> Self {
        Self {
            producer: Arc::new(Mutex::new(producer)),
        }
    }

    /// Queue `command`; hands it back when the queue is full
    pub fn send(&self, command: TransportCommand) -> Result<(), TransportCommand> {
        let mut producer = self
            .producer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        producer.try_push(command)
    }
}

impl std::fmt::Debug for TransportControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TransportControl")
    }
}

pub type NoteProducer = ringbuf::HeapProd<ScheduledNote>;
pub type NoteConsumer = ringbuf::HeapCons<ScheduledNote>;

/// Scheduler → audio output
pub fn create_note_channel(capacity: usize) -> (NoteProducer, NoteConsumer) {
    let rb = HeapRb::<ScheduledNote>::new(capacity);
    rb.split()
}
