// Messaging - Lock-free queues between the control, frame and audio threads

pub mod channels;
pub mod command;
