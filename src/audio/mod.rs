// Audio module - Clock sources driven by the audio backend

pub mod device;
pub mod timing;
