//! Domain models for medscribe

pub mod recording;

pub use recording::{RecordingMetadata, RecordingRecord};
