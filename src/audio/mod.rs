//! # Audio Module
//!
//! Turns an uploaded audio file into the fixed-rate mono windows the
//! transcription pipeline feeds to the model.
//!
//! ## Key Components:
//! - **Decoder**: container/codec decoding (symphonia), deterministic mono
//!   down-mix, resampling to the model's sample rate (rubato)
//! - **Segmenter**: splits the waveform into bounded-duration windows
//!
//! ## Waveform contract:
//! - Samples are 32-bit floats in [-1.0, 1.0]
//! - Single channel; multi-channel input is folded by arithmetic mean
//! - Fixed 16 kHz sample rate (Whisper's native rate) after decoding

pub mod decoder;
pub mod segmenter;

pub use decoder::load_waveform;
pub use segmenter::segment_waveform;
