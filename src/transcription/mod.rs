//! # Transcription Module
//!
//! Speech-to-text via Whisper models running on Candle-rs. Pure Rust, no FFI
//! bindings to whisper.cpp required.
//!
//! ## Key Components:
//! - **Model**: Checkpoint resolution (local directory or HuggingFace repo),
//!   weight loading and greedy per-window decoding
//! - **Engine**: Owns the loaded model, loads it once per location, and
//!   serializes inference so one window runs at a time
//! - **Pipeline**: Turns an uploaded recording into a saved note, reporting
//!   per-window progress and isolating per-window failures
//!
//! ## Candle-rs Integration:
//! Using Candle instead of whisper.cpp FFI keeps the build pure Rust, plays
//! well with tokio (heavy work hops onto blocking threads), and picks up
//! CUDA/Metal automatically when the hardware is there.

pub mod engine; // Model residency and serialized inference
pub mod model; // Whisper checkpoint loading and decoding
pub mod pipeline; // Upload -> windows -> progress -> note

pub use engine::TranscriptionEngine;
pub use pipeline::{run_transcription_job, JobOutcome, JobState, ProgressEvent};
