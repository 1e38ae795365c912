//! # HTTP Request Handlers
//!
//! The JSON route layer over the transcription pipeline and note store.
//!
//! ## Modules:
//! - **notes**: CRUD + download for persisted notes
//! - **transcribe**: audio upload intake and the progress-streaming protocol
//! - **audio**: playback of retained audio artifacts

pub mod audio;
pub mod notes;
pub mod transcribe;

pub use audio::serve_audio;
pub use notes::{create_note, delete_note, download_note, get_note, list_notes, update_note};
pub use transcribe::{heartbeat, transcribe};
