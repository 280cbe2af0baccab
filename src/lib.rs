//! # fretscribe
//!
//! Streaming transcription of a mono guitar recording into
//! note events: semitone-grid spectral estimation, harmonic-bleed rejection,
//! per-string polyphony reduction and a cross-frame note-event state machine.
//!
//! ## Example
//! ```rust
//! use fretscribe::{EventRecorder, Transcriber, TranscriberConfig};
//!
//! fn run() -> Result<(), Box<dyn std::error::Error>> {
//!     // 1) Build an immutable configuration
//!     let config = TranscriberConfig::builder()
//!         .sample_rate(44_100)
//!         .threshold_db(-50.0)
//!         .build()?;
//!
//!     // 2) Build the pipeline
//!     let mut transcriber = Transcriber::new(config)?;
//!
//!     // 3) Feed signed 16-bit little-endian mono PCM
//!     let pcm: Vec<u8> = vec![0; 8192 * 2 * 4]; // fill with actual samples
//!     let mut events = EventRecorder::new();
//!     let summary = transcriber.run(pcm.as_slice(), &mut events, |_| {})?;
//!     println!("{} frames, {} notes", summary.frames, summary.note_ons);
//!
//!     Ok(())
//! }
//! # run().unwrap();
//! ```
//!
//! ## Features
//! - `parallel`: evaluate semitone bins on the `rayon` thread pool

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rust_2018_idioms)]
#![deny(clippy::all)]

/// Streaming pipeline driver.
pub use transcriber::{BinReading, FrameReport, Summary, TranscribeError, Transcriber};

/// Configuration types.
pub use config::{
    ConfigError, RegisterMargins, RegisterTable, TranscriberConfig, TranscriberConfigBuilder,
};

/// Note events and the state machine producing them.
pub use note_events::{NoteEvent, NoteEventMachine, NoteState, TimedEvent};

/// Event sinks.
pub use midi::{EventRecorder, EventSink, SinkError, SmfWriter};

/// Per-frame candidate sets.
pub use candidates::{Candidate, CandidateSet};

/// Spectral estimation.
pub use spectrum::{SpectralEstimator, SpectrumError, SpectrumVector};

/// Semitone grid.
pub mod semitone;

/// Configuration module.
pub mod config;

/// Overlapping PCM frame reader.
pub mod frame_source;

/// Spectral Estimator module.
pub mod spectrum;

/// Harmonic Discriminator module.
pub mod harmonic;

/// Candidate set module.
pub mod candidates;

/// Polyphony Reducer module.
pub mod polyphony;

/// Note-Event State Machine module.
pub mod note_events;

/// Event Sink module.
pub mod midi;

/// Pipeline driver module.
pub mod transcriber;
