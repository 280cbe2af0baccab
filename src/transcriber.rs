//! Transcriber
//!
//! Drives frames through estimation, judging, reduction and the note-event
//! state machine, and hands the resulting events to a sink.

use crate::candidates::CandidateSet;
use crate::config::{ConfigError, TranscriberConfig};
use crate::frame_source::FrameSource;
use crate::harmonic::{equalize, judge, to_db};
use crate::midi::{EventSink, SinkError};
use crate::note_events::{NoteEvent, NoteEventMachine, TimedEvent};
use crate::polyphony::reduce;
use crate::semitone::{note_for_index, note_name};
use crate::spectrum::{SpectralEstimator, SpectrumError};
use std::fmt::{self, Display};
use std::io::Read;
use thiserror::Error;

/// Errors returned while transcribing a stream.
#[derive(Debug, Error)]
pub enum TranscribeError {
    /// The configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// A frame did not match the estimator.
    #[error(transparent)]
    Spectrum(#[from] SpectrumError),

    /// Reading the input failed for a reason other than running out of data.
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),

    /// The event sink rejected an event.
    #[error("failed to write events: {0}")]
    Sink(#[from] SinkError),
}

/// Level of one audible bin in one frame.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BinReading {
    /// Semitone bin.
    pub bin: usize,
    /// Absolute note of the bin.
    pub note: u8,
    /// Linear amplitude.
    pub amplitude: f32,
    /// Amplitude in decibels.
    pub db: f32,
    /// Whether the bin passed the harmonic tests.
    pub genuine: bool,
}

/// Diagnostics and events of one processed frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    /// Frame index, starting at 0.
    pub index: u64,
    /// Bins above the threshold, lowest first.
    pub readings: Vec<BinReading>,
    /// Events emitted by this frame.
    pub events: Vec<TimedEvent>,
}

impl Display for FrameReport {
    /// One meter row per audible bin.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in &self.readings {
            let stars = ((60.0 + r.db) / 2.0).max(0.0) as usize;
            writeln!(
                f,
                "{:3} {:2} {:3} {:>4} {:8.6} {:6.2} dB {} {}",
                self.index,
                r.bin,
                r.note,
                note_name(r.note),
                r.amplitude,
                r.db,
                if r.genuine { '+' } else { ' ' },
                "*".repeat(stars)
            )?;
        }
        Ok(())
    }
}

/// Totals for one transcribed stream.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    /// Frames analysed.
    pub frames: u64,
    /// NoteOn events written.
    pub note_ons: usize,
    /// NoteOff events written.
    pub note_offs: usize,
    /// Length of the track in ticks, end-of-track marker included.
    pub total_ticks: u64,
}

impl Summary {
    fn count(&mut self, event: &TimedEvent) {
        match event.event {
            NoteEvent::NoteOn { .. } => self.note_ons += 1,
            NoteEvent::NoteOff { .. } => self.note_offs += 1,
        }
        self.total_ticks += event.delta_ticks as u64;
    }
}

/// Streaming audio-to-note-event pipeline.
pub struct Transcriber {
    config: TranscriberConfig,
    estimator: SpectralEstimator,
    machine: NoteEventMachine,
}

impl Transcriber {
    /// Validate `config` and precompute the estimator tables.
    pub fn new(config: TranscriberConfig) -> Result<Self, TranscribeError> {
        config.validate()?;
        let estimator = SpectralEstimator::new(config.frame_size, config.sample_rate);
        Ok(Transcriber {
            config,
            estimator,
            machine: NoteEventMachine::new(),
        })
    }

    /// The configuration in use.
    pub fn config(&self) -> &TranscriberConfig {
        &self.config
    }

    /// Analyse one frame of normalized samples and advance the state machine.
    pub fn process_frame(&mut self, samples: &[f32]) -> Result<FrameReport, TranscribeError> {
        let index = self.machine.frames();
        let spectrum = self.estimator.estimate(samples)?;

        let judged = judge(&spectrum, &self.config);
        let mut reduced: CandidateSet = judged.clone();
        reduce(&mut reduced, &self.config);
        let events = self.machine.advance(&reduced, &judged, &self.config);

        let readings = equalize(&spectrum, &self.config)
            .iter()
            .enumerate()
            .map(|(bin, &amplitude)| (bin, amplitude, to_db(amplitude)))
            .filter(|&(_, _, db)| db > self.config.threshold_db)
            .map(|(bin, amplitude, db)| {
                let note = note_for_index(bin);
                BinReading {
                    bin,
                    note,
                    amplitude,
                    db,
                    genuine: judged.is_active(note),
                }
            })
            .collect();

        Ok(FrameReport {
            index,
            readings,
            events,
        })
    }

    /// Release every sounding note; call once the input is exhausted.
    pub fn finish(&mut self) -> Vec<TimedEvent> {
        self.machine.finish()
    }

    /// Transcribe a whole 16-bit PCM stream into `sink`, closing the track.
    ///
    /// Every call starts from silence, so one transcriber can serve several
    /// streams in turn. `on_frame` sees every frame report, for meters or
    /// logging.
    pub fn run<R, S, F>(
        &mut self,
        reader: R,
        sink: &mut S,
        mut on_frame: F,
    ) -> Result<Summary, TranscribeError>
    where
        R: Read,
        S: EventSink + ?Sized,
        F: FnMut(&FrameReport),
    {
        let mut source = FrameSource::new(
            reader,
            self.config.frame_size,
            self.config.hop_size,
            self.config.gain,
        );
        let mut summary = Summary::default();
        self.machine = NoteEventMachine::new();

        while let Some(frame) = source.next_frame()? {
            let report = self.process_frame(frame.samples)?;
            for event in &report.events {
                sink.write_event(event)?;
                summary.count(event);
            }
            on_frame(&report);
        }
        summary.frames = source.frames_read();

        for event in &self.finish() {
            sink.write_event(event)?;
            summary.count(event);
        }
        let tail = self.machine.take_pending_ticks();
        sink.end_of_track(tail)?;
        summary.total_ticks += tail as u64;

        log::debug!(
            "transcribed {} frames: {} note-ons, {} note-offs",
            summary.frames,
            summary.note_ons,
            summary.note_offs
        );
        Ok(summary)
    }
}
