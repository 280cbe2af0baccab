//! Event Sink
//!
//! Consumers of the note-event stream: an in-memory recorder and a format-0
//! Standard MIDI File writer.

use crate::config::TranscriberConfig;
use crate::note_events::{NoteEvent, TimedEvent};
use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use std::io::Write;
use thiserror::Error;

/// Largest delta a MIDI variable-length quantity can hold.
pub const MAX_DELTA_TICKS: u32 = 0x0FFF_FFFF;

/// Errors returned by event sinks.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The underlying writer failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A delta does not fit a variable-length quantity.
    #[error("delta of {0} ticks exceeds the MIDI maximum of {max}", max = MAX_DELTA_TICKS)]
    DeltaTooLarge(u32),

    /// An event arrived after the end-of-track marker.
    #[error("track already closed")]
    Closed,
}

/// Receiver of timed note events.
pub trait EventSink {
    /// Append one event.
    fn write_event(&mut self, event: &TimedEvent) -> Result<(), SinkError>;

    /// Close the track `delta_ticks` after the last event.
    fn end_of_track(&mut self, delta_ticks: u32) -> Result<(), SinkError>;
}

/// Sink that keeps every event in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventRecorder {
    /// Events in arrival order.
    pub events: Vec<TimedEvent>,
    /// Delta of the end-of-track marker, once the track is closed.
    pub end_of_track: Option<u32>,
}

impl EventRecorder {
    /// An empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of every delta including the end-of-track marker.
    pub fn total_ticks(&self) -> u64 {
        self.events.iter().map(|e| e.delta_ticks as u64).sum::<u64>()
            + self.end_of_track.unwrap_or(0) as u64
    }
}

impl EventSink for EventRecorder {
    fn write_event(&mut self, event: &TimedEvent) -> Result<(), SinkError> {
        if self.end_of_track.is_some() {
            return Err(SinkError::Closed);
        }
        self.events.push(*event);
        Ok(())
    }

    fn end_of_track(&mut self, delta_ticks: u32) -> Result<(), SinkError> {
        if self.end_of_track.is_some() {
            return Err(SinkError::Closed);
        }
        self.end_of_track = Some(delta_ticks);
        Ok(())
    }
}

/// Format-0 Standard MIDI File writer.
///
/// The track chunk needs its length up front, so events are buffered and the
/// whole file is written when the track is closed.
pub struct SmfWriter<W: Write> {
    out: W,
    division: u15,
    track: Vec<TrackEvent<'static>>,
    channel: u4,
    closed: bool,
}

impl<W: Write> SmfWriter<W> {
    /// Writer using the time division, tempo and channel of `config`.
    ///
    /// `config` is expected to have passed [`TranscriberConfig::validate`],
    /// which keeps the division, tempo and channel inside their MIDI ranges.
    pub fn new(out: W, config: &TranscriberConfig) -> Self {
        let micros = 60_000_000 / config.tempo_bpm.max(1);
        let tempo = TrackEvent {
            delta: u28::from(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::from_int_lossy(micros))),
        };

        SmfWriter {
            out,
            division: u15::from_int_lossy(config.ticks_per_quarter),
            track: vec![tempo],
            channel: u4::from_int_lossy(config.channel),
            closed: false,
        }
    }

    /// Recover the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn push(&mut self, delta_ticks: u32, kind: TrackEventKind<'static>) -> Result<(), SinkError> {
        if self.closed {
            return Err(SinkError::Closed);
        }
        let delta = u28::try_from(delta_ticks).ok_or(SinkError::DeltaTooLarge(delta_ticks))?;
        self.track.push(TrackEvent { delta, kind });
        Ok(())
    }
}

impl<W: Write> EventSink for SmfWriter<W> {
    fn write_event(&mut self, event: &TimedEvent) -> Result<(), SinkError> {
        let message = match event.event {
            NoteEvent::NoteOn { note, velocity } => MidiMessage::NoteOn {
                key: u7::from_int_lossy(note),
                vel: u7::from_int_lossy(velocity),
            },
            NoteEvent::NoteOff { note } => MidiMessage::NoteOff {
                key: u7::from_int_lossy(note),
                vel: u7::from(0),
            },
        };
        let kind = TrackEventKind::Midi {
            channel: self.channel,
            message,
        };
        self.push(event.delta_ticks, kind)
    }

    fn end_of_track(&mut self, delta_ticks: u32) -> Result<(), SinkError> {
        self.push(delta_ticks, TrackEventKind::Meta(MetaMessage::EndOfTrack))?;
        self.closed = true;

        let smf = Smf {
            header: Header::new(Format::SingleTrack, Timing::Metrical(self.division)),
            tracks: vec![std::mem::take(&mut self.track)],
        };
        smf.write_std(&mut self.out)?;
        self.out.flush()?;
        log::debug!("wrote format-0 track of {} events", smf.tracks[0].len());
        Ok(())
    }
}
