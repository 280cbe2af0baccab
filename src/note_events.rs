//! Note-Event State Machine
//!
//! Turns per-frame candidate snapshots into ordered note-on/note-off events.
//!
//! Each note is either silent or sounding at the velocity of its last attack.
//! An onset is confirmed only once the note has been seen in two consecutive
//! frames, which filters out single-frame noise. The price is one frame of
//! latency: a note that starts in frame `t - 1` is reported at frame `t`.

use crate::candidates::CandidateSet;
use crate::config::{TranscriberConfig, HARMONIC_OFFSETS};
use crate::semitone::NUM_NOTES;

/// Frames of candidate history kept: current, previous, and the one before.
const HISTORY_DEPTH: usize = 3;

/// A channel-voice event.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NoteEvent {
    /// Start sounding `note`.
    NoteOn {
        /// MIDI note number.
        note: u8,
        /// Attack velocity, 1..=127.
        velocity: u8,
    },
    /// Stop sounding `note`.
    NoteOff {
        /// MIDI note number.
        note: u8,
    },
}

impl NoteEvent {
    /// Note number the event refers to.
    pub fn note(&self) -> u8 {
        match *self {
            NoteEvent::NoteOn { note, .. } | NoteEvent::NoteOff { note } => note,
        }
    }
}

/// An event positioned relative to the previously emitted one.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TimedEvent {
    /// Ticks elapsed since the previous event.
    pub delta_ticks: u32,
    /// The event itself.
    pub event: NoteEvent,
}

/// Persistent state of one note.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct NoteState {
    /// Whether the note is sounding.
    pub active: bool,
    /// Velocity of the last onset or re-attack; 0 while silent.
    pub velocity: u8,
    /// Frames since the last onset, re-attack or release.
    pub frames_since_change: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Transition {
    Stay,
    Onset(u8),
    Reattack(u8),
    Release,
}

impl Transition {
    fn sounds_after(self, was_active: bool) -> bool {
        match self {
            Transition::Onset(_) | Transition::Reattack(_) => true,
            Transition::Stay => was_active,
            Transition::Release => false,
        }
    }
}

/// Cross-frame note tracker.
pub struct NoteEventMachine {
    states: [NoteState; NUM_NOTES],
    /// `history[0]` is the current frame, `history[2]` two frames back.
    history: [CandidateSet; HISTORY_DEPTH],
    pending_ticks: u32,
    frames: u64,
}

impl NoteEventMachine {
    /// A machine with every note silent.
    pub fn new() -> Self {
        NoteEventMachine {
            states: [NoteState::default(); NUM_NOTES],
            history: std::array::from_fn(|_| CandidateSet::silent()),
            pending_ticks: 0,
            frames: 0,
        }
    }

    /// State of `note`.
    pub fn state(&self, note: u8) -> NoteState {
        self.states[note as usize]
    }

    /// Number of sounding notes.
    pub fn active_count(&self) -> usize {
        self.states.iter().filter(|s| s.active).count()
    }

    /// Frames processed so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Ticks accumulated since the last emitted event.
    pub fn pending_ticks(&self) -> u32 {
        self.pending_ticks
    }

    /// Remove and return the ticks accumulated since the last emitted event.
    pub fn take_pending_ticks(&mut self) -> u32 {
        std::mem::take(&mut self.pending_ticks)
    }

    /// Advance one frame.
    ///
    /// `reduced` is the frame's candidate set after polyphony reduction and
    /// enters the history; `judged` is the discriminator output of the same
    /// frame, used to re-check new onsets against freshly sounding lower notes.
    pub fn advance(
        &mut self,
        reduced: &CandidateSet,
        judged: &CandidateSet,
        config: &TranscriberConfig,
    ) -> Vec<TimedEvent> {
        self.history.rotate_right(1);
        self.history[0].clone_from(reduced);

        let mut events = Vec::new();
        let mut voices = 0;
        for note in 0..NUM_NOTES as u8 {
            let state = self.states[note as usize];
            let mut transition = self.transition(note, judged, config);

            if transition.sounds_after(state.active) {
                if voices >= config.max_polyphony {
                    log::trace!("note {note} over the polyphony cap");
                    transition = if state.active {
                        Transition::Release
                    } else {
                        Transition::Stay
                    };
                } else {
                    voices += 1;
                }
            }

            self.apply(note, transition, &mut events);
        }

        self.frames += 1;
        self.pending_ticks = self.pending_ticks.saturating_add(config.frame_ticks());
        if !events.is_empty() {
            log::debug!("frame {}: {} events", self.frames - 1, events.len());
        }
        events
    }

    /// Release every sounding note at the current position.
    pub fn finish(&mut self) -> Vec<TimedEvent> {
        let mut events = Vec::new();
        for note in 0..NUM_NOTES as u8 {
            if self.states[note as usize].active {
                self.apply(note, Transition::Release, &mut events);
            }
        }
        events
    }

    fn transition(
        &self,
        note: u8,
        judged: &CandidateSet,
        config: &TranscriberConfig,
    ) -> Transition {
        let state = self.states[note as usize];
        let current = self.history[0].get(note);

        if state.active {
            if !current.active {
                Transition::Release
            } else if current.velocity > state.velocity.saturating_add(config.reattack_margin) {
                Transition::Reattack(current.velocity)
            } else {
                Transition::Stay
            }
        } else {
            let previous = self.history[1].get(note);
            let before = self.history[2].get(note);
            let persisted = previous.active && current.active && !before.active;
            let masked = !config.disable_judging
                && masked_by_lower(note, previous.velocity, judged, config);
            if persisted && !masked {
                Transition::Onset(previous.velocity.max(current.velocity))
            } else {
                Transition::Stay
            }
        }
    }

    fn apply(&mut self, note: u8, transition: Transition, events: &mut Vec<TimedEvent>) {
        let state = &mut self.states[note as usize];
        match transition {
            Transition::Stay => {
                state.frames_since_change = state.frames_since_change.saturating_add(1);
                return;
            }
            Transition::Onset(velocity) => {
                log::trace!("onset {note} at velocity {velocity}");
                *state = NoteState {
                    active: true,
                    velocity,
                    frames_since_change: 0,
                };
                events.push(NoteEvent::NoteOn { note, velocity }.into());
            }
            Transition::Reattack(velocity) => {
                log::trace!("re-attack {note} from {} to {velocity}", state.velocity);
                *state = NoteState {
                    active: true,
                    velocity,
                    frames_since_change: 0,
                };
                events.push(NoteEvent::NoteOff { note }.into());
                events.push(NoteEvent::NoteOn { note, velocity }.into());
            }
            Transition::Release => {
                log::trace!("release {note}");
                *state = NoteState::default();
                events.push(NoteEvent::NoteOff { note }.into());
            }
        }
        self.stamp(events);
    }

    /// Give the pending ticks to the first event of this frame that has none yet.
    fn stamp(&mut self, events: &mut [TimedEvent]) {
        if self.pending_ticks == 0 {
            return;
        }
        if let Some(first) = events.first_mut() {
            first.delta_ticks = first.delta_ticks.saturating_add(self.take_pending_ticks());
        }
    }
}

impl Default for NoteEventMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl From<NoteEvent> for TimedEvent {
    fn from(event: NoteEvent) -> Self {
        TimedEvent { delta_ticks: 0, event }
    }
}

/// A lower note sounding in `judged` is louder than `note` by more than its
/// register's bleed margin at one of the harmonic offsets.
fn masked_by_lower(
    note: u8,
    velocity: u8,
    judged: &CandidateSet,
    config: &TranscriberConfig,
) -> bool {
    HARMONIC_OFFSETS.iter().enumerate().any(|(slot, &offset)| {
        let Some(lower) = (note as usize).checked_sub(offset) else {
            return false;
        };
        let lower = lower as u8;
        let candidate = judged.get(lower);
        candidate.active
            && candidate.velocity as i16 - velocity as i16
                > config.registers.margins(lower).velocity[slot]
    })
}
