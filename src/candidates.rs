//! Per-frame note candidates.

use crate::semitone::NUM_NOTES;

/// Detection state of one note within one frame.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Candidate {
    /// Whether the note was detected.
    pub active: bool,
    /// Detected velocity, 1..=127 when active and 0 otherwise.
    pub velocity: u8,
}

/// Candidates for every MIDI note in one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSet {
    notes: [Candidate; NUM_NOTES],
}

impl CandidateSet {
    /// A set with every note silent.
    pub fn silent() -> Self {
        CandidateSet {
            notes: [Candidate::default(); NUM_NOTES],
        }
    }

    /// Mark `note` active at `velocity`.
    #[inline]
    pub fn activate(&mut self, note: u8, velocity: u8) {
        self.notes[note as usize] = Candidate {
            active: true,
            velocity,
        };
    }

    /// Reset `note` to inactive with zero velocity.
    #[inline]
    pub fn clear(&mut self, note: u8) {
        self.notes[note as usize] = Candidate::default();
    }

    /// Candidate for `note`.
    #[inline]
    pub fn get(&self, note: u8) -> Candidate {
        self.notes[note as usize]
    }

    /// Whether `note` is active.
    #[inline]
    pub fn is_active(&self, note: u8) -> bool {
        self.notes[note as usize].active
    }

    /// Active notes in ascending order with their velocities.
    pub fn active(&self) -> impl Iterator<Item = (u8, u8)> + '_ {
        self.notes
            .iter()
            .enumerate()
            .filter(|(_, c)| c.active)
            .map(|(n, c)| (n as u8, c.velocity))
    }

    /// Number of active notes.
    pub fn count(&self) -> usize {
        self.notes.iter().filter(|c| c.active).count()
    }
}

impl Default for CandidateSet {
    fn default() -> Self {
        Self::silent()
    }
}
