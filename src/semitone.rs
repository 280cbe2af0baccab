//! Semitone grid
//!
//! Fixed log-frequency grid with one bin per semitone, starting at E2 (MIDI 40).

/// Lowest representable note (E2).
pub const NOTE_BASE: u8 = 40;

/// Number of semitone bins in the analysis grid (seven octaves).
pub const NUM_BINS: usize = 85;

/// Reference frequency of the grid (A1).
pub const BASE_HZ: f64 = 55.0;

/// Semitones between `BASE_HZ` and the first bin (A1 up to E2).
pub const BASE_OFFSET: i32 = 7;

/// Equal-tempered semitone ratio, 2^(1/12).
pub const SEMITONE_RATIO: f64 = 1.059_463_094_359_295_3;

/// Number of MIDI note numbers.
pub const NUM_NOTES: usize = 128;

const NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Center frequency in Hz of semitone bin `index`.
#[inline]
pub fn freq(index: usize) -> f64 {
    BASE_HZ * SEMITONE_RATIO.powi(index as i32 + BASE_OFFSET)
}

/// Absolute note number of semitone bin `index`.
#[inline]
pub const fn note_for_index(index: usize) -> u8 {
    NOTE_BASE + index as u8
}

/// Semitone bin of an absolute note, if the note lies on the grid.
#[inline]
pub const fn index_for_note(note: u8) -> Option<usize> {
    if note < NOTE_BASE {
        return None;
    }
    let index = (note - NOTE_BASE) as usize;
    if index < NUM_BINS {
        Some(index)
    } else {
        None
    }
}

/// Scientific pitch name such as `E2` or `F#3`; notes below the grid give `??`.
pub fn note_name(note: u8) -> String {
    if note < NOTE_BASE {
        return "??".to_string();
    }
    let octave = note as i32 / 12 - 1;
    format!("{}{}", NAMES[note as usize % 12], octave)
}
