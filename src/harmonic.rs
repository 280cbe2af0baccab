//! Harmonic Discriminator
//!
//! Decides which semitone bins hold a genuine fundamental and which only carry
//! overtone energy bleeding from a lower string.
//!
//! A struck string leaks energy into the bins an octave, an octave and a fifth,
//! two octaves, and two octaves and a major third above it. For every pair of
//! bins `(k, k + offset)` at least one of the two is rejected:
//!
//! - the lower bin `k` is genuine only if each overtone bin sits more than the
//!   register's margin below it;
//! - an upper bin is rejected as bleed when a lower bin above the threshold
//!   is louder than it by more than that lower bin's bleed margin.
//!
//! The spectrum is first shaped by the per-bin gain curve of the configuration.

use crate::candidates::CandidateSet;
use crate::config::{TranscriberConfig, HARMONIC_OFFSETS};
use crate::semitone::{note_for_index, NUM_BINS};
use crate::spectrum::SpectrumVector;

/// Amplitude in decibels. Zero maps to negative infinity.
#[inline]
pub fn to_db(amplitude: f32) -> f32 {
    20.0 * amplitude.log10()
}

/// Velocity for a level of `db`, clamped to 1..=127.
#[inline]
pub fn velocity_for_db(db: f32, config: &TranscriberConfig) -> u8 {
    (db * config.velocity_gain + config.velocity_offset)
        .round()
        .clamp(1.0, 127.0) as u8
}

/// Apply the per-bin gain curve of `config` to `spectrum`.
pub fn equalize(spectrum: &SpectrumVector, config: &TranscriberConfig) -> SpectrumVector {
    std::array::from_fn(|i| spectrum[i] * config.bin_gain[i])
}

/// Classify every bin of `spectrum` and return the genuine fundamentals.
pub fn judge(spectrum: &SpectrumVector, config: &TranscriberConfig) -> CandidateSet {
    let db = equalize(spectrum, config).map(to_db);
    let audible = db.map(|d| d > config.threshold_db);

    let mut candidates = CandidateSet::silent();
    for i in 0..NUM_BINS {
        if !audible[i] {
            continue;
        }
        let genuine = config.disable_judging
            || (is_fundamental(&db, i, config) && !is_bleed(&db, &audible, i, config));
        if genuine {
            candidates.activate(note_for_index(i), velocity_for_db(db[i], config));
        }
    }
    candidates
}

/// Every overtone of bin `i` drops off by more than its register margin.
fn is_fundamental(db: &[f32; NUM_BINS], i: usize, config: &TranscriberConfig) -> bool {
    let margins = &config.registers.margins(note_for_index(i)).db;
    HARMONIC_OFFSETS
        .iter()
        .zip(margins)
        .filter(|&(&offset, _)| i + offset < NUM_BINS)
        .all(|(&offset, &margin)| db[i] - db[i + offset] > margin)
}

/// Some audible lower bin explains the energy in bin `i` as one of its overtones.
fn is_bleed(
    db: &[f32; NUM_BINS],
    audible: &[bool; NUM_BINS],
    i: usize,
    config: &TranscriberConfig,
) -> bool {
    HARMONIC_OFFSETS.iter().enumerate().any(|(slot, &offset)| {
        if offset > i {
            return false;
        }
        let k = i - offset;
        audible[k] && db[k] - db[i] > config.registers.margins(note_for_index(k)).bleed_db[slot]
    })
}
