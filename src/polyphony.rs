//! Polyphony Reducer
//!
//! A single string sounds one pitch at a time. Within each note window that
//! only one string can reach, the loudest candidate wins; afterwards a
//! candidate quieter than its semitone neighbour is treated as spectral spread
//! and dropped.

use crate::candidates::CandidateSet;
use crate::config::TranscriberConfig;
use crate::semitone::NUM_NOTES;

/// Apply the single-string and adjacent-semitone rules to `candidates` in place.
pub fn reduce(candidates: &mut CandidateSet, config: &TranscriberConfig) {
    for window in &config.string_windows {
        keep_loudest(candidates, *window.start(), *window.end());
    }
    drop_weaker_neighbours(candidates);
}

/// Keep only the highest-velocity note in `lo..=hi`; ties go to the lower note.
fn keep_loudest(candidates: &mut CandidateSet, lo: u8, hi: u8) {
    let hi = hi.min(NUM_NOTES as u8 - 1);
    let winner = (lo..=hi)
        .filter(|&n| candidates.is_active(n))
        .fold(None, |best: Option<(u8, u8)>, n| {
            let v = candidates.get(n).velocity;
            match best {
                Some((_, bv)) if bv >= v => best,
                _ => Some((n, v)),
            }
        });

    if let Some((keep, _)) = winner {
        for n in (lo..=hi).filter(|&n| n != keep) {
            candidates.clear(n);
        }
    }
}

fn drop_weaker_neighbours(candidates: &mut CandidateSet) {
    for n in 0..NUM_NOTES as u8 - 1 {
        let (a, b) = (candidates.get(n), candidates.get(n + 1));
        if !(a.active && b.active) {
            continue;
        }
        if a.velocity < b.velocity {
            candidates.clear(n);
        } else if b.velocity < a.velocity {
            candidates.clear(n + 1);
        }
    }
}
