//! Integration tests for spectral estimation and end-to-end transcription
//! using synthetic audio.

use fretscribe::semitone::{freq, index_for_note, NUM_BINS};
use fretscribe::{
    EventRecorder, NoteEvent, SmfWriter, SpectralEstimator, Summary, Transcriber,
    TranscriberConfig,
};
use lazy_static::lazy_static;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use std::f64::consts::PI;
use std::io::Cursor;

const SAMPLE_RATE: u32 = 44_100;
const FRAME: usize = 8192;
const HOP: usize = 4096;

lazy_static! {
    static ref ESTIMATOR: SpectralEstimator = SpectralEstimator::new(FRAME, SAMPLE_RATE);
}

/// Sum of sinusoids `(frequency, amplitude)` over `len` samples.
fn tones(partials: &[(f64, f64)], len: usize) -> Vec<f32> {
    (0..len)
        .map(|j| {
            let t = j as f64 / SAMPLE_RATE as f64;
            partials
                .iter()
                .map(|&(hz, amp)| amp * (2.0 * PI * hz * t).sin())
                .sum::<f64>() as f32
        })
        .collect()
}

/// Encode normalized samples as signed 16-bit little-endian PCM.
fn to_pcm(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&s| ((s * 32767.0).round() as i16).to_le_bytes())
        .collect()
}

/// Samples that produce exactly `frames` analysis windows.
fn stream_len(frames: usize) -> usize {
    FRAME + (frames - 1) * HOP
}

fn transcribe(config: TranscriberConfig, samples: &[f32]) -> (EventRecorder, Summary) {
    let mut transcriber = Transcriber::new(config).unwrap();
    let mut recorder = EventRecorder::new();
    let summary = transcriber
        .run(Cursor::new(to_pcm(samples)), &mut recorder, |_| {})
        .unwrap();
    (recorder, summary)
}

fn note_ons(recorder: &EventRecorder) -> Vec<u8> {
    recorder
        .events
        .iter()
        .filter_map(|e| match e.event {
            NoteEvent::NoteOn { note, .. } => Some(note),
            NoteEvent::NoteOff { .. } => None,
        })
        .collect()
}

#[test]
fn pure_tone_peaks_at_its_own_bin() {
    let nyquist = SAMPLE_RATE as f64 / 2.0;
    let bins: Vec<usize> = (0..NUM_BINS).filter(|&i| freq(i) < nyquist * 0.9).collect();

    let failures: Vec<String> = bins
        .into_par_iter()
        .filter_map(|i| {
            let frame = tones(&[(freq(i), 0.5)], FRAME);
            let spectrum = ESTIMATOR.estimate(&frame).unwrap();

            let peak = spectrum
                .iter()
                .enumerate()
                .fold((0, 0.0f32), |best, (k, &a)| {
                    if a > best.1 {
                        (k, a)
                    } else {
                        best
                    }
                });
            let below_ok = i == 0 || spectrum[i - 1] < spectrum[i];
            let above_ok = i + 1 == NUM_BINS || spectrum[i + 1] < spectrum[i];

            if peak.0 == i && below_ok && above_ok {
                None
            } else {
                let around = &spectrum[i.saturating_sub(1)..(i + 2).min(NUM_BINS)];
                Some(format!("bin {i}: peak at {} ({around:?})", peak.0))
            }
        })
        .collect();

    assert!(failures.is_empty(), "{}", failures.join("\n"));
}

#[test]
fn silent_input_writes_only_end_of_track() {
    let config = TranscriberConfig::default();
    let ft = config.frame_ticks();
    let (recorder, summary) = transcribe(config, &vec![0.0; stream_len(8)]);

    assert!(recorder.events.is_empty());
    assert_eq!(recorder.end_of_track, Some(8 * ft));
    assert_eq!(summary.frames, 8);
    assert_eq!(summary.note_ons + summary.note_offs, 0);
}

#[test]
fn sustained_a4_is_one_note() {
    let config = TranscriberConfig::default();
    let ft = config.frame_ticks();
    let a4 = freq(index_for_note(69).unwrap());
    let (recorder, summary) = transcribe(config, &tones(&[(a4, 0.3)], stream_len(10)));

    assert_eq!(recorder.events.len(), 2, "{:?}", recorder.events);
    let first = recorder.events[0];
    let last = recorder.events[1];

    // confirmed one frame after it first appears
    assert_eq!(first.delta_ticks, ft);
    match first.event {
        NoteEvent::NoteOn { note, velocity } => {
            assert_eq!(note, 69);
            assert!((110..=120).contains(&velocity), "velocity {velocity}");
        }
        other => panic!("expected NoteOn, got {other:?}"),
    }

    // released when the stream ends
    assert_eq!(last.event, NoteEvent::NoteOff { note: 69 });
    assert_eq!(last.delta_ticks, 9 * ft);
    assert_eq!(recorder.end_of_track, Some(0));
    assert_eq!(recorder.total_ticks(), 10 * ft as u64);
    assert_eq!(summary.total_ticks, 10 * ft as u64);
}

/// A3 plus its overtones at +12, +19, +24 and +28 semitones, 15 dB down.
fn a3_with_overtones(len: usize) -> Vec<f32> {
    let root = index_for_note(57).unwrap();
    let overtone = 0.4 * 10f64.powf(-15.0 / 20.0);
    tones(
        &[
            (freq(root), 0.4),
            (freq(root + 12), overtone),
            (freq(root + 19), overtone),
            (freq(root + 24), overtone),
            (freq(root + 28), overtone),
        ],
        len,
    )
}

#[test]
fn overtones_do_not_become_notes() {
    let samples = a3_with_overtones(stream_len(6));
    let (recorder, summary) = transcribe(TranscriberConfig::default(), &samples);
    assert_eq!(note_ons(&recorder), vec![57]);
    assert_eq!(summary.note_offs, 1);
}

#[test]
fn disabled_judging_lets_overtones_through() {
    let config = TranscriberConfig::builder()
        .disable_judging(true)
        .build()
        .unwrap();
    let (recorder, _) = transcribe(config, &a3_with_overtones(stream_len(6)));
    assert_eq!(note_ons(&recorder), vec![57, 69, 76, 81, 85]);
}

#[test]
fn open_strings_at_equal_level_are_all_notes() {
    let strings = [40u8, 45, 50, 55, 59, 64];
    let partials: Vec<(f64, f64)> = strings
        .iter()
        .map(|&n| (freq(index_for_note(n).unwrap()), 0.1))
        .collect();
    let (recorder, summary) = transcribe(
        TranscriberConfig::default(),
        &tones(&partials, stream_len(6)),
    );

    assert_eq!(note_ons(&recorder), strings);
    assert_eq!(summary.note_offs, strings.len());
}

#[test]
fn input_gain_lifts_quiet_signal() {
    let quiet = tones(&[(freq(index_for_note(64).unwrap()), 0.002)], stream_len(5));

    let (recorder, _) = transcribe(TranscriberConfig::default(), &quiet);
    assert!(recorder.events.is_empty());

    let config = TranscriberConfig::builder().gain(50.0).build().unwrap();
    let (recorder, _) = transcribe(config, &quiet);
    assert_eq!(note_ons(&recorder), vec![64]);
}

#[test]
fn writes_standard_midi_file() {
    let config = TranscriberConfig::default();
    let a4 = freq(index_for_note(69).unwrap());
    let samples = tones(&[(a4, 0.3)], stream_len(4));

    let mut transcriber = Transcriber::new(config.clone()).unwrap();
    let mut writer = SmfWriter::new(Vec::new(), &config);
    transcriber
        .run(Cursor::new(to_pcm(&samples)), &mut writer, |_| {})
        .unwrap();
    let bytes = writer.into_inner();

    assert_eq!(&bytes[0..4], b"MThd");
    assert_eq!(&bytes[14..18], b"MTrk");
    let track_len = u32::from_be_bytes([bytes[18], bytes[19], bytes[20], bytes[21]]) as usize;
    assert_eq!(bytes.len(), 22 + track_len);
    assert_eq!(&bytes[bytes.len() - 3..], &[0xFF, 0x2F, 0x00]);
    assert!(bytes.windows(2).any(|w| w == [0x90, 69]));
    assert!(bytes.windows(3).any(|w| w == [0x80, 69, 0]));
}
