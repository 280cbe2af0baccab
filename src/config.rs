//! Configuration
//!
//! One immutable [`TranscriberConfig`] is built at startup through
//! [`TranscriberConfigBuilder`] and passed by reference to every stage.

use crate::semitone::NUM_BINS;
use std::ops::RangeInclusive;
use thiserror::Error;

/// Semitone offsets of the overtones inspected by the harmonic tests:
/// octave, octave + fifth, two octaves, two octaves + major third.
pub const HARMONIC_OFFSETS: [usize; 4] = [12, 19, 24, 28];

/// Errors returned when validating a configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// A size, rate or count was zero.
    #[error("`{0}` cannot be zero")]
    Zero(&'static str),

    /// The hop is longer than the analysis frame.
    #[error("hop size {hop} exceeds frame size {frame}")]
    HopExceedsFrame {
        /// Configured hop in samples.
        hop: usize,
        /// Configured frame length in samples.
        frame: usize,
    },

    /// A floating-point parameter was NaN or infinite.
    #[error("`{0}` must be finite")]
    NotFinite(&'static str),

    /// MIDI channel outside 0..=15.
    #[error("MIDI channel {0} out of range (0..=15)")]
    Channel(u8),

    /// The hop interval rounds to zero ticks.
    #[error("hop interval rounds to {0} ticks; raise ticks_per_quarter or tick_multiplier")]
    FrameTicks(f64),

    /// The register table has no rows.
    #[error("register table is empty")]
    EmptyRegisters,

    /// A register row lets a quieter lower note mark a louder one as bleed.
    #[error("register starting at note {0} has a negative bleed margin")]
    NegativeBleed(u8),

    /// A per-bin gain was negative, NaN or infinite.
    #[error("gain {gain} of bin {bin} must be finite and non-negative")]
    BinGain {
        /// Offending bin.
        bin: usize,
        /// Its gain.
        gain: f32,
    },

    /// The time division does not fit the 15 bits of a metrical MIDI header.
    #[error("ticks_per_quarter {0} exceeds the MIDI maximum of 32767")]
    TicksPerQuarter(u16),

    /// The tempo is too slow for a 24-bit microseconds-per-quarter value.
    #[error("tempo of {0} bpm is below the MIDI minimum of {min}", min = MIN_TEMPO_BPM)]
    Tempo(u32),
}

/// Slowest tempo whose quarter note fits 24 bits of microseconds.
pub const MIN_TEMPO_BPM: u32 = 4;

/// Largest metrical time division.
pub const MAX_TICKS_PER_QUARTER: u16 = 0x7FFF;

/// Harmonic margins for one instrument register.
///
/// Index `k` of each array belongs to `HARMONIC_OFFSETS[k]`. `db` applies when
/// a note of this register is tested against its own overtones and may be
/// negative. `bleed_db` and `velocity` apply when a note of this register is
/// blamed for energy an overtone above it; they are never negative, so a lower
/// note has to be louder than the candidate to explain it away.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RegisterMargins {
    /// Minimum decibel drop from a fundamental to its overtone.
    pub db: [f32; 4],
    /// Minimum decibel excess of this note over a candidate one overtone
    /// above it before the candidate counts as bleed.
    pub bleed_db: [f32; 4],
    /// Minimum velocity excess of this note over a new onset one overtone
    /// above it before the onset is held back.
    pub velocity: [i16; 4],
}

/// Register-indexed margin table.
///
/// Each row starts at its `lowest` note and covers every note up to the next
/// row's start. Notes below the first row use the first row.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterTable {
    rows: Vec<(u8, RegisterMargins)>,
}

impl RegisterTable {
    /// Build a table from `(lowest_note, margins)` rows in any order.
    pub fn new(mut rows: Vec<(u8, RegisterMargins)>) -> Self {
        rows.sort_by_key(|&(lowest, _)| lowest);
        RegisterTable { rows }
    }

    /// Empirically tuned margins for a six-string guitar in standard tuning,
    /// one row per open string. Low strings ring with strong overtones, so their
    /// margins are the most permissive in both directions.
    pub fn standard_guitar() -> Self {
        let row = |lowest: u8, db: [f32; 4], bleed_db: [f32; 4]| {
            let velocity = bleed_db.map(|d| (d * 2.0) as i16);
            (lowest, RegisterMargins { db, bleed_db, velocity })
        };
        RegisterTable::new(vec![
            row(40, [-9.0, -6.0, -3.0, 0.0], [3.0, 3.0, 6.0, 6.0]), // E2
            row(45, [-6.0, -3.0, 0.0, 3.0], [3.0, 3.0, 6.0, 6.0]),  // A2
            row(50, [-3.0, 0.0, 3.0, 6.0], [3.0, 6.0, 6.0, 9.0]),   // D3
            row(55, [0.0, 3.0, 3.0, 6.0], [6.0, 6.0, 9.0, 9.0]),    // G3
            row(59, [0.0, 3.0, 6.0, 6.0], [6.0, 9.0, 9.0, 12.0]),   // B3
            row(64, [3.0, 6.0, 6.0, 9.0], [9.0, 9.0, 12.0, 12.0]),  // E4 and up
        ])
    }

    /// Margins of the register containing `note`.
    pub fn margins(&self, note: u8) -> &RegisterMargins {
        let pos = self.rows.partition_point(|&(lowest, _)| lowest <= note);
        &self.rows[pos.saturating_sub(1)].1
    }

    /// True when the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Default for RegisterTable {
    fn default() -> Self {
        Self::standard_guitar()
    }
}

/// Immutable transcription parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriberConfig {
    /// Linear gain applied to normalized samples before analysis (default: 1.0)
    pub gain: f32,
    /// Input sample rate in Hz (default: 44100)
    pub sample_rate: u32,
    /// Analysis window length in samples (default: 8192)
    pub frame_size: usize,
    /// Samples the window advances per frame (default: 4096)
    pub hop_size: usize,
    /// Velocity per decibel (default: 2.0)
    pub velocity_gain: f32,
    /// Velocity at 0 dB (default: 160.0)
    pub velocity_offset: f32,
    /// Bins at or below this level are silent (default: -53.0 dB)
    pub threshold_db: f32,
    /// Let every bin above the threshold through without harmonic tests
    /// (default: false). Diagnostic only.
    pub disable_judging: bool,
    /// Velocity rise on a ringing note that counts as a new pick attack
    /// (default: 10)
    pub reattack_margin: u8,
    /// Maximum simultaneously sounding notes (default: 6, one per string)
    pub max_polyphony: usize,
    /// Note ranges only one physical string can produce.
    /// Default: 40..=44 (low E below the open A), 82..=88 (high E above the
    /// B string's last fret).
    pub string_windows: Vec<RangeInclusive<u8>>,
    /// Harmonic deficit margins per register.
    pub registers: RegisterTable,
    /// MIDI time division (default: 960)
    pub ticks_per_quarter: u16,
    /// Scales seconds-per-hop into quarter notes (default: 2.0, real time at 120 bpm)
    pub tick_multiplier: f64,
    /// Tempo written to the output track (default: 120)
    pub tempo_bpm: u32,
    /// Output MIDI channel (default: 0)
    pub channel: u8,
    /// Linear gain per semitone bin, applied to the spectrum before the
    /// threshold. Compensates for pickup and body response (default: all 1.0)
    pub bin_gain: [f32; NUM_BINS],
}

impl TranscriberConfig {
    /// Start customizing with a builder.
    pub fn builder() -> TranscriberConfigBuilder {
        TranscriberConfigBuilder::new()
    }

    /// Ticks covered by one hop interval, before rounding.
    fn raw_frame_ticks(&self) -> f64 {
        self.hop_size as f64 / self.sample_rate as f64
            * self.ticks_per_quarter as f64
            * self.tick_multiplier
    }

    /// Ticks covered by one hop interval.
    pub fn frame_ticks(&self) -> u32 {
        self.raw_frame_ticks().round() as u32
    }

    /// Check every invariant the pipeline relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::Zero("sample_rate"));
        }
        if self.frame_size == 0 {
            return Err(ConfigError::Zero("frame_size"));
        }
        if self.hop_size == 0 {
            return Err(ConfigError::Zero("hop_size"));
        }
        if self.hop_size > self.frame_size {
            return Err(ConfigError::HopExceedsFrame {
                hop: self.hop_size,
                frame: self.frame_size,
            });
        }
        if self.ticks_per_quarter == 0 {
            return Err(ConfigError::Zero("ticks_per_quarter"));
        }
        if self.ticks_per_quarter > MAX_TICKS_PER_QUARTER {
            return Err(ConfigError::TicksPerQuarter(self.ticks_per_quarter));
        }
        if self.tempo_bpm == 0 {
            return Err(ConfigError::Zero("tempo_bpm"));
        }
        if self.tempo_bpm < MIN_TEMPO_BPM {
            return Err(ConfigError::Tempo(self.tempo_bpm));
        }
        for (name, value) in [
            ("gain", self.gain),
            ("velocity_gain", self.velocity_gain),
            ("velocity_offset", self.velocity_offset),
            ("threshold_db", self.threshold_db),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite(name));
            }
        }
        if !self.tick_multiplier.is_finite() {
            return Err(ConfigError::NotFinite("tick_multiplier"));
        }
        if self.channel > 15 {
            return Err(ConfigError::Channel(self.channel));
        }
        if self.frame_ticks() == 0 {
            return Err(ConfigError::FrameTicks(self.raw_frame_ticks()));
        }
        if self.registers.is_empty() {
            return Err(ConfigError::EmptyRegisters);
        }
        for (lowest, margins) in &self.registers.rows {
            let negative = margins.bleed_db.iter().any(|&d| d < 0.0 || d.is_nan())
                || margins.velocity.iter().any(|&v| v < 0);
            if negative {
                return Err(ConfigError::NegativeBleed(*lowest));
            }
        }
        if let Some((bin, &gain)) = self
            .bin_gain
            .iter()
            .enumerate()
            .find(|&(_, &g)| !(g.is_finite() && g >= 0.0))
        {
            return Err(ConfigError::BinGain { bin, gain });
        }
        Ok(())
    }
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        TranscriberConfig {
            gain: 1.0,
            sample_rate: 44_100,
            frame_size: 8192,
            hop_size: 4096,
            velocity_gain: 2.0,
            velocity_offset: 160.0,
            threshold_db: -53.0,
            disable_judging: false,
            reattack_margin: 10,
            max_polyphony: 6,
            string_windows: vec![40..=44, 82..=88],
            registers: RegisterTable::standard_guitar(),
            ticks_per_quarter: 960,
            tick_multiplier: 2.0,
            tempo_bpm: 120,
            channel: 0,
            bin_gain: [1.0; NUM_BINS],
        }
    }
}

/// Builder for [`TranscriberConfig`].
pub struct TranscriberConfigBuilder {
    config: TranscriberConfig,
}

impl TranscriberConfigBuilder {
    /// Start from the defaults documented on [`TranscriberConfig`].
    pub fn new() -> Self {
        TranscriberConfigBuilder {
            config: TranscriberConfig::default(),
        }
    }

    /// Set the linear input gain.
    pub fn gain(mut self, gain: f32) -> Self {
        self.config.gain = gain;
        self
    }

    /// Set the sampling rate of the audio.
    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.config.sample_rate = rate;
        self
    }

    /// Set the analysis window length.
    pub fn frame_size(mut self, size: usize) -> Self {
        self.config.frame_size = size;
        self
    }

    /// Set how far the window advances per frame.
    pub fn hop_size(mut self, size: usize) -> Self {
        self.config.hop_size = size;
        self
    }

    /// Set the decibel-to-velocity slope.
    pub fn velocity_gain(mut self, gain: f32) -> Self {
        self.config.velocity_gain = gain;
        self
    }

    /// Set the velocity at 0 dB.
    pub fn velocity_offset(mut self, offset: f32) -> Self {
        self.config.velocity_offset = offset;
        self
    }

    /// Set the silence threshold in decibels.
    pub fn threshold_db(mut self, db: f32) -> Self {
        self.config.threshold_db = db;
        self
    }

    /// Bypass the harmonic tests.
    pub fn disable_judging(mut self, disable: bool) -> Self {
        self.config.disable_judging = disable;
        self
    }

    /// Set the velocity rise that triggers a re-attack.
    pub fn reattack_margin(mut self, margin: u8) -> Self {
        self.config.reattack_margin = margin;
        self
    }

    /// Set the global polyphony cap.
    pub fn max_polyphony(mut self, voices: usize) -> Self {
        self.config.max_polyphony = voices;
        self
    }

    /// Replace the single-string note windows.
    pub fn string_windows(mut self, windows: Vec<RangeInclusive<u8>>) -> Self {
        self.config.string_windows = windows;
        self
    }

    /// Replace the register margin table.
    pub fn registers(mut self, registers: RegisterTable) -> Self {
        self.config.registers = registers;
        self
    }

    /// Set the MIDI time division.
    pub fn ticks_per_quarter(mut self, ticks: u16) -> Self {
        self.config.ticks_per_quarter = ticks;
        self
    }

    /// Set the seconds-to-quarter-notes multiplier.
    pub fn tick_multiplier(mut self, multiplier: f64) -> Self {
        self.config.tick_multiplier = multiplier;
        self
    }

    /// Set the tempo written to the output track.
    pub fn tempo_bpm(mut self, bpm: u32) -> Self {
        self.config.tempo_bpm = bpm;
        self
    }

    /// Set the output MIDI channel.
    pub fn channel(mut self, channel: u8) -> Self {
        self.config.channel = channel;
        self
    }

    /// Set the per-bin gain curve.
    pub fn bin_gain(mut self, gains: [f32; NUM_BINS]) -> Self {
        self.config.bin_gain = gains;
        self
    }

    /// Validate and finalize the configuration.
    pub fn build(self) -> Result<TranscriberConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for TranscriberConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
