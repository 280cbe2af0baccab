//! Frame Source
//!
//! Slides a fixed-length window over a stream of signed 16-bit little-endian
//! mono PCM. The first frame reads a whole window; every later frame reads
//! one hop of new samples and shifts the rest. A short read ends the stream.

use std::io::{self, ErrorKind, Read};

/// One overlapping analysis window.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    /// Position of the frame in the stream, starting at 0.
    pub index: u64,
    /// Sample offset of the first sample in the window.
    pub start_sample: u64,
    /// Normalized samples with the input gain applied.
    pub samples: &'a [f32],
}

impl Frame<'_> {
    /// Start of the window in seconds.
    pub fn seconds(&self, sample_rate: u32) -> f64 {
        self.start_sample as f64 / sample_rate as f64
    }
}

/// Overlapping frame reader over any byte stream.
pub struct FrameSource<R> {
    reader: R,
    window: Vec<f32>,
    bytes: Vec<u8>,
    hop: usize,
    gain: f32,
    next_index: u64,
    exhausted: bool,
}

impl<R: Read> FrameSource<R> {
    /// Read `frame_size`-sample windows advancing by `hop` samples, scaling
    /// every normalized sample by `gain`.
    pub fn new(reader: R, frame_size: usize, hop: usize, gain: f32) -> Self {
        FrameSource {
            reader,
            window: vec![0.0; frame_size],
            bytes: vec![0; frame_size * 2],
            hop: hop.min(frame_size),
            gain,
            next_index: 0,
            exhausted: false,
        }
    }

    /// Read the next frame. `Ok(None)` marks the end of the stream.
    pub fn next_frame(&mut self) -> io::Result<Option<Frame<'_>>> {
        if self.exhausted {
            return Ok(None);
        }

        let fresh = if self.next_index == 0 {
            self.window.len()
        } else {
            self.hop
        };
        let keep = self.window.len() - fresh;
        let bytes = &mut self.bytes[..fresh * 2];

        match self.reader.read_exact(bytes) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                log::debug!("input exhausted after {} frames", self.next_index);
                self.exhausted = true;
                return Ok(None);
            }
            Err(e) => return Err(e),
        }

        self.window.copy_within(fresh.., 0);
        for (out, pair) in self.window[keep..].iter_mut().zip(bytes.chunks_exact(2)) {
            let raw = i16::from_le_bytes([pair[0], pair[1]]);
            *out = raw as f32 / 32768.0 * self.gain;
        }

        let index = self.next_index;
        self.next_index += 1;
        Ok(Some(Frame {
            index,
            start_sample: index * self.hop as u64,
            samples: &self.window,
        }))
    }

    /// Frames produced so far.
    pub fn frames_read(&self) -> u64 {
        self.next_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn pcm(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn windows_overlap_by_hop() {
        let data = pcm(&[0, 1, 2, 3, 4, 5, 6, 7]);
        let mut source = FrameSource::new(Cursor::new(data), 4, 2, 32768.0);

        let f = source.next_frame().unwrap().unwrap();
        assert_eq!((f.index, f.start_sample), (0, 0));
        assert_eq!(f.samples, &[0.0, 1.0, 2.0, 3.0]);

        let f = source.next_frame().unwrap().unwrap();
        assert_eq!((f.index, f.start_sample), (1, 2));
        assert_eq!(f.samples, &[2.0, 3.0, 4.0, 5.0]);

        let f = source.next_frame().unwrap().unwrap();
        assert_eq!(f.samples, &[4.0, 5.0, 6.0, 7.0]);

        assert!(source.next_frame().unwrap().is_none());
        assert!(source.next_frame().unwrap().is_none());
        assert_eq!(source.frames_read(), 3);
    }

    #[test]
    fn single_sample_hop_shifts_window() {
        let data = pcm(&[1, 2, 3, 4, 5, 6]);
        let mut source = FrameSource::new(Cursor::new(data), 4, 1, 32768.0);
        let frames: Vec<Vec<f32>> = std::iter::from_fn(|| {
            source.next_frame().unwrap().map(|f| f.samples.to_vec())
        })
        .collect();
        assert_eq!(
            frames,
            vec![
                vec![1.0, 2.0, 3.0, 4.0],
                vec![2.0, 3.0, 4.0, 5.0],
                vec![3.0, 4.0, 5.0, 6.0],
            ]
        );
    }

    #[test]
    fn partial_hop_ends_stream() {
        let data = pcm(&[0, 1, 2, 3, 4]);
        let mut source = FrameSource::new(Cursor::new(data), 4, 2, 1.0);
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn short_first_window_yields_nothing() {
        let mut source = FrameSource::new(Cursor::new(pcm(&[1, 2])), 4, 2, 1.0);
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn samples_are_normalized_and_scaled() {
        let data = pcm(&[i16::MIN, 16384, -16384, 0]);
        let mut source = FrameSource::new(Cursor::new(data), 4, 4, 2.0);
        let f = source.next_frame().unwrap().unwrap();
        assert_eq!(f.samples, &[-2.0, 1.0, -1.0, 0.0]);
        assert!((f.seconds(44_100) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn read_errors_propagate() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("disk on fire"))
            }
        }
        let mut source = FrameSource::new(Broken, 4, 2, 1.0);
        assert!(source.next_frame().is_err());
    }
}
