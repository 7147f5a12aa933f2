//! Synthetic frame source (`stub://`).
//!
//! Produces BGR frames of a gradient background with a bright square that moves
//! a few pixels per frame, plus seeded sensor noise. Deterministic for a given
//! seed, so tests and demos can rely on it.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{CaptureSource, SourceStats};
use crate::error::CaptureError;
use crate::frame::{Frame, PixelEncoding};

/// Configuration for a synthetic source.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    /// Identifier, e.g. "stub://front_camera".
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Number of frames before end of stream. `None` streams forever.
    pub frame_limit: Option<u64>,
    /// Pixels the square moves per frame.
    pub speed: u32,
    /// Maximum absolute noise added to each sample.
    pub noise: u8,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            name: "stub://camera".to_string(),
            width: 640,
            height: 480,
            frame_limit: None,
            speed: 4,
            noise: 6,
            seed: 7,
        }
    }
}

/// Synthetic moving-square source.
pub struct SyntheticSource {
    config: SyntheticConfig,
    rng: StdRng,
    frame_count: u64,
    is_open: bool,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            rng,
            frame_count: 0,
            is_open: false,
        }
    }

    fn generate_pixels(&mut self) -> Vec<u8> {
        let w = self.config.width as usize;
        let h = self.config.height as usize;
        let side = (w.min(h) / 5).max(1);
        let travel = w.saturating_sub(side).max(1);
        let offset = (self.frame_count as usize * self.config.speed as usize) % travel;
        let top = (h - side.min(h)) / 2;
        let noise = self.config.noise as i16;

        let mut pixels = vec![0u8; w * h * 3];
        for y in 0..h {
            for x in 0..w {
                let inside = x >= offset && x < offset + side && y >= top && y < top + side;
                let base: [i16; 3] = if inside {
                    [40, 220, 240]
                } else {
                    [
                        (x * 255 / w.max(1)) as i16 / 2,
                        (y * 255 / h.max(1)) as i16 / 2,
                        64,
                    ]
                };
                let idx = (y * w + x) * 3;
                for c in 0..3 {
                    let jitter = if noise > 0 {
                        self.rng.gen_range(-noise..=noise)
                    } else {
                        0
                    };
                    pixels[idx + c] = (base[c] + jitter).clamp(0, 255) as u8;
                }
            }
        }
        pixels
    }
}

impl CaptureSource for SyntheticSource {
    fn describe(&self) -> String {
        self.config.name.clone()
    }

    fn open(&mut self) -> Result<(), CaptureError> {
        if self.config.width == 0 || self.config.height == 0 {
            return Err(CaptureError::Open {
                uri: self.config.name.clone(),
                reason: format!(
                    "invalid synthetic frame size {}x{}",
                    self.config.width, self.config.height
                ),
            });
        }
        self.rng = StdRng::seed_from_u64(self.config.seed);
        self.frame_count = 0;
        self.is_open = true;
        log::info!(
            "SyntheticSource: opened {} ({}x{})",
            self.config.name,
            self.config.width,
            self.config.height
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        if !self.is_open {
            return Err(CaptureError::NotOpen {
                uri: self.config.name.clone(),
            });
        }
        if let Some(limit) = self.config.frame_limit {
            if self.frame_count >= limit {
                return Ok(None);
            }
        }

        let pixels = self.generate_pixels();
        let frame = Frame::new(
            self.config.width,
            self.config.height,
            PixelEncoding::Bgr,
            pixels,
        )?
        .with_sequence(self.frame_count);
        self.frame_count += 1;
        Ok(Some(frame))
    }

    fn close(&mut self) {
        if self.is_open {
            self.is_open = false;
            log::debug!(
                "SyntheticSource: closed {} after {} frames",
                self.config.name,
                self.frame_count
            );
        }
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            uri: self.config.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> SyntheticConfig {
        SyntheticConfig {
            name: "stub://test".to_string(),
            width: 40,
            height: 30,
            frame_limit: Some(3),
            ..SyntheticConfig::default()
        }
    }

    #[test]
    fn synthetic_source_produces_frames_until_limit() -> anyhow::Result<()> {
        let mut source = SyntheticSource::new(small_config());
        source.open()?;

        let mut sequences = Vec::new();
        while let Some(frame) = source.next_frame()? {
            assert_eq!(frame.dimensions(), (40, 30));
            assert_eq!(frame.encoding(), PixelEncoding::Bgr);
            sequences.push(frame.sequence());
        }
        assert_eq!(sequences, vec![0, 1, 2]);
        assert_eq!(source.stats().frames_captured, 3);
        Ok(())
    }

    #[test]
    fn synthetic_source_requires_open() {
        let mut source = SyntheticSource::new(small_config());
        assert!(matches!(
            source.next_frame(),
            Err(CaptureError::NotOpen { .. })
        ));
    }

    #[test]
    fn synthetic_source_is_deterministic_per_seed() -> anyhow::Result<()> {
        let mut a = SyntheticSource::new(small_config());
        let mut b = SyntheticSource::new(small_config());
        a.open()?;
        b.open()?;
        assert_eq!(a.next_frame()?, b.next_frame()?);
        Ok(())
    }

    #[test]
    fn synthetic_frames_change_over_time() -> anyhow::Result<()> {
        let mut source = SyntheticSource::new(SyntheticConfig {
            noise: 0,
            ..small_config()
        });
        source.open()?;
        let first = source.next_frame()?.expect("frame");
        let second = source.next_frame()?.expect("frame");
        assert_ne!(first.as_bytes(), second.as_bytes());
        Ok(())
    }
}
