//! Simulated crossing for `stub://` sources.
//!
//! The scene loops: empty platform, a train entering from the right, the train standing
//! still, the train rolling through, the train leaving to the left, empty platform again.
//! Sensor noise, occasional birds and a slow exposure drift come from a seeded RNG so runs
//! are reproducible.

use image::{GrayImage, Luma};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::frame::Frame;

const PLATFORM: i16 = 60;
const TRAIN_BODY: i16 = 190;
const TRAIN_STRIPE: i16 = 130;
const STRIPE_PERIOD: u32 = 80;
const NOISE: i16 = 4;
const BIRD_SIZE: u32 = 8;
const BIRD_PROBABILITY: f64 = 0.01;
const MAX_DRIFT: i16 = 20;
/// Frames between one-level exposure drift steps.
const DRIFT_INTERVAL: u64 = 50;

/// Scene phases and their durations in seconds.
const PHASES: [(Phase, u32); 6] = [
    (Phase::Idle, 15),
    (Phase::Entering, 3),
    (Phase::Standing, 20),
    (Phase::Rolling, 60),
    (Phase::Leaving, 3),
    (Phase::Idle, 15),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Entering,
    Standing,
    Rolling,
    Leaving,
}

pub struct SyntheticCrossing {
    width: u32,
    height: u32,
    fps: u32,
    frame_index: u64,
    drift: i16,
    stripe_offset: u32,
    rng: StdRng,
}

impl SyntheticCrossing {
    pub fn new(width: u32, height: u32, fps: u32, seed: u64) -> Self {
        Self {
            width,
            height,
            fps: fps.max(1),
            frame_index: 0,
            drift: 0,
            stripe_offset: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Frames in one full pass of the scene.
    pub fn cycle_len(&self) -> u64 {
        PHASES
            .iter()
            .map(|(_, secs)| u64::from(*secs) * u64::from(self.fps))
            .sum()
    }

    /// Phase of the next frame and how far through it we are, in `[0, 1)`.
    pub fn phase(&self) -> (Phase, f32) {
        let mut pos = self.frame_index % self.cycle_len().max(1);
        for (phase, secs) in PHASES {
            let len = u64::from(secs) * u64::from(self.fps);
            if pos < len {
                return (phase, pos as f32 / len as f32);
            }
            pos -= len;
        }
        (Phase::Idle, 0.0)
    }

    pub fn frames_generated(&self) -> u64 {
        self.frame_index
    }

    /// Undo the simulated exposure drift.
    pub fn correct_exposure(&mut self) {
        log::info!("synthetic exposure corrected (drift {})", self.drift);
        self.drift = 0;
    }

    pub fn next_frame(&mut self) -> Frame {
        let (phase, progress) = self.phase();
        self.frame_index += 1;
        if self.frame_index % DRIFT_INTERVAL == 0 && self.drift < MAX_DRIFT {
            self.drift += 1;
        }

        // Train occupies columns [left, right) of the middle band.
        let full = self.width;
        let (left, right) = match phase {
            Phase::Idle => (0, 0),
            Phase::Entering => {
                let w = ((full as f32) * progress).round() as u32;
                (full - w.min(full), full)
            }
            Phase::Standing => (0, full),
            Phase::Rolling => {
                self.stripe_offset = (self.stripe_offset + 8) % STRIPE_PERIOD;
                (0, full)
            }
            Phase::Leaving => {
                let w = ((full as f32) * (1.0 - progress)).round() as u32;
                (0, w.min(full))
            }
        };
        let top = self.height / 5;
        let bottom = self.height * 17 / 20;

        let mut img = GrayImage::new(self.width, self.height);
        for (x, y, px) in img.enumerate_pixels_mut() {
            let base = if x >= left && x < right && y >= top && y < bottom {
                if ((x + self.stripe_offset) % STRIPE_PERIOD) < STRIPE_PERIOD / 2 {
                    TRAIN_BODY
                } else {
                    TRAIN_STRIPE
                }
            } else {
                PLATFORM
            };
            let noise = self.rng.gen_range(-NOISE..=NOISE);
            *px = Luma([clamp(base + self.drift + noise)]);
        }

        if self.rng.gen_bool(BIRD_PROBABILITY) && self.width > BIRD_SIZE && self.height > BIRD_SIZE {
            let bx = self.rng.gen_range(0..self.width - BIRD_SIZE);
            let by = self.rng.gen_range(0..self.height - BIRD_SIZE);
            for y in by..by + BIRD_SIZE {
                for x in bx..bx + BIRD_SIZE {
                    img.put_pixel(x, y, Luma([20]));
                }
            }
        }

        Frame::new(img)
    }
}

fn clamp(value: i16) -> u8 {
    value.clamp(0, 255) as u8
}
