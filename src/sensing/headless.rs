//! Collaborators for running a session without a device attached.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use image::{DynamicImage, Rgb, RgbImage};

use crate::measurement::{HapticFeedback, IdleSleepToggle, SnapshotSource};

const ENABLE_LOGS: bool = true;

use crate::log_info;

/// Counts haptic pulses and logs each one.
#[derive(Debug, Default)]
pub struct LoggingHaptics {
    pulses: AtomicU64,
}

impl LoggingHaptics {
    pub fn pulses(&self) -> u64 {
        self.pulses.load(Ordering::SeqCst)
    }
}

impl HapticFeedback for LoggingHaptics {
    fn trigger(&self) {
        let count = self.pulses.fetch_add(1, Ordering::SeqCst) + 1;
        log_info!("haptic pulse #{count}");
    }
}

#[derive(Debug, Default)]
pub struct LoggingIdleSleep {
    disabled: AtomicBool,
}

impl LoggingIdleSleep {
    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }
}

impl IdleSleepToggle for LoggingIdleSleep {
    fn set_disabled(&self, disabled: bool) {
        let previous = self.disabled.swap(disabled, Ordering::SeqCst);
        if previous != disabled {
            log_info!("idle sleep {}", if disabled { "disabled" } else { "restored" });
        }
    }
}

/// Produces a gradient frame that shifts a little on every capture.
#[derive(Debug)]
pub struct SyntheticSnapshots {
    width: u32,
    height: u32,
    frame: AtomicU64,
}

impl SyntheticSnapshots {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frame: AtomicU64::new(0),
        }
    }
}

impl Default for SyntheticSnapshots {
    fn default() -> Self {
        Self::new(640, 480)
    }
}

impl SnapshotSource for SyntheticSnapshots {
    fn capture_snapshot(&self) -> Option<DynamicImage> {
        if self.width == 0 || self.height == 0 {
            return None;
        }

        let shift = (self.frame.fetch_add(1, Ordering::SeqCst) * 8 % 256) as u32;
        let (width, height) = (self.width, self.height);
        let image = RgbImage::from_fn(width, height, |x, y| {
            let r = ((x * 255 / width + shift) % 256) as u8;
            let g = (y * 255 / height) as u8;
            Rgb([r, g, 128])
        });
        Some(DynamicImage::ImageRgb8(image))
    }
}
