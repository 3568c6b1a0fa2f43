//! Host-provided side effects the session controller drives.

use std::future::Future;
use std::io::Cursor;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat};

use crate::models::ActivityRecord;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Grabs the current camera/view frame. `None` when nothing is available.
pub trait SnapshotSource: Send + Sync {
    fn capture_snapshot(&self) -> Option<DynamicImage>;
}

/// Shrinks a snapshot into thumbnail bytes. Called off the session loop.
pub trait ImageProcessor: Send + Sync {
    fn downsample(&self, image: &DynamicImage, target_size: u32) -> Result<Vec<u8>>;
}

pub trait ActivityStore: Send + Sync {
    fn save(&self, record: ActivityRecord) -> BoxFuture<'_, Result<()>>;
}

pub trait HapticFeedback: Send + Sync {
    fn trigger(&self);
}

/// Keeps the device awake while a session is live.
pub trait IdleSleepToggle: Send + Sync {
    fn set_disabled(&self, disabled: bool);
}

#[derive(Clone)]
pub struct Collaborators {
    pub snapshots: Arc<dyn SnapshotSource>,
    pub images: Arc<dyn ImageProcessor>,
    pub store: Arc<dyn ActivityStore>,
    pub haptics: Arc<dyn HapticFeedback>,
    pub idle_sleep: Arc<dyn IdleSleepToggle>,
}

/// Fits the image inside a `target_size` square and encodes it as PNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThumbnailEncoder;

impl ImageProcessor for ThumbnailEncoder {
    fn downsample(&self, image: &DynamicImage, target_size: u32) -> Result<Vec<u8>> {
        let thumbnail = if image.width() > target_size || image.height() > target_size {
            image.thumbnail(target_size, target_size)
        } else {
            image.clone()
        };

        let mut bytes = Cursor::new(Vec::new());
        thumbnail
            .write_to(&mut bytes, ImageFormat::Png)
            .context("failed to encode thumbnail as png")?;
        Ok(bytes.into_inner())
    }
}
