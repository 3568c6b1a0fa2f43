//! Timelapse capture: snapshot, downsample, hand the entry back to the loop.
//!
//! Captures are fire-and-forget. Overlapping triggers are not serialized, so
//! completions may arrive in any order; the session appends them as they come.

use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use chrono::Utc;
use tokio::sync::mpsc::WeakSender;

use crate::error::SessionError;
use crate::models::TimelapseEntry;

use super::collaborators::{ImageProcessor, SnapshotSource};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// Run one capture to completion. Both collaborator calls run on the blocking pool.
pub async fn capture_timelapse_entry(
    snapshots: Arc<dyn SnapshotSource>,
    images: Arc<dyn ImageProcessor>,
    thumbnail_size: u32,
) -> Result<TimelapseEntry, SessionError> {
    let started = Instant::now();
    let captured_at = Utc::now();

    let image = match tokio::task::spawn_blocking(move || snapshots.capture_snapshot()).await {
        Ok(image) => image,
        Err(err) => {
            log_warn!("snapshot worker join failed: {err}");
            None
        }
    }
    .ok_or(SessionError::CaptureUnavailable)?;

    let thumbnail = tokio::task::spawn_blocking(move || images.downsample(&image, thumbnail_size))
        .await
        .map_err(|err| anyhow!("downsample worker join failed: {err}"))
        .and_then(|result| result)
        .map_err(|err| SessionError::DownsampleFailure(format!("{err:#}")))?;

    log_debug!(
        "timelapse thumbnail ready: {} bytes in {}ms",
        thumbnail.len(),
        started.elapsed().as_millis()
    );
    Ok(TimelapseEntry::new(thumbnail, captured_at))
}

/// Spawn a capture whose result is delivered as `M::from(entry)`.
/// Dropped entries (no snapshot, failed downsample, session gone) are only logged.
pub fn spawn_capture<M>(
    snapshots: Arc<dyn SnapshotSource>,
    images: Arc<dyn ImageProcessor>,
    thumbnail_size: u32,
    sink: WeakSender<M>,
) -> tokio::task::JoinHandle<()>
where
    M: From<TimelapseEntry> + Send + 'static,
{
    tokio::spawn(async move {
        let entry = match capture_timelapse_entry(snapshots, images, thumbnail_size).await {
            Ok(entry) => entry,
            Err(SessionError::CaptureUnavailable) => {
                log_debug!("snapshot unavailable; skipping timelapse frame");
                return;
            }
            Err(err) => {
                log_warn!("dropping timelapse frame: {err}");
                return;
            }
        };

        let delivered = match sink.upgrade() {
            Some(sender) => sender.send(M::from(entry)).await.is_ok(),
            None => false,
        };
        if !delivered {
            log_debug!("session already closed; discarding late timelapse frame");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::collaborators::ThumbnailEncoder;
    use image::{DynamicImage, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    struct FixedFrame;

    impl SnapshotSource for FixedFrame {
        fn capture_snapshot(&self) -> Option<DynamicImage> {
            Some(DynamicImage::ImageRgb8(RgbImage::new(320, 240)))
        }
    }

    struct NoFrame(AtomicUsize);

    impl SnapshotSource for NoFrame {
        fn capture_snapshot(&self) -> Option<DynamicImage> {
            self.0.fetch_add(1, Ordering::SeqCst);
            None
        }
    }

    struct BrokenEncoder;

    impl ImageProcessor for BrokenEncoder {
        fn downsample(&self, _image: &DynamicImage, _target_size: u32) -> anyhow::Result<Vec<u8>> {
            Err(anyhow!("encoder offline"))
        }
    }

    #[derive(Debug)]
    struct Delivered(TimelapseEntry);

    impl From<TimelapseEntry> for Delivered {
        fn from(entry: TimelapseEntry) -> Self {
            Delivered(entry)
        }
    }

    #[tokio::test]
    async fn produces_labelled_thumbnail() {
        let entry = capture_timelapse_entry(Arc::new(FixedFrame), Arc::new(ThumbnailEncoder), 100)
            .await
            .unwrap();
        assert!(!entry.thumbnail.is_empty());
        assert!(!entry.name.is_empty());
    }

    #[tokio::test]
    async fn missing_snapshot_is_capture_unavailable() {
        let source = Arc::new(NoFrame(AtomicUsize::new(0)));
        let result =
            capture_timelapse_entry(source.clone(), Arc::new(ThumbnailEncoder), 100).await;
        assert!(matches!(result, Err(SessionError::CaptureUnavailable)));
        assert_eq!(source.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn encoder_failure_is_downsample_failure() {
        let result =
            capture_timelapse_entry(Arc::new(FixedFrame), Arc::new(BrokenEncoder), 100).await;
        assert!(matches!(result, Err(SessionError::DownsampleFailure(_))));
    }

    #[tokio::test]
    async fn spawned_capture_delivers_to_sink() {
        let (tx, mut rx) = mpsc::channel::<Delivered>(4);
        spawn_capture(
            Arc::new(FixedFrame),
            Arc::new(ThumbnailEncoder),
            64,
            tx.downgrade(),
        )
        .await
        .unwrap();

        let Delivered(entry) = rx.recv().await.unwrap();
        assert!(!entry.thumbnail.is_empty());
    }

    #[tokio::test]
    async fn unavailable_snapshot_sends_nothing() {
        let (tx, mut rx) = mpsc::channel::<Delivered>(4);
        spawn_capture(
            Arc::new(NoFrame(AtomicUsize::new(0))),
            Arc::new(ThumbnailEncoder),
            64,
            tx.downgrade(),
        )
        .await
        .unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_session_discards_result() {
        let (tx, rx) = mpsc::channel::<Delivered>(4);
        let sink = tx.downgrade();
        drop(tx);
        drop(rx);

        // Completes without panicking even though nobody is listening.
        spawn_capture(Arc::new(FixedFrame), Arc::new(ThumbnailEncoder), 64, sink)
            .await
            .unwrap();
    }
}
