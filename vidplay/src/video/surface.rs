use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use media_types::{PixelFormat, VideoFrame};

use crate::error::{DeviceError, SnapshotError};

/**
    Something video frames can be presented on.

    Frames arrive from the video sink thread, already converted to RGBA
    and in presentation order. Returning an error detaches the surface;
    playback continues without video output.
*/
pub trait RenderSurface: Send {
    fn present(&mut self, frame: &VideoFrame) -> Result<(), DeviceError>;
}

impl<F> RenderSurface for F
where
    F: FnMut(&VideoFrame) -> Result<(), DeviceError> + Send,
{
    fn present(&mut self, frame: &VideoFrame) -> Result<(), DeviceError> {
        self(frame)
    }
}

/**
    The currently attached surface, if any.

    Shared between the player, which attaches and detaches surfaces, and
    the video sink, which presents on it.
*/
#[derive(Default)]
pub struct SurfaceSlot {
    surface: Mutex<Option<Box<dyn RenderSurface>>>,
}

impl SurfaceSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, surface: Box<dyn RenderSurface>) {
        *self.surface.lock() = Some(surface);
    }

    pub fn detach(&self) -> Option<Box<dyn RenderSurface>> {
        self.surface.lock().take()
    }

    pub fn is_attached(&self) -> bool {
        self.surface.lock().is_some()
    }

    /**
        Present a frame on the attached surface. Frames presented while no
        surface is attached are discarded. Returns false if the surface
        failed and was detached.
    */
    pub fn present(&self, frame: &VideoFrame) -> bool {
        let mut surface = self.surface.lock();
        let Some(target) = surface.as_mut() else {
            return true;
        };
        match target.present(frame) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("detaching render surface after error: {e}");
                *surface = None;
                false
            }
        }
    }
}

/**
    A surface that keeps the most recently presented frame.

    Cheap to clone; every clone sees the same frame. Useful for thumbnails
    and for saving a still from the command line.
*/
#[derive(Clone, Default)]
pub struct SnapshotSurface {
    latest: Arc<Mutex<Option<VideoFrame>>>,
}

impl SnapshotSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<VideoFrame> {
        self.latest.lock().clone()
    }

    /**
        Write the latest frame as a PNG. Returns false if nothing has been
        presented yet.
    */
    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<bool, SnapshotError> {
        let Some(frame) = self.latest() else {
            return Ok(false);
        };
        if frame.format != PixelFormat::Rgba {
            return Err(SnapshotError::Format(frame.format));
        }
        let (width, height) = (frame.width, frame.height);
        let image = image::RgbaImage::from_raw(width, height, frame.data)
            .ok_or(SnapshotError::Size { width, height })?;
        image.save(path.as_ref())?;
        Ok(true)
    }
}

impl RenderSurface for SnapshotSurface {
    fn present(&mut self, frame: &VideoFrame) -> Result<(), DeviceError> {
        *self.latest.lock() = Some(frame.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_types::{Pts, Rational};

    fn frame(pts: i64) -> VideoFrame {
        VideoFrame::new(vec![255; 2 * 2 * 4], 2, 2, PixelFormat::Rgba, Some(Pts(pts)), Rational::new(1, 1000))
    }

    #[test]
    fn failing_surface_is_detached() {
        let slot = SurfaceSlot::new();
        slot.attach(Box::new(|_: &VideoFrame| -> Result<(), DeviceError> {
            Err(DeviceError::Surface("lost".into()))
        }));
        assert!(!slot.present(&frame(0)));
        assert!(!slot.is_attached());
        assert!(slot.present(&frame(40)));
    }

    #[test]
    fn closures_act_as_surfaces() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let slot = SurfaceSlot::new();
        {
            let seen = Arc::clone(&seen);
            slot.attach(Box::new(move |f: &VideoFrame| -> Result<(), DeviceError> {
                seen.lock().push(f.pts);
                Ok(())
            }));
        }
        slot.present(&frame(0));
        slot.present(&frame(40));
        assert_eq!(*seen.lock(), [Some(Pts(0)), Some(Pts(40))]);
    }

    #[test]
    fn snapshot_saves_png() {
        let snapshot = SnapshotSurface::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        assert!(!snapshot.save_png(&path).unwrap());

        let slot = SurfaceSlot::new();
        slot.attach(Box::new(snapshot.clone()));
        slot.present(&frame(80));
        assert_eq!(snapshot.latest().unwrap().pts, Some(Pts(80)));
        assert!(snapshot.save_png(&path).unwrap());
        assert!(path.exists());
    }

    #[test]
    fn snapshot_rejects_frames_it_cannot_encode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");

        let mut snapshot = SnapshotSurface::new();
        let yuv = VideoFrame::new(vec![0; 6], 2, 2, PixelFormat::Yuv420p, Some(Pts(0)), Rational::new(1, 1000));
        snapshot.present(&yuv).unwrap();
        assert!(matches!(
            snapshot.save_png(&path),
            Err(SnapshotError::Format(PixelFormat::Yuv420p))
        ));

        let short = VideoFrame::new(vec![0; 3], 2, 2, PixelFormat::Rgba, Some(Pts(40)), Rational::new(1, 1000));
        snapshot.present(&short).unwrap();
        assert!(matches!(
            snapshot.save_png(&path),
            Err(SnapshotError::Size { width: 2, height: 2 })
        ));
        assert!(!path.exists());

        let missing = dir.path().join("missing").join("frame.png");
        snapshot.present(&frame(80)).unwrap();
        assert!(matches!(snapshot.save_png(&missing), Err(SnapshotError::Image(_))));
    }
}
