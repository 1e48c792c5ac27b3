use std::path::Path;

use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::video_reader::VideoReader;

/// Captures frames from a webcam via nokhwa.
///
/// The path passed to [`VideoReader::open`] is ignored; the device index
/// selects the camera. The frame iterator never ends on its own, so the
/// caller decides when to stop (a window keypress in the demo harness).
pub struct CameraReader {
    device_index: u32,
    camera: Option<Camera>,
}

// Safety: CameraReader is only used from a single thread at a time.
// The capture backend handle is never shared across threads.
unsafe impl Send for CameraReader {}

impl CameraReader {
    pub fn new(device_index: u32) -> Self {
        Self {
            device_index,
            camera: None,
        }
    }
}

impl VideoReader for CameraReader {
    fn open(&mut self, _path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
        let index = CameraIndex::Index(self.device_index);
        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution);

        let mut camera = Camera::new(index, requested)?;
        camera.open_stream()?;

        let resolution = camera.resolution();
        let fps = camera.frame_rate();
        log::info!(
            "camera {} opened: {}x{} @ {} fps",
            self.device_index,
            resolution.width(),
            resolution.height(),
            fps
        );

        let metadata = VideoMetadata {
            width: resolution.width(),
            height: resolution.height(),
            fps: fps as f64,
            total_frames: 0,
            codec: String::new(),
        };
        self.camera = Some(camera);
        Ok(metadata)
    }

    fn frames(
        &mut self,
    ) -> Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + '_> {
        let Some(camera) = self.camera.as_mut() else {
            return Box::new(std::iter::once(Err("CameraReader: not opened".into())));
        };

        Box::new(CameraFrameIter {
            camera,
            frame_index: 0,
            failed: false,
        })
    }

    fn close(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            if let Err(e) = camera.stop_stream() {
                log::warn!("failed to stop camera stream: {e}");
            }
        }
    }
}

/// Endless capture loop; yields one error and stops if the device fails.
struct CameraFrameIter<'a> {
    camera: &'a mut Camera,
    frame_index: usize,
    failed: bool,
}

impl Iterator for CameraFrameIter<'_> {
    type Item = Result<Frame, Box<dyn std::error::Error>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        let captured = match self.camera.frame() {
            Ok(buf) => buf,
            Err(e) => {
                self.failed = true;
                return Some(Err(Box::new(e)));
            }
        };

        let decoded = match captured.decode_image::<RgbFormat>() {
            Ok(img) => img,
            Err(e) => {
                self.failed = true;
                return Some(Err(Box::new(e)));
            }
        };

        let (width, height) = decoded.dimensions();
        let frame = Frame::new(decoded.into_raw(), width, height, self.frame_index);
        self.frame_index += 1;
        Some(Ok(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_before_open_yields_error() {
        let mut reader = CameraReader::new(0);
        let mut frames = reader.frames();
        assert!(frames.next().unwrap().is_err());
    }

    #[test]
    fn test_close_without_open_is_ok() {
        let mut reader = CameraReader::new(0);
        reader.close();
        reader.close();
    }

    #[test]
    #[ignore] // Requires actual webcam hardware
    fn test_capture_single_frame() {
        let mut reader = CameraReader::new(0);
        let meta = reader.open(Path::new("")).expect("failed to open camera");
        assert!(meta.width > 0);

        let frame = reader
            .frames()
            .next()
            .expect("no frame")
            .expect("capture failed");
        assert!(frame.width() > 0);
    }
}
