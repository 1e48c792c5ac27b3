use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use show_image::{create_window, event::WindowEvent, ImageInfo, ImageView, WindowProxy};

use facepipe_core::shared::frame::Frame;
use facepipe_core::shared::video_metadata::VideoMetadata;
use facepipe_core::video::domain::video_writer::VideoWriter;

/// Displays frames in a window instead of writing them to disk.
///
/// Any keypress in the window sets the shared `cancelled` flag, which the
/// frame loop checks between frames.
pub struct WindowSink {
    title: String,
    cancelled: Arc<AtomicBool>,
    window: Option<WindowProxy>,
}

impl WindowSink {
    pub fn new(title: &str, cancelled: Arc<AtomicBool>) -> Self {
        Self {
            title: title.to_string(),
            cancelled,
            window: None,
        }
    }
}

impl VideoWriter for WindowSink {
    fn open(
        &mut self,
        _path: &Path,
        metadata: &VideoMetadata,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let window = create_window(&self.title, Default::default())?;

        let events = window.event_channel()?;
        let cancelled = self.cancelled.clone();
        std::thread::spawn(move || {
            for event in events {
                if let WindowEvent::KeyboardInput(input) = event {
                    if input.input.state.is_pressed() {
                        cancelled.store(true, Ordering::Relaxed);
                        break;
                    }
                }
            }
        });

        log::info!(
            "showing {}x{} frames; press any key to stop",
            metadata.width,
            metadata.height
        );
        self.window = Some(window);
        Ok(())
    }

    fn write(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        let window = self.window.as_ref().ok_or("WindowSink: not opened")?;
        let view = ImageView::new(
            ImageInfo::rgb8(frame.width(), frame.height()),
            frame.data(),
        );
        window.set_image("frame", view)?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.window = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_before_open_fails() {
        let mut sink = WindowSink::new("test", Arc::new(AtomicBool::new(false)));
        let frame = Frame::new(vec![0u8; 12], 2, 2, 0);
        assert!(sink.write(&frame).is_err());
    }

    #[test]
    fn test_close_without_open_is_ok() {
        let mut sink = WindowSink::new("test", Arc::new(AtomicBool::new(false)));
        sink.close().unwrap();
    }
}
