use std::path::{Path, PathBuf};

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::video_writer::VideoWriter;

/// Writes each frame as a JPEG into a folder.
///
/// Frames are named `<source-name>.jpg` where the source name comes from
/// the naming callback (the original file for image-folder input). The
/// `.jpg` suffix is appended to the full original name, so `face.png`
/// becomes `face.png.jpg`. Frames without a source name fall back to a
/// zero-padded index.
pub struct ImageFolderWriter {
    dir: Option<PathBuf>,
    name_for: Box<dyn Fn(usize) -> Option<String> + Send>,
}

impl ImageFolderWriter {
    pub fn new<F>(name_for: F) -> Self
    where
        F: Fn(usize) -> Option<String> + Send + 'static,
    {
        Self {
            dir: None,
            name_for: Box::new(name_for),
        }
    }

    /// A writer that names every frame by its index.
    pub fn indexed() -> Self {
        Self::new(|_| None)
    }

    fn output_path(&self, dir: &Path, frame_index: usize) -> PathBuf {
        match (self.name_for)(frame_index) {
            Some(name) => dir.join(format!("{name}.jpg")),
            None => dir.join(format!("frame_{frame_index:06}.jpg")),
        }
    }
}

impl VideoWriter for ImageFolderWriter {
    fn open(
        &mut self,
        path: &Path,
        _metadata: &VideoMetadata,
    ) -> Result<(), Box<dyn std::error::Error>> {
        std::fs::create_dir_all(path)?;
        self.dir = Some(path.to_path_buf());
        Ok(())
    }

    fn write(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        let dir = self.dir.clone().ok_or("ImageFolderWriter: not opened")?;
        let path = self.output_path(&dir, frame.index());

        let img = image::RgbImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
            .ok_or("failed to create image from frame data")?;
        img.save(&path)?;
        log::debug!("saved {}", path.display());
        Ok(())
    }

    fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.dir = None;
        Ok(())
    }
}
