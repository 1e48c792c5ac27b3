use std::path::{Path, PathBuf};

use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::video_reader::VideoReader;

/// Adapts a folder of still images to the [`VideoReader`] interface.
///
/// Files are processed in lexicographic order, one frame per file, with
/// `fps = 0`. [`list_image_files`] gives callers the same ordering, so a
/// frame index maps back to its source file.
pub struct ImageFolderReader {
    files: Vec<PathBuf>,
}

impl ImageFolderReader {
    pub fn new() -> Self {
        Self { files: Vec::new() }
    }
}

impl Default for ImageFolderReader {
    fn default() -> Self {
        Self::new()
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Lists the image files in a folder, sorted lexicographically.
///
/// This is the frame order [`ImageFolderReader`] uses, so callers can
/// map frame indices back to file names.
pub fn list_image_files(dir: &Path) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_image_file(p))
        .collect();
    files.sort();
    Ok(files)
}

impl VideoReader for ImageFolderReader {
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
        let files = list_image_files(path)?;

        if files.is_empty() {
            return Err(format!("no image files in {}", path.display()).into());
        }

        let (width, height) = image::image_dimensions(&files[0])?;
        log::info!("found {} image(s) in {}", files.len(), path.display());

        let metadata = VideoMetadata {
            width,
            height,
            fps: 0.0,
            total_frames: files.len(),
            codec: String::new(),
        };
        self.files = files;
        Ok(metadata)
    }

    fn frames(
        &mut self,
    ) -> Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + '_> {
        Box::new(self.files.iter().enumerate().map(|(index, path)| {
            let img = image::open(path)
                .map_err(|e| format!("failed to decode {}: {e}", path.display()))?
                .to_rgb8();
            let (width, height) = img.dimensions();
            Ok(Frame::new(img.into_raw(), width, height, index))
        }))
    }

    fn close(&mut self) {
        self.files.clear();
    }
}
