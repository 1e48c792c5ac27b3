/// Properties of a frame source, as reported when it is opened.
///
/// Cameras and image folders are represented uniformly: a camera reports
/// `total_frames = 0` (unbounded), an image folder reports `fps = 0.0`.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub total_frames: usize,
    pub codec: String,
}

impl VideoMetadata {
    /// Swaps width and height, for 90/270-degree rotation.
    pub fn transposed(&self) -> Self {
        Self {
            width: self.height,
            height: self.width,
            ..self.clone()
        }
    }
}
