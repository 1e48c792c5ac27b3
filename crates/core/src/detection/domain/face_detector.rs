use crate::shared::frame::Frame;
use crate::shared::rect::Rect;

/// Domain interface for face detection.
///
/// Implementations may hold a running graph or a model session,
/// hence `&mut self`.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Rect>, Box<dyn std::error::Error>>;
}
