/// Pixel-space bounding box.
///
/// Produced by mapping a normalized detection onto concrete frame
/// dimensions; coordinates may extend past the frame until clamped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Intersects the box with `[0, frame_width) × [0, frame_height)`.
    ///
    /// An off-frame box collapses to an empty one at the nearest edge.
    pub fn clamp_to(&self, frame_width: u32, frame_height: u32) -> Rect {
        let fw = frame_width as i32;
        let fh = frame_height as i32;
        let x = self.x.clamp(0, fw);
        let y = self.y.clamp(0, fh);
        let right = self.right().clamp(x, fw);
        let bottom = self.bottom().clamp(y, fh);
        Rect::new(x, y, right - x, bottom - y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edges() {
        let r = Rect::new(10, 20, 30, 40);
        assert_eq!(r.right(), 40);
        assert_eq!(r.bottom(), 60);
        assert!(!r.is_empty());
    }

    #[test]
    fn test_zero_size_is_empty() {
        assert!(Rect::new(5, 5, 0, 10).is_empty());
        assert!(Rect::new(5, 5, 10, 0).is_empty());
    }

    #[test]
    fn test_clamp_inside_is_identity() {
        let r = Rect::new(10, 10, 20, 20);
        assert_eq!(r.clamp_to(100, 100), r);
    }

    #[test]
    fn test_clamp_overhanging_edges() {
        let r = Rect::new(-10, 90, 30, 30);
        let clamped = r.clamp_to(100, 100);
        assert_eq!(clamped, Rect::new(0, 90, 20, 10));
    }

    #[test]
    fn test_clamp_fully_outside_collapses() {
        let r = Rect::new(200, 200, 50, 50);
        let clamped = r.clamp_to(100, 100);
        assert!(clamped.is_empty());
    }
}
