use image::imageops;
use image::RgbImage;

use crate::shared::frame::Frame;

/// Clockwise rotation applied to frames before detection.
///
/// Useful for sources recorded sideways (phone clips, some webcams).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Rotation {
    #[default]
    None,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Only right-angle rotations are supported.
    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees {
            0 => Some(Rotation::None),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }

    pub fn swaps_dimensions(&self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }

    /// Returns the rotated frame; channel order and index are preserved.
    pub fn apply(&self, frame: Frame) -> Frame {
        if *self == Rotation::None {
            return frame;
        }

        let width = frame.width();
        let height = frame.height();
        let order = frame.order();
        let index = frame.index();

        let Some(img) = RgbImage::from_raw(width, height, frame.into_data()) else {
            // Unreachable for frames built through Frame::new.
            return Frame::with_order(vec![0; (width * height * 3) as usize], width, height, order, index);
        };

        let rotated = match self {
            Rotation::None => img,
            Rotation::Deg90 => imageops::rotate90(&img),
            Rotation::Deg180 => imageops::rotate180(&img),
            Rotation::Deg270 => imageops::rotate270(&img),
        };

        let (w, h) = rotated.dimensions();
        Frame::with_order(rotated.into_raw(), w, h, order, index)
    }
}
