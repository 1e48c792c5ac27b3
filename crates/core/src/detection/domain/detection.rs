use crate::shared::rect::Rect;

/// How a detection's bounding-box fields are to be read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundingBoxFormat {
    /// Fields are fractions of the frame dimensions, each in [0, 1].
    Relative,
    /// Fields are already pixel values.
    Absolute,
}

/// One detected face: a confidence score and a bounding box.
///
/// The box interpretation depends on [`BoundingBoxFormat`]; conversion to
/// pixel space happens in [`Detection::to_rect`], which is pure.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub score: f32,
    pub format: BoundingBoxFormat,
    pub xmin: f32,
    pub ymin: f32,
    pub width: f32,
    pub height: f32,
}

impl Detection {
    pub fn relative(score: f32, xmin: f32, ymin: f32, width: f32, height: f32) -> Self {
        Self {
            score,
            format: BoundingBoxFormat::Relative,
            xmin,
            ymin,
            width,
            height,
        }
    }

    pub fn absolute(score: f32, xmin: f32, ymin: f32, width: f32, height: f32) -> Self {
        Self {
            score,
            format: BoundingBoxFormat::Absolute,
            xmin,
            ymin,
            width,
            height,
        }
    }

    /// Maps the detection onto concrete frame dimensions.
    ///
    /// Relative boxes are scaled by the frame size; absolute boxes are
    /// taken as-is (they are pixel-valued by definition). Fractional
    /// coordinates truncate toward zero.
    pub fn to_rect(&self, frame_width: u32, frame_height: u32) -> Rect {
        match self.format {
            BoundingBoxFormat::Relative => Rect::new(
                (self.xmin * frame_width as f32) as i32,
                (self.ymin * frame_height as f32) as i32,
                (self.width * frame_width as f32) as i32,
                (self.height * frame_height as f32) as i32,
            ),
            BoundingBoxFormat::Absolute => Rect::new(
                self.xmin as i32,
                self.ymin as i32,
                self.width as i32,
                self.height as i32,
            ),
        }
    }
}
