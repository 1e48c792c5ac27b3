pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];

/// Stroke color (red) and width for drawn detection boxes.
pub const OVERLAY_COLOR: [u8; 3] = [255, 0, 0];
pub const OVERLAY_STROKE: u32 = 3;
