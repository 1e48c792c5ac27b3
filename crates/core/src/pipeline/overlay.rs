use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;

use crate::shared::constants::{OVERLAY_COLOR, OVERLAY_STROKE};
use crate::shared::frame::Frame;
use crate::shared::rect::Rect;

/// Draws a hollow rectangle over each detected face, in place.
///
/// Boxes are clamped to the frame before drawing; the stroke grows inward
/// so the outline never spills past the box edge.
pub fn draw_rects(frame: &mut Frame, rects: &[Rect]) {
    if rects.is_empty() {
        return;
    }

    let width = frame.width();
    let height = frame.height();
    let Some(mut img) = RgbImage::from_raw(width, height, frame.data().to_vec()) else {
        return;
    };

    for rect in rects {
        let clamped = rect.clamp_to(width, height);
        if clamped.is_empty() {
            continue;
        }
        for inset in 0..OVERLAY_STROKE as i32 {
            let inner = Rect::new(
                clamped.x + inset,
                clamped.y + inset,
                clamped.width - 2 * inset,
                clamped.height - 2 * inset,
            );
            if inner.is_empty() {
                break;
            }
            draw_hollow_rect_mut(
                &mut img,
                imageproc::rect::Rect::at(inner.x, inner.y)
                    .of_size(inner.width as u32, inner.height as u32),
                Rgb(OVERLAY_COLOR),
            );
        }
    }

    frame.data_mut().copy_from_slice(&img.into_raw());
}
