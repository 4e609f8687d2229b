//! Draws detections onto a display copy of a frame

use crate::classify::ClassifiedDetection;
use crate::frame::Frame;
use image::Rgb;
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use pantrack_core::{BoundingBox, Detection};

pub const TARGET_COLOR: Rgb<u8> = Rgb([0, 220, 0]);
pub const OTHER_COLOR: Rgb<u8> = Rgb([255, 176, 0]);
pub const MARKER_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const MARKER_RADIUS: i32 = 5;

/// Box clipped to the frame, or `None` when nothing of it is visible
fn clip(bbox: &BoundingBox, width: u32, height: u32) -> Option<Rect> {
    let x1 = bbox.x1.clamp(0, width as i32);
    let y1 = bbox.y1.clamp(0, height as i32);
    let x2 = bbox.x2.clamp(0, width as i32);
    let y2 = bbox.y2.clamp(0, height as i32);
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some(Rect::at(x1, y1).of_size((x2 - x1) as u32, (y2 - y1) as u32))
}

/// Annotated copy of `frame`; the source frame is left as captured
pub fn annotate(
    frame: &Frame,
    detections: &[ClassifiedDetection],
    target: Option<&Detection>,
) -> Frame {
    let mut display = frame.clone();
    let (width, height) = (display.width(), display.height());

    for classified in detections {
        let color = if classified.is_target() {
            TARGET_COLOR
        } else {
            OTHER_COLOR
        };
        if let Some(rect) = clip(&classified.detection.bbox, width, height) {
            draw_hollow_rect_mut(&mut display.image, rect, color);
        }
    }

    if let Some(target) = target {
        draw_filled_circle_mut(&mut display.image, (target.x, target.y), MARKER_RADIUS, MARKER_COLOR);
    }

    display
}
