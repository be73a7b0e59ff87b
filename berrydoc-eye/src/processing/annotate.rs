//! Drawing detection boxes onto a copy of the source image

use crate::models::detector::RawDetections;
use crate::processing::font::{draw_text, text_width, GLYPH_HEIGHT};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

const PALETTE: &[[u8; 3]] = &[
    [255, 56, 56],
    [255, 157, 151],
    [255, 112, 31],
    [255, 178, 29],
    [207, 210, 49],
    [72, 249, 10],
    [146, 204, 23],
    [61, 219, 134],
    [26, 147, 52],
    [0, 212, 187],
    [44, 153, 168],
    [0, 194, 255],
    [52, 69, 147],
    [100, 115, 255],
    [0, 24, 236],
    [132, 56, 255],
];

/// Box colour for a class index
pub fn class_color(class_index: usize) -> Rgb<u8> {
    Rgb(PALETTE[class_index % PALETTE.len()])
}

/// Copy of `image` with every detection outlined and labelled
pub fn annotate(image: &DynamicImage, raw: &RawDetections) -> RgbImage {
    let mut canvas = image.to_rgb8();
    let (width, height) = canvas.dimensions();
    if width == 0 || height == 0 {
        return canvas;
    }

    // Scale line width and text with the image so tags stay legible
    let thickness = ((width.max(height) as f32 / 400.0).round() as u32).clamp(1, 8);
    let text_scale = thickness.clamp(1, 4);

    for entry in &raw.entries {
        let color = class_color(entry.class_index);
        let [x1, y1, x2, y2] = entry.bbox;
        let x1 = x1.clamp(0.0, (width - 1) as f32) as i32;
        let y1 = y1.clamp(0.0, (height - 1) as f32) as i32;
        let x2 = x2.clamp(0.0, width as f32) as i32;
        let y2 = y2.clamp(0.0, height as f32) as i32;
        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        for t in 0..thickness as i32 {
            let w = x2 - x1 - 2 * t;
            let h = y2 - y1 - 2 * t;
            if w <= 0 || h <= 0 {
                break;
            }
            draw_hollow_rect_mut(
                &mut canvas,
                Rect::at(x1 + t, y1 + t).of_size(w as u32, h as u32),
                color,
            );
        }

        let text = format!("{} {:.2}", entry.label, entry.confidence);
        let tag_w = text_width(&text, text_scale) + 2 * text_scale;
        let tag_h = GLYPH_HEIGHT * text_scale + 2 * text_scale;
        // Tag sits above the box, or inside it when the box touches the top edge
        let tag_y = if y1 >= tag_h as i32 { y1 - tag_h as i32 } else { y1 };

        draw_filled_rect_mut(&mut canvas, Rect::at(x1, tag_y).of_size(tag_w, tag_h), color);
        draw_text(
            &mut canvas,
            (x1 + text_scale as i32) as i64,
            (tag_y + text_scale as i32) as i64,
            text_scale,
            Rgb([255, 255, 255]),
            &text,
        );
    }

    canvas
}
