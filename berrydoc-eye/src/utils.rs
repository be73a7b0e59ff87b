//! Utility functions for vision processing

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};

/// Grey used for letterbox padding, matching the YOLO exporter
pub const LETTERBOX_FILL: u8 = 114;

/// Geometry of a letterboxed image relative to its source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: u32,
    pub pad_y: u32,
    /// Resized content dimensions inside the canvas
    pub content: (u32, u32),
    pub size: u32,
}

impl Letterbox {
    /// Compute the scale and padding that fit `width`x`height` into a square of `size`
    pub fn fit(width: u32, height: u32, size: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
        let new_w = ((width as f32 * scale).round() as u32).clamp(1, size);
        let new_h = ((height as f32 * scale).round() as u32).clamp(1, size);
        Self {
            scale,
            pad_x: (size - new_w) / 2,
            pad_y: (size - new_h) / 2,
            content: (new_w, new_h),
            size,
        }
    }

    /// Map a box from letterboxed model space back to source pixels, clamped
    pub fn unmap(&self, bbox: [f32; 4], source: (u32, u32)) -> [f32; 4] {
        let (w, h) = (source.0 as f32, source.1 as f32);
        let x = |v: f32| ((v - self.pad_x as f32) / self.scale).clamp(0.0, w);
        let y = |v: f32| ((v - self.pad_y as f32) / self.scale).clamp(0.0, h);
        [x(bbox[0]), y(bbox[1]), x(bbox[2]), y(bbox[3])]
    }
}

/// Resize keeping aspect ratio and pad to a `size`x`size` canvas
pub fn letterbox(image: &DynamicImage, size: u32) -> (RgbImage, Letterbox) {
    let geometry = Letterbox::fit(image.width(), image.height(), size);
    let (new_w, new_h) = geometry.content;

    let resized = imageops::resize(&image.to_rgb8(), new_w, new_h, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(size, size, Rgb([LETTERBOX_FILL; 3]));
    imageops::overlay(&mut canvas, &resized, geometry.pad_x as i64, geometry.pad_y as i64);

    (canvas, geometry)
}

/// Convert packed RGB into a planar [3, H, W] float tensor scaled to [0, 1]
pub fn to_chw_tensor(image: &RgbImage) -> Vec<f32> {
    let plane = (image.width() * image.height()) as usize;
    let raw = image.as_raw();
    let mut tensor = vec![0.0f32; 3 * plane];

    for idx in 0..plane {
        tensor[idx] = raw[idx * 3] as f32 / 255.0;
        tensor[plane + idx] = raw[idx * 3 + 1] as f32 / 255.0;
        tensor[2 * plane + idx] = raw[idx * 3 + 2] as f32 / 255.0;
    }

    tensor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letterbox_fit_landscape() {
        let lb = Letterbox::fit(1280, 720, 640);
        assert_eq!(lb.scale, 0.5);
        assert_eq!(lb.pad_x, 0);
        assert_eq!(lb.pad_y, 140);
        assert_eq!(lb.content, (640, 360));
    }

    #[test]
    fn test_letterbox_fit_square() {
        let lb = Letterbox::fit(100, 100, 640);
        assert_eq!(lb.scale, 6.4);
        assert_eq!(lb.pad_x, 0);
        assert_eq!(lb.pad_y, 0);
    }

    #[test]
    fn test_letterbox_canvas() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 100, Rgb([255, 0, 0])));
        let (canvas, lb) = letterbox(&image, 64);
        assert_eq!(canvas.dimensions(), (64, 64));
        assert_eq!(lb.pad_y, 16);
        // Padding band above the image, content in the middle
        assert_eq!(canvas.get_pixel(32, 2), &Rgb([LETTERBOX_FILL; 3]));
        assert_eq!(canvas.get_pixel(32, 32), &Rgb([255, 0, 0]));
    }

    #[test]
    fn test_unmap_round_trip() {
        let lb = Letterbox::fit(1280, 720, 640);
        // Box (100, 200)-(300, 400) in source maps to (50, 240)-(150, 340) in model space
        let source = lb.unmap([50.0, 240.0, 150.0, 340.0], (1280, 720));
        assert_eq!(source, [100.0, 200.0, 300.0, 400.0]);
    }

    #[test]
    fn test_unmap_clamps() {
        let lb = Letterbox::fit(100, 100, 640);
        let source = lb.unmap([-20.0, -5.0, 700.0, 650.0], (100, 100));
        assert_eq!(source, [0.0, 0.0, 100.0, 100.0]);
    }

    #[test]
    fn test_chw_tensor_layout() {
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(0, 0, Rgb([255, 0, 51]));
        image.put_pixel(1, 0, Rgb([0, 255, 102]));
        let tensor = to_chw_tensor(&image);
        assert_eq!(tensor.len(), 6);
        assert_eq!(tensor[0], 1.0);
        assert_eq!(tensor[1], 0.0);
        assert_eq!(tensor[2], 0.0);
        assert_eq!(tensor[3], 1.0);
        assert_eq!(tensor[4], 0.2);
        assert_eq!(tensor[5], 0.4);
    }
}
