use chrono::{DateTime, Utc};
use image::{DynamicImage, Rgb, RgbImage};

/// One captured RGB frame
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            captured_at: Utc::now(),
        }
    }

    /// Solid-colour frame, mostly for tests and warm-up
    pub fn filled(width: u32, height: u32, color: [u8; 3]) -> Self {
        Self::new(RgbImage::from_pixel(width, height, Rgb(color)))
    }

    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self::new(image.to_rgb8())
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Pixel centre, used as the sentinel position when nothing is detected
    pub fn center(&self) -> (i32, i32) {
        ((self.width() / 2) as i32, (self.height() / 2) as i32)
    }
}
