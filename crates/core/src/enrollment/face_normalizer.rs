use image::imageops::{self, FilterType};
use image::GrayImage;

use crate::shared::face_image::FaceImage;
use crate::shared::region::Region;

/// Crops a face region out of a grayscale frame and resizes it to the
/// fixed recognition shape with bicubic interpolation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaceNormalizer {
    width: u32,
    height: u32,
}

impl FaceNormalizer {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn output_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Returns `None` when the region has no visible area inside the frame.
    pub fn normalize(&self, gray: &GrayImage, region: &Region) -> Option<FaceImage> {
        let (x, y, w, h) = region.clamp(gray.width(), gray.height())?;
        let crop = imageops::crop_imm(gray, x, y, w, h).to_image();
        let resized = imageops::resize(&crop, self.width, self.height, FilterType::CatmullRom);
        Some(FaceImage::new(resized))
    }
}
