use image::GrayImage;

use crate::shared::region::Region;

/// Finds face rectangles in a grayscale image.
///
/// Regions are returned in the detector's preferred order; callers that need
/// a single face take the first one. Implementations may be stateful, hence
/// `&mut self`.
pub trait FaceLocator: Send {
    fn locate(&mut self, gray: &GrayImage) -> Result<Vec<Region>, Box<dyn std::error::Error>>;
}
