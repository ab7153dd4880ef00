use image::GrayImage;

/// A normalized face crop: single-channel, fixed size.
///
/// Every image handed to training or prediction must share one shape; the
/// recognition engine rejects mismatches.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceImage {
    pixels: GrayImage,
}

impl FaceImage {
    pub fn new(pixels: GrayImage) -> Self {
        Self { pixels }
    }

    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        GrayImage::from_raw(width, height, data).map(Self::new)
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn data(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    pub fn as_gray(&self) -> &GrayImage {
        &self.pixels
    }
}
