use image::{DynamicImage, GrayImage, RgbImage};

/// A single camera/video frame: contiguous RGB (or luma) bytes in row-major order.
///
/// Format conversion happens at I/O boundaries only; the grayscale form
/// used for detection and recognition is derived on demand.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Luma view of the frame. Single-channel frames are copied as-is.
    pub fn grayscale(&self) -> GrayImage {
        let (w, h) = (self.width, self.height);
        let converted = match self.channels {
            1 => GrayImage::from_raw(w, h, self.data.clone()),
            3 => RgbImage::from_raw(w, h, self.data.clone())
                .map(|rgb| DynamicImage::ImageRgb8(rgb).to_luma8()),
            _ => None,
        };
        converted.unwrap_or_else(|| GrayImage::new(w, h))
    }
}
