use std::io::{Read, Write};

use crate::shared::error::FaceIdError;
use crate::shared::face_image::FaceImage;
use crate::shared::label::IdentityLabel;

/// Nearest enrolled identity for a probe image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Prediction {
    pub label: IdentityLabel,
    /// Non-negative; lower means a closer match.
    pub distance: f64,
}

/// A trained face recognition model.
pub trait RecognitionModel: Send + Sync {
    /// Fails when the probe shape differs from the training shape.
    fn predict(&self, probe: &FaceImage) -> Result<Prediction, FaceIdError>;

    fn write_to(&self, writer: &mut dyn Write) -> Result<(), Box<dyn std::error::Error>>;
}

/// Trains models and restores them from their serialized form.
///
/// Training always starts from scratch; there is no incremental update.
pub trait RecognitionEngine: Send + Sync {
    /// `images` and `labels` are parallel, non-empty and share one shape.
    fn train(
        &self,
        images: &[FaceImage],
        labels: &[IdentityLabel],
    ) -> Result<Box<dyn RecognitionModel>, FaceIdError>;

    fn read_model(
        &self,
        reader: &mut dyn Read,
    ) -> Result<Box<dyn RecognitionModel>, Box<dyn std::error::Error>>;
}
