use std::sync::Arc;
use std::time::SystemTime;

use crate::capture::domain::frame_source::FrameSource;
use crate::detection::domain::face_locator::FaceLocator;
use crate::enrollment::face_normalizer::FaceNormalizer;
use crate::recognition::domain::recognition_engine::RecognitionModel;
use crate::recognition::model_store::ModelStore;
use crate::shared::error::{FaceIdError, MessageCategory};
use crate::shared::label::IdentityLabel;

/// Result of one identification attempt.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum IdentifyOutcome {
    Matched { label: IdentityLabel, distance: f64 },
    /// Nearest identity, but farther than the configured maximum distance.
    LowConfidence { label: IdentityLabel, distance: f64 },
    NoFaceFound,
    NoModelAvailable,
}

impl IdentifyOutcome {
    pub fn category(&self) -> MessageCategory {
        match self {
            Self::Matched { .. } => MessageCategory::Matched,
            Self::LowConfidence { .. } => MessageCategory::LowConfidence,
            Self::NoFaceFound => MessageCategory::NoFaceFound,
            Self::NoModelAvailable => MessageCategory::NoModelAvailable,
        }
    }
}

struct CachedModel {
    modified: SystemTime,
    model: Box<dyn RecognitionModel>,
}

/// Detect, normalize and predict on the newest frame.
///
/// Never writes anything. The loaded model is cached and reloaded only when
/// the model file's modification time changes.
pub struct IdentifyFaceUseCase {
    model_store: Arc<ModelStore>,
    normalizer: FaceNormalizer,
    max_distance: Option<f64>,
    cached: Option<CachedModel>,
}

impl IdentifyFaceUseCase {
    pub fn new(
        model_store: Arc<ModelStore>,
        normalizer: FaceNormalizer,
        max_distance: Option<f64>,
    ) -> Self {
        Self {
            model_store,
            normalizer,
            max_distance,
            cached: None,
        }
    }

    pub fn execute(
        &mut self,
        frames: &mut dyn FrameSource,
        locator: &mut dyn FaceLocator,
    ) -> Result<IdentifyOutcome, FaceIdError> {
        let frame = match frames.latest_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(IdentifyOutcome::NoFaceFound),
            Err(e) => {
                log::warn!("Frame source failed: {e}");
                return Ok(IdentifyOutcome::NoFaceFound);
            }
        };

        let gray = frame.grayscale();
        let regions = match locator.locate(&gray) {
            Ok(regions) => regions,
            Err(e) => {
                log::warn!("Face locator failed on frame {}: {e}", frame.index());
                return Ok(IdentifyOutcome::NoFaceFound);
            }
        };
        let Some(face) = regions
            .first()
            .and_then(|region| self.normalizer.normalize(&gray, region))
        else {
            return Ok(IdentifyOutcome::NoFaceFound);
        };

        let Some(model) = self.current_model()? else {
            return Ok(IdentifyOutcome::NoModelAvailable);
        };
        let prediction = model.predict(&face)?;

        let outcome = match self.max_distance {
            Some(max) if prediction.distance > max => IdentifyOutcome::LowConfidence {
                label: prediction.label,
                distance: prediction.distance,
            },
            _ => IdentifyOutcome::Matched {
                label: prediction.label,
                distance: prediction.distance,
            },
        };
        log::info!("Identification on frame {}: {outcome:?}", frame.index());
        Ok(outcome)
    }

    fn current_model(&mut self) -> Result<Option<&dyn RecognitionModel>, FaceIdError> {
        let Some(modified) = self.model_store.modified() else {
            self.cached = None;
            return Ok(None);
        };

        let fresh = matches!(&self.cached, Some(c) if c.modified == modified);
        if !fresh {
            let model = match self.model_store.load() {
                Ok(model) => model,
                Err(FaceIdError::NoModelAvailable) => {
                    self.cached = None;
                    return Ok(None);
                }
                Err(e) => return Err(e),
            };
            log::debug!("Loaded model from {}", self.model_store.path().display());
            self.cached = Some(CachedModel { modified, model });
        }
        Ok(self.cached.as_ref().map(|c| c.model.as_ref()))
    }
}
