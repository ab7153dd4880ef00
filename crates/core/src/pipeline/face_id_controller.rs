use std::sync::Arc;
use std::time::Duration;

use crate::capture::domain::frame_source::FrameSource;
use crate::dataset::dataset_builder::DatasetBuilder;
use crate::dataset::domain::face_image_store::FaceImageStore;
use crate::detection::domain::face_locator::FaceLocator;
use crate::enrollment::capture_session::{CaptureContext, CaptureSession, TickOutcome};
use crate::enrollment::face_normalizer::FaceNormalizer;
use crate::pipeline::identify_face_use_case::{IdentifyFaceUseCase, IdentifyOutcome};
use crate::pipeline::training_executor::{
    TrainingExecutor, TrainingHandle, TrainingJob, TrainingReport,
};
use crate::recognition::domain::recognition_engine::RecognitionEngine;
use crate::recognition::model_store::ModelStore;
use crate::shared::config::{CorruptEntryPolicy, FaceIdConfig};
use crate::shared::error::{FaceIdError, MessageCategory};
use crate::shared::label::IdentityLabel;

/// Coarse controller state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Running,
    Flushing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelOutcome {
    /// A running capture was discarded along with its images.
    CaptureCancelled,
    /// Training was asked to stop. No model write starts after the cancel
    /// returns; one already in progress has finished by then.
    TrainingCancelled,
    NothingToCancel,
}

impl CancelOutcome {
    pub fn category(&self) -> MessageCategory {
        match self {
            Self::CaptureCancelled => MessageCategory::CaptureCancelled,
            Self::TrainingCancelled => MessageCategory::Cancelled,
            Self::NothingToCancel => MessageCategory::NothingToCancel,
        }
    }
}

/// The external collaborators a controller drives.
pub struct FaceIdComponents {
    pub frames: Box<dyn FrameSource>,
    pub locator: Box<dyn FaceLocator>,
    pub image_store: Arc<dyn FaceImageStore>,
    pub engine: Arc<dyn RecognitionEngine>,
    pub executor: Box<dyn TrainingExecutor>,
}

enum Phase {
    Idle,
    Running(CaptureSession),
    Flushing {
        label: Option<IdentityLabel>,
        handle: TrainingHandle,
    },
}

/// Enrollment and identification control surface.
///
/// `Idle → Running → Flushing → Idle`. An external timer calls [`tick`]
/// while running and [`poll_training`] while flushing.
///
/// [`tick`]: FaceIdController::tick
/// [`poll_training`]: FaceIdController::poll_training
pub struct FaceIdController {
    frames: Box<dyn FrameSource>,
    locator: Box<dyn FaceLocator>,
    image_store: Arc<dyn FaceImageStore>,
    engine: Arc<dyn RecognitionEngine>,
    executor: Box<dyn TrainingExecutor>,
    model_store: Arc<ModelStore>,
    normalizer: FaceNormalizer,
    identify: IdentifyFaceUseCase,
    tick_limit: u32,
    corrupt_entry_policy: CorruptEntryPolicy,
    phase: Phase,
}

impl FaceIdController {
    pub fn new(components: FaceIdComponents, config: &FaceIdConfig) -> Self {
        let normalizer = FaceNormalizer::new(config.face_width, config.face_height);
        let model_store = Arc::new(ModelStore::new(
            config.model_path.clone(),
            components.engine.clone(),
        ));
        let identify =
            IdentifyFaceUseCase::new(model_store.clone(), normalizer, config.max_distance);

        Self {
            frames: components.frames,
            locator: components.locator,
            image_store: components.image_store,
            engine: components.engine,
            executor: components.executor,
            model_store,
            normalizer,
            identify,
            tick_limit: config.tick_limit,
            corrupt_entry_policy: config.corrupt_entry_policy,
            phase: Phase::Idle,
        }
    }

    pub fn state(&self) -> CaptureState {
        match self.phase {
            Phase::Idle => CaptureState::Idle,
            Phase::Running(_) => CaptureState::Running,
            Phase::Flushing { .. } => CaptureState::Flushing,
        }
    }

    /// Label of the capture being trained, `None` for a plain retrain.
    pub fn flushing_label(&self) -> Option<IdentityLabel> {
        match &self.phase {
            Phase::Flushing { label, .. } => *label,
            _ => None,
        }
    }

    pub fn start_capture(&mut self, label: &str) -> Result<IdentityLabel, FaceIdError> {
        let label = IdentityLabel::parse(label)?;
        if !matches!(self.phase, Phase::Idle) {
            return Err(FaceIdError::SessionAlreadyActive);
        }
        log::info!(
            "Capture started for label {label} ({} ticks)",
            self.tick_limit
        );
        self.phase = Phase::Running(CaptureSession::new(label, self.tick_limit));
        Ok(label)
    }

    pub fn cancel_capture(&mut self) -> CancelOutcome {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Idle => CancelOutcome::NothingToCancel,
            Phase::Running(session) => {
                session.discard(self.image_store.as_ref());
                CancelOutcome::CaptureCancelled
            }
            Phase::Flushing { handle, label } => {
                handle.cancel();
                self.model_store.wait_for_writers();
                match label {
                    Some(label) => log::info!("Training cancelled for label {label}"),
                    None => log::info!("Training cancelled"),
                }
                CancelOutcome::TrainingCancelled
            }
        }
    }

    /// Timer hook. Returns `None` unless a capture is running.
    ///
    /// The tick that reaches the limit hands the store to a training job and
    /// moves the controller to `Flushing`.
    pub fn tick(&mut self) -> Option<TickOutcome> {
        let Phase::Running(session) = &mut self.phase else {
            return None;
        };

        let mut ctx = CaptureContext {
            frames: self.frames.as_mut(),
            locator: self.locator.as_mut(),
            normalizer: &self.normalizer,
            store: self.image_store.as_ref(),
        };
        let outcome = session.tick(&mut ctx);

        if session.is_complete() {
            let label = session.label();
            log::info!(
                "Capture finished for label {label}: {} face(s) in {} ticks",
                session.captured_count(),
                session.ticks_elapsed()
            );
            self.begin_training(Some(label));
        }
        Some(outcome)
    }

    /// Rebuilds and retrains from the image store without capturing.
    pub fn retrain(&mut self) -> Result<(), FaceIdError> {
        if !matches!(self.phase, Phase::Idle) {
            return Err(FaceIdError::SessionAlreadyActive);
        }
        log::info!("Retraining from {}", self.model_store.path().display());
        self.begin_training(None);
        Ok(())
    }

    fn begin_training(&mut self, label: Option<IdentityLabel>) {
        let job = TrainingJob {
            builder: DatasetBuilder::new(
                self.image_store.clone(),
                self.normalizer.output_size(),
                self.corrupt_entry_policy,
            ),
            engine: self.engine.clone(),
            model_store: self.model_store.clone(),
        };
        let handle = self.executor.submit(job);
        self.phase = Phase::Flushing { label, handle };
    }

    /// Completion hook. `Some` exactly once per finished training run, after
    /// which the controller is `Idle` again.
    pub fn poll_training(&mut self) -> Option<Result<TrainingReport, FaceIdError>> {
        let Phase::Flushing { handle, .. } = &self.phase else {
            return None;
        };
        let result = handle.try_result()?;
        self.phase = Phase::Idle;
        Some(result)
    }

    /// Blocks up to `timeout` for the running training job.
    pub fn wait_for_training(
        &mut self,
        timeout: Duration,
    ) -> Option<Result<TrainingReport, FaceIdError>> {
        let Phase::Flushing { handle, .. } = &self.phase else {
            return None;
        };
        let result = handle.wait(timeout)?;
        self.phase = Phase::Idle;
        Some(result)
    }

    /// Single-shot identification on the newest frame. Allowed in any state.
    pub fn identify_once(&mut self) -> Result<IdentifyOutcome, FaceIdError> {
        self.identify
            .execute(self.frames.as_mut(), self.locator.as_mut())
    }
}
