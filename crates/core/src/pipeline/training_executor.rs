use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};

use crate::dataset::dataset_builder::DatasetBuilder;
use crate::recognition::domain::recognition_engine::RecognitionEngine;
use crate::recognition::model_store::ModelStore;
use crate::shared::error::FaceIdError;

/// Everything one full retrain needs: rebuild the dataset from the image
/// store, train from scratch, persist the model.
pub struct TrainingJob {
    pub builder: DatasetBuilder,
    pub engine: Arc<dyn RecognitionEngine>,
    pub model_store: Arc<ModelStore>,
}

/// Summary of a completed training run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrainingReport {
    pub images: usize,
    pub labels: usize,
    pub skipped: usize,
}

impl TrainingJob {
    /// Runs the job on the current thread. `cancelled` is checked between
    /// phases and again under the model store's write lock, so a cancel seen
    /// before the write starts leaves the model file untouched.
    pub fn run(self, cancelled: &AtomicBool) -> Result<TrainingReport, FaceIdError> {
        let check = || {
            if cancelled.load(Ordering::Relaxed) {
                Err(FaceIdError::Cancelled)
            } else {
                Ok(())
            }
        };

        check()?;
        let dataset = self.builder.build()?;
        if dataset.is_empty() {
            return Err(FaceIdError::Training("the image store holds no usable faces".into()));
        }

        check()?;
        let model = self.engine.train(&dataset.images, &dataset.labels)?;

        self.model_store.save_unless_cancelled(model.as_ref(), cancelled)?;

        Ok(TrainingReport {
            images: dataset.len(),
            labels: dataset.identity_count(),
            skipped: dataset.skipped.len(),
        })
    }
}

/// Abstracts where training runs.
///
/// This is a port; infrastructure decides the threading.
pub trait TrainingExecutor: Send {
    fn submit(&self, job: TrainingJob) -> TrainingHandle;
}

/// Completion signal and cancellation token of one submitted job.
pub struct TrainingHandle {
    cancelled: Arc<AtomicBool>,
    done: Receiver<Result<TrainingReport, FaceIdError>>,
}

impl TrainingHandle {
    pub fn new(
        cancelled: Arc<AtomicBool>,
        done: Receiver<Result<TrainingReport, FaceIdError>>,
    ) -> Self {
        Self { cancelled, done }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// `None` while the job is still running.
    pub fn try_result(&self) -> Option<Result<TrainingReport, FaceIdError>> {
        match self.done.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(worker_lost())),
        }
    }

    /// Blocks up to `timeout`; `None` if the job is still running.
    pub fn wait(&self, timeout: Duration) -> Option<Result<TrainingReport, FaceIdError>> {
        match self.done.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(worker_lost())),
        }
    }
}

fn worker_lost() -> FaceIdError {
    FaceIdError::Training("training worker exited without reporting".into())
}
