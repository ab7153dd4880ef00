use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::pipeline::training_executor::{TrainingExecutor, TrainingHandle, TrainingJob};

/// Runs each training job on its own named worker thread.
///
/// The worker reports once over a bounded channel. If the handle was
/// dropped in the meantime the report is discarded.
#[derive(Default)]
pub struct ThreadedTrainingExecutor;

impl ThreadedTrainingExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl TrainingExecutor for ThreadedTrainingExecutor {
    fn submit(&self, job: TrainingJob) -> TrainingHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);

        let worker_cancelled = cancelled.clone();
        let spawned = std::thread::Builder::new()
            .name("faceid-training".into())
            .spawn(move || {
                let result = job.run(&worker_cancelled);
                match &result {
                    Ok(report) => log::info!(
                        "Training complete: {} image(s), {} label(s), {} skipped",
                        report.images,
                        report.labels,
                        report.skipped
                    ),
                    Err(e) => log::warn!("Training did not complete: {e}"),
                }
                let _ = done_tx.send(result);
            });

        // A failed spawn drops the sender, which the handle reports as a lost worker.
        if let Err(e) = spawned {
            log::error!("Could not start training worker: {e}");
        }
        TrainingHandle::new(cancelled, done_rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::dataset_builder::DatasetBuilder;
    use crate::dataset::domain::face_image_store::FaceImageStore;
    use crate::dataset::infrastructure::directory_image_store::DirectoryImageStore;
    use crate::recognition::domain::recognition_engine::RecognitionEngine;
    use crate::recognition::infrastructure::eigenface_engine::EigenfaceEngine;
    use crate::recognition::model_store::ModelStore;
    use crate::shared::config::CorruptEntryPolicy;
    use crate::shared::face_image::FaceImage;
    use crate::shared::label::IdentityLabel;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_submitted_job_reports_completion() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(DirectoryImageStore::new(tmp.path().join("faces")));
        let face = FaceImage::from_raw(4, 4, vec![120; 16]).unwrap();
        store.save(IdentityLabel::new(6), &face).unwrap();
        let engine: Arc<dyn RecognitionEngine> = Arc::new(EigenfaceEngine::new(8));
        let model_store = Arc::new(ModelStore::new(tmp.path().join("model.json"), engine.clone()));

        let handle = ThreadedTrainingExecutor::new().submit(TrainingJob {
            builder: DatasetBuilder::new(store, (4, 4), CorruptEntryPolicy::Skip),
            engine,
            model_store: model_store.clone(),
        });

        let report = handle.wait(Duration::from_secs(10)).unwrap().unwrap();
        assert_eq!(report.images, 1);
        assert!(model_store.exists());
    }
}
