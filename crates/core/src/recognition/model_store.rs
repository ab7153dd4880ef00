use std::fs;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use tempfile::NamedTempFile;

use crate::recognition::domain::recognition_engine::{RecognitionEngine, RecognitionModel};
use crate::shared::error::FaceIdError;

/// The single persisted model file.
///
/// Saves go to a temporary file next to the target and are renamed over it,
/// so readers see either the old model or the new one, never a partial write.
pub struct ModelStore {
    path: PathBuf,
    engine: Arc<dyn RecognitionEngine>,
    lock: RwLock<()>,
}

impl ModelStore {
    pub fn new(path: impl Into<PathBuf>, engine: Arc<dyn RecognitionEngine>) -> Self {
        Self {
            path: path.into(),
            engine,
            lock: RwLock::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Modification time of the model file, if it exists.
    pub fn modified(&self) -> Option<SystemTime> {
        fs::metadata(&self.path).and_then(|m| m.modified()).ok()
    }

    pub fn save(&self, model: &dyn RecognitionModel) -> Result<(), FaceIdError> {
        let _guard = self.lock.write().unwrap_or_else(|e| e.into_inner());
        self.write_model(model)
    }

    /// Like [`save`](Self::save), but checks `cancelled` once the write lock
    /// is held and leaves the file untouched if it is set.
    pub fn save_unless_cancelled(
        &self,
        model: &dyn RecognitionModel,
        cancelled: &AtomicBool,
    ) -> Result<(), FaceIdError> {
        let _guard = self.lock.write().unwrap_or_else(|e| e.into_inner());
        if cancelled.load(Ordering::SeqCst) {
            return Err(FaceIdError::Cancelled);
        }
        self.write_model(model)
    }

    /// Returns once no save is in progress.
    pub fn wait_for_writers(&self) {
        drop(self.lock.write().unwrap_or_else(|e| e.into_inner()));
    }

    fn write_model(&self, model: &dyn RecognitionModel) -> Result<(), FaceIdError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| FaceIdError::persistence(&self.path, e))?;

        let temp =
            NamedTempFile::new_in(&dir).map_err(|e| FaceIdError::persistence(&self.path, e))?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            model
                .write_to(&mut writer)
                .map_err(|e| FaceIdError::persistence(&self.path, e))?;
            writer.flush().map_err(|e| FaceIdError::persistence(&self.path, e))?;
        }
        temp.as_file()
            .sync_all()
            .map_err(|e| FaceIdError::persistence(&self.path, e))?;
        temp.persist(&self.path)
            .map_err(|e| FaceIdError::persistence(&self.path, e.error))?;

        log::info!("Saved model to {}", self.path.display());
        Ok(())
    }

    /// Fails with `NoModelAvailable` when no model was ever saved.
    pub fn load(&self) -> Result<Box<dyn RecognitionModel>, FaceIdError> {
        let _guard = self.lock.read().unwrap_or_else(|e| e.into_inner());
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(FaceIdError::NoModelAvailable)
            }
            Err(e) => return Err(FaceIdError::persistence(&self.path, e)),
        };
        let mut reader = BufReader::new(file);
        self.engine
            .read_model(&mut reader)
            .map_err(|e| FaceIdError::persistence(&self.path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::infrastructure::eigenface_engine::EigenfaceEngine;
    use crate::shared::face_image::FaceImage;
    use crate::shared::label::IdentityLabel;
    use tempfile::TempDir;

    fn trained(engine: &EigenfaceEngine, label: u32) -> Box<dyn RecognitionModel> {
        let faces = [
            FaceImage::from_raw(3, 3, vec![10; 9]).unwrap(),
            FaceImage::from_raw(3, 3, vec![200; 9]).unwrap(),
        ];
        let labels = [IdentityLabel::new(label), IdentityLabel::new(label + 1)];
        engine.train(&faces, &labels).unwrap()
    }

    fn store_in(dir: &Path) -> ModelStore {
        ModelStore::new(dir.join("models").join("model.json"), Arc::new(EigenfaceEngine::new(8)))
    }

    #[test]
    fn test_load_before_save_is_no_model() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(tmp.path());
        assert!(!store.exists());
        assert!(store.modified().is_none());
        assert!(matches!(store.load(), Err(FaceIdError::NoModelAvailable)));
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(tmp.path());
        let model = trained(&EigenfaceEngine::new(8), 4);

        store.save(model.as_ref()).unwrap();
        assert!(store.exists());
        assert!(store.modified().is_some());

        let loaded = store.load().unwrap();
        let probe = FaceImage::from_raw(3, 3, vec![190; 9]).unwrap();
        assert_eq!(loaded.predict(&probe).unwrap().label, IdentityLabel::new(5));
    }

    #[test]
    fn test_save_replaces_previous_model_without_leftovers() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(tmp.path());
        let engine = EigenfaceEngine::new(8);

        store.save(trained(&engine, 1).as_ref()).unwrap();
        store.save(trained(&engine, 7).as_ref()).unwrap();

        let probe = FaceImage::from_raw(3, 3, vec![15; 9]).unwrap();
        assert_eq!(store.load().unwrap().predict(&probe).unwrap().label, IdentityLabel::new(7));
        let files = fs::read_dir(tmp.path().join("models")).unwrap().count();
        assert_eq!(files, 1);
    }

    #[test]
    fn test_cancelled_save_keeps_previous_model() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(tmp.path());
        let engine = EigenfaceEngine::new(8);
        store.save(trained(&engine, 1).as_ref()).unwrap();
        let before = fs::read(store.path()).unwrap();

        let cancelled = AtomicBool::new(true);
        let result = store.save_unless_cancelled(trained(&engine, 7).as_ref(), &cancelled);

        assert!(matches!(result, Err(FaceIdError::Cancelled)));
        assert_eq!(fs::read(store.path()).unwrap(), before);
        assert_eq!(fs::read_dir(tmp.path().join("models")).unwrap().count(), 1);
    }

    #[test]
    fn test_uncancelled_save_writes_model() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(tmp.path());
        let cancelled = AtomicBool::new(false);

        store
            .save_unless_cancelled(trained(&EigenfaceEngine::new(8), 2).as_ref(), &cancelled)
            .unwrap();
        store.wait_for_writers();

        assert!(store.exists());
    }

    #[test]
    fn test_corrupt_model_file_is_persistence_error() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(tmp.path());
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), b"{ truncated").unwrap();

        assert!(matches!(store.load(), Err(FaceIdError::Persistence { .. })));
    }
}
