use std::path::PathBuf;
use std::sync::Arc;

use crate::dataset::domain::entry_name::parse_entry_name;
use crate::dataset::domain::face_image_store::FaceImageStore;
use crate::shared::config::CorruptEntryPolicy;
use crate::shared::error::FaceIdError;
use crate::shared::face_image::FaceImage;
use crate::shared::label::IdentityLabel;

/// A store entry that was left out of the training set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedEntry {
    pub path: PathBuf,
    pub reason: String,
}

/// Training set assembled from the image store.
///
/// `images[i]` belongs to `labels[i]`. Entries are ordered by label, then
/// by sequence number.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dataset {
    pub images: Vec<FaceImage>,
    pub labels: Vec<IdentityLabel>,
    pub skipped: Vec<SkippedEntry>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Number of distinct labels.
    pub fn identity_count(&self) -> usize {
        let mut labels = self.labels.clone();
        labels.dedup();
        labels.len()
    }
}

/// Rebuilds the full training set from every stored image.
pub struct DatasetBuilder {
    store: Arc<dyn FaceImageStore>,
    face_size: (u32, u32),
    policy: CorruptEntryPolicy,
}

impl DatasetBuilder {
    pub fn new(
        store: Arc<dyn FaceImageStore>,
        face_size: (u32, u32),
        policy: CorruptEntryPolicy,
    ) -> Self {
        Self {
            store,
            face_size,
            policy,
        }
    }

    pub fn build(&self) -> Result<Dataset, FaceIdError> {
        let mut parsed = Vec::new();
        let mut dataset = Dataset::default();

        for key in self.store.keys()? {
            match parse_entry_name(&key) {
                Ok((label, sequence)) => parsed.push((label, sequence, key)),
                Err(reason) => self.reject(&mut dataset, self.store.locate(&key), reason)?,
            }
        }
        // Keys with the same (label, sequence) but different extensions fall
        // back to name order.
        parsed.sort();

        for (label, _, key) in parsed {
            match self.load_checked(&key) {
                Ok(face) => {
                    dataset.images.push(face);
                    dataset.labels.push(label);
                }
                Err(reason) => self.reject(&mut dataset, self.store.locate(&key), reason)?,
            }
        }

        log::info!(
            "Built dataset: {} image(s), {} label(s), {} skipped",
            dataset.len(),
            dataset.identity_count(),
            dataset.skipped.len()
        );
        Ok(dataset)
    }

    fn load_checked(&self, key: &str) -> Result<FaceImage, String> {
        let face = self.store.load(key).map_err(|e| match e {
            FaceIdError::CorruptDatasetEntry { reason, .. } => reason,
            other => other.to_string(),
        })?;
        if face.dimensions() != self.face_size {
            let (w, h) = face.dimensions();
            return Err(format!(
                "image is {w}x{h}, expected {}x{}",
                self.face_size.0, self.face_size.1
            ));
        }
        Ok(face)
    }

    fn reject(
        &self,
        dataset: &mut Dataset,
        path: PathBuf,
        reason: String,
    ) -> Result<(), FaceIdError> {
        match self.policy {
            CorruptEntryPolicy::Abort => Err(FaceIdError::corrupt_entry(path, reason)),
            CorruptEntryPolicy::Skip => {
                log::warn!("Skipping dataset entry {}: {reason}", path.display());
                dataset.skipped.push(SkippedEntry { path, reason });
                Ok(())
            }
        }
    }
}
