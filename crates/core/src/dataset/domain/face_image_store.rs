use std::path::PathBuf;

use crate::shared::error::FaceIdError;
use crate::shared::face_image::FaceImage;
use crate::shared::label::IdentityLabel;

/// Persistent home of enrolled face images.
///
/// Entries are addressed by key (a file name). Keys encode the owning
/// label, see [`super::entry_name`].
pub trait FaceImageStore: Send + Sync {
    /// Stores `face` under the next free sequence number for `label` and
    /// returns its key. Existing entries are never overwritten.
    fn save(&self, label: IdentityLabel, face: &FaceImage) -> Result<String, FaceIdError>;

    /// Every image key currently stored, in a stable order. An empty or
    /// absent store yields an empty list.
    fn keys(&self) -> Result<Vec<String>, FaceIdError>;

    /// Decodes the image behind `key` as grayscale.
    fn load(&self, key: &str) -> Result<FaceImage, FaceIdError>;

    fn remove(&self, key: &str) -> Result<(), FaceIdError>;

    /// Where `key` lives, for diagnostics.
    fn locate(&self, key: &str) -> PathBuf;
}
