use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::dataset::domain::entry_name::{format_entry_name, parse_entry_name};
use crate::dataset::domain::face_image_store::FaceImageStore;
use crate::shared::constants::{IMAGE_EXTENSIONS, STORED_IMAGE_EXTENSION};
use crate::shared::error::FaceIdError;
use crate::shared::face_image::FaceImage;
use crate::shared::label::IdentityLabel;

/// Stores faces as PNG files in one flat directory.
///
/// The directory is created on first save. Sequence numbers continue from
/// the highest one already on disk for the label, so repeated enrollments
/// of the same person accumulate images.
pub struct DirectoryImageStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl DirectoryImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn next_sequence(&self, label: IdentityLabel) -> Result<u32, FaceIdError> {
        let highest = self
            .keys()?
            .iter()
            .filter_map(|key| parse_entry_name(key).ok())
            .filter(|(l, _)| *l == label)
            .map(|(_, seq)| seq)
            .max();
        Ok(highest.map_or(1, |seq| seq.saturating_add(1)))
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl FaceImageStore for DirectoryImageStore {
    fn save(&self, label: IdentityLabel, face: &FaceImage) -> Result<String, FaceIdError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        fs::create_dir_all(&self.dir).map_err(|e| FaceIdError::persistence(&self.dir, e))?;
        let sequence = self.next_sequence(label)?;
        let key = format_entry_name(label, sequence, STORED_IMAGE_EXTENSION);
        let path = self.dir.join(&key);

        face.as_gray()
            .save(&path)
            .map_err(|e| FaceIdError::persistence(&path, e))?;
        log::debug!("Stored face {}", path.display());
        Ok(key)
    }

    fn keys(&self) -> Result<Vec<String>, FaceIdError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(FaceIdError::persistence(&self.dir, e)),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| FaceIdError::persistence(&self.dir, e))?;
            let path = entry.path();
            if !path.is_file() || !has_image_extension(&path) {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                keys.push(name.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn load(&self, key: &str) -> Result<FaceImage, FaceIdError> {
        let path = self.locate(key);
        let img = image::open(&path).map_err(|e| FaceIdError::corrupt_entry(&path, e))?;
        Ok(FaceImage::new(img.to_luma8()))
    }

    fn remove(&self, key: &str) -> Result<(), FaceIdError> {
        let path = self.locate(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FaceIdError::persistence(&path, e)),
        }
    }

    fn locate(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn face(value: u8) -> FaceImage {
        FaceImage::from_raw(4, 5, vec![value; 20]).unwrap()
    }

    #[test]
    fn test_missing_directory_lists_nothing() {
        let tmp = TempDir::new().unwrap();
        let store = DirectoryImageStore::new(tmp.path().join("absent"));
        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn test_save_creates_directory_and_numbers_from_one() {
        let tmp = TempDir::new().unwrap();
        let store = DirectoryImageStore::new(tmp.path().join("faces"));

        let first = store.save(IdentityLabel::new(3), &face(10)).unwrap();
        let second = store.save(IdentityLabel::new(3), &face(20)).unwrap();
        let other = store.save(IdentityLabel::new(4), &face(30)).unwrap();

        assert_eq!(first, "3.1.png");
        assert_eq!(second, "3.2.png");
        assert_eq!(other, "4.1.png");
        assert!(store.dir().join("3.2.png").is_file());
    }

    #[test]
    fn test_sequence_continues_after_existing_files() {
        let tmp = TempDir::new().unwrap();
        let store = DirectoryImageStore::new(tmp.path());
        face(0).as_gray().save(tmp.path().join("5.9.png")).unwrap();

        let key = store.save(IdentityLabel::new(5), &face(1)).unwrap();
        assert_eq!(key, "5.10.png");
    }

    #[test]
    fn test_load_returns_saved_pixels() {
        let tmp = TempDir::new().unwrap();
        let store = DirectoryImageStore::new(tmp.path());
        let key = store.save(IdentityLabel::new(1), &face(77)).unwrap();

        let loaded = store.load(&key).unwrap();
        assert_eq!(loaded, face(77));
    }

    #[test]
    fn test_load_undecodable_file_is_corrupt_entry() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("1.1.png"), b"not an image").unwrap();
        let store = DirectoryImageStore::new(tmp.path());

        let result = store.load("1.1.png");
        assert!(matches!(result, Err(FaceIdError::CorruptDatasetEntry { .. })));
    }

    #[test]
    fn test_keys_ignore_non_images_and_directories() {
        let tmp = TempDir::new().unwrap();
        let store = DirectoryImageStore::new(tmp.path());
        store.save(IdentityLabel::new(2), &face(1)).unwrap();
        fs::write(tmp.path().join("notes.txt"), b"hi").unwrap();
        fs::create_dir(tmp.path().join("9.9.png")).unwrap();

        assert_eq!(store.keys().unwrap(), vec!["2.1.png".to_string()]);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = DirectoryImageStore::new(tmp.path());
        let key = store.save(IdentityLabel::new(1), &face(1)).unwrap();

        store.remove(&key).unwrap();
        store.remove(&key).unwrap();
        assert!(store.keys().unwrap().is_empty());
    }
}
