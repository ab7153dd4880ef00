use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the enrollment, training and identification core.
///
/// Per-tick transient failures never reach the caller as errors; they are
/// logged and the capture session moves on.
#[derive(Error, Debug)]
pub enum FaceIdError {
    #[error("identity label must be a non-negative integer, got {0:?}")]
    InvalidLabel(String),
    #[error("a capture session is already active")]
    SessionAlreadyActive,
    #[error("no face found in the current frame")]
    NoFaceFound,
    #[error("no trained model is available yet")]
    NoModelAvailable,
    #[error("corrupt dataset entry {path}: {reason}")]
    CorruptDatasetEntry { path: PathBuf, reason: String },
    #[error("training failed: {0}")]
    Training(String),
    #[error("persistence failed for {path}: {reason}")]
    Persistence { path: PathBuf, reason: String },
    #[error("training was cancelled")]
    Cancelled,
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl FaceIdError {
    pub fn persistence(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Persistence {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn corrupt_entry(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::CorruptDatasetEntry {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn category(&self) -> MessageCategory {
        match self {
            Self::InvalidLabel(_) => MessageCategory::InvalidLabel,
            Self::SessionAlreadyActive => MessageCategory::SessionAlreadyActive,
            Self::NoFaceFound => MessageCategory::NoFaceFound,
            Self::NoModelAvailable => MessageCategory::NoModelAvailable,
            Self::CorruptDatasetEntry { .. } => MessageCategory::CorruptDatasetEntry,
            Self::Training(_) => MessageCategory::TrainingFailed,
            Self::Persistence { .. } => MessageCategory::PersistenceFailed,
            Self::Cancelled => MessageCategory::Cancelled,
            Self::Config(_) => MessageCategory::InvalidConfig,
        }
    }
}

/// Stable presentation key for every outcome and error.
///
/// A UI maps each category to one message without inspecting core state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageCategory {
    CaptureCancelled,
    NothingToCancel,
    TrainingComplete,
    Matched,
    LowConfidence,
    InvalidLabel,
    SessionAlreadyActive,
    NoFaceFound,
    NoModelAvailable,
    CorruptDatasetEntry,
    TrainingFailed,
    PersistenceFailed,
    Cancelled,
    InvalidConfig,
}

impl MessageCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CaptureCancelled => "capture_cancelled",
            Self::NothingToCancel => "nothing_to_cancel",
            Self::TrainingComplete => "training_complete",
            Self::Matched => "matched",
            Self::LowConfidence => "low_confidence",
            Self::InvalidLabel => "invalid_label",
            Self::SessionAlreadyActive => "session_already_active",
            Self::NoFaceFound => "no_face_found",
            Self::NoModelAvailable => "no_model_available",
            Self::CorruptDatasetEntry => "corrupt_dataset_entry",
            Self::TrainingFailed => "training_failed",
            Self::PersistenceFailed => "persistence_failed",
            Self::Cancelled => "cancelled",
            Self::InvalidConfig => "invalid_config",
        }
    }
}

impl std::fmt::Display for MessageCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(FaceIdError::InvalidLabel(String::new()), "invalid_label")]
    #[case(FaceIdError::SessionAlreadyActive, "session_already_active")]
    #[case(FaceIdError::NoFaceFound, "no_face_found")]
    #[case(FaceIdError::NoModelAvailable, "no_model_available")]
    #[case(FaceIdError::corrupt_entry("x.png", "bad"), "corrupt_dataset_entry")]
    #[case(FaceIdError::Training("empty".into()), "training_failed")]
    #[case(FaceIdError::persistence("m.json", "denied"), "persistence_failed")]
    #[case(FaceIdError::Cancelled, "cancelled")]
    fn test_error_category_keys(#[case] err: FaceIdError, #[case] key: &str) {
        assert_eq!(err.category().as_str(), key);
    }

    #[test]
    fn test_display_includes_path() {
        let err = FaceIdError::corrupt_entry("faces/abc.1.png", "label is not a number");
        let msg = err.to_string();
        assert!(msg.contains("faces/abc.1.png"));
        assert!(msg.contains("label is not a number"));
    }
}
