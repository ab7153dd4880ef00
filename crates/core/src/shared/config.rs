use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::constants::{
    APP_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_FACE_HEIGHT, DEFAULT_FACE_WIDTH,
    DEFAULT_NUM_COMPONENTS, DEFAULT_TICK_INTERVAL_MS, DEFAULT_TICK_LIMIT, FACES_DIR_NAME,
    MODEL_FILE_NAME,
};
use super::error::FaceIdError;

/// What the dataset builder does with a stored image it cannot use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CorruptEntryPolicy {
    /// Log, record the entry as skipped and keep building.
    #[default]
    Skip,
    /// Fail the whole build on the first corrupt entry.
    Abort,
}

/// Face locator tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorParams {
    /// The frame is shrunk by this factor before detection (>= 1.0).
    pub scale_factor: f64,
    /// Overlapping raw candidates a detection needs before it is reported.
    pub min_neighbors: u32,
    /// Minimum candidate score (0.0-1.0).
    pub confidence: f64,
    /// ONNX face model; resolved from the user cache when unset.
    pub model_path: Option<PathBuf>,
}

impl Default for LocatorParams {
    fn default() -> Self {
        Self {
            scale_factor: 1.3,
            min_neighbors: 2,
            confidence: 0.5,
            model_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceIdConfig {
    pub camera_index: u32,
    /// Explicit device or video file; takes precedence over `camera_index`.
    pub source: Option<PathBuf>,
    pub locator: LocatorParams,
    pub tick_interval_ms: u64,
    pub tick_limit: u32,
    pub face_width: u32,
    pub face_height: u32,
    pub model_path: PathBuf,
    pub image_store_dir: PathBuf,
    /// Predictions farther than this are reported as low confidence.
    pub max_distance: Option<f64>,
    pub num_components: usize,
    pub corrupt_entry_policy: CorruptEntryPolicy,
}

impl Default for FaceIdConfig {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            camera_index: 0,
            source: None,
            locator: LocatorParams::default(),
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            tick_limit: DEFAULT_TICK_LIMIT,
            face_width: DEFAULT_FACE_WIDTH,
            face_height: DEFAULT_FACE_HEIGHT,
            model_path: data_dir.join(MODEL_FILE_NAME),
            image_store_dir: data_dir.join(FACES_DIR_NAME),
            max_distance: None,
            num_components: DEFAULT_NUM_COMPONENTS,
            corrupt_entry_policy: CorruptEntryPolicy::default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(APP_DIR_NAME))
}

impl FaceIdConfig {
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from `path`, or from the default location.
    ///
    /// An explicit path must exist. A missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, FaceIdError> {
        let config = match path {
            Some(p) => Self::read(p)?,
            None => match Self::default_config_path() {
                Some(p) if p.exists() => Self::read(&p)?,
                _ => Self::default(),
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self, FaceIdError> {
        let json = fs::read_to_string(path)
            .map_err(|e| FaceIdError::Config(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&json)
            .map_err(|e| FaceIdError::Config(format!("{}: {e}", path.display())))
    }

    pub fn validate(&self) -> Result<(), FaceIdError> {
        if self.tick_interval_ms == 0 {
            return Err(FaceIdError::Config("tick_interval_ms must be positive".into()));
        }
        if self.tick_limit == 0 {
            return Err(FaceIdError::Config("tick_limit must be positive".into()));
        }
        if self.face_width == 0 || self.face_height == 0 {
            return Err(FaceIdError::Config(format!(
                "face size must be positive, got {}x{}",
                self.face_width, self.face_height
            )));
        }
        if self.locator.scale_factor.is_nan() || self.locator.scale_factor < 1.0 {
            return Err(FaceIdError::Config(format!(
                "locator.scale_factor must be at least 1.0, got {}",
                self.locator.scale_factor
            )));
        }
        if !(0.0..=1.0).contains(&self.locator.confidence) {
            return Err(FaceIdError::Config(format!(
                "locator.confidence must be between 0.0 and 1.0, got {}",
                self.locator.confidence
            )));
        }
        if let Some(d) = self.max_distance {
            if d.is_nan() || d < 0.0 {
                return Err(FaceIdError::Config(format!(
                    "max_distance must be non-negative, got {d}"
                )));
            }
        }
        if self.num_components == 0 {
            return Err(FaceIdError::Config("num_components must be positive".into()));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn face_size(&self) -> (u32, u32) {
        (self.face_width, self.face_height)
    }
}
