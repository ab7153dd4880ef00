pub const FACE_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const FACE_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

pub const APP_DIR_NAME: &str = "faceid";
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const MODEL_FILE_NAME: &str = "training_data.json";
pub const FACES_DIR_NAME: &str = "faces";

/// Extension used when the capture loop stores normalized faces.
pub const STORED_IMAGE_EXTENSION: &str = "png";

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];

pub const DEFAULT_FACE_WIDTH: u32 = 128;
pub const DEFAULT_FACE_HEIGHT: u32 = 150;

pub const DEFAULT_TICK_INTERVAL_MS: u64 = 500;
/// 30 ticks at 500 ms is a ~15 second capture burst.
pub const DEFAULT_TICK_LIMIT: u32 = 30;

pub const DEFAULT_NUM_COMPONENTS: usize = 80;
