pub const YOLO_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const YOLO_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

pub const EMBEDDING_MODEL_NAME: &str = "w600k_r50.onnx";
pub const EMBEDDING_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/w600k_r50.onnx";

/// MIME types accepted for probe and enrollment images.
pub const SUPPORTED_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp", "image/bmp"];

/// Application directory name under the platform data/cache dirs.
pub const APP_DIR_NAME: &str = "facesign";

pub const TEMPLATES_DIR_NAME: &str = "templates";
pub const JOURNAL_FILE_NAME: &str = "signatures.journal";
