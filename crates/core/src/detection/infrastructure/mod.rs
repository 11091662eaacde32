pub mod execution_provider;
pub mod full_frame_detector;
pub mod onnx_yolo_detector;
