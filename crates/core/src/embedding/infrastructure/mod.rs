pub mod histogram_extractor;
pub mod onnx_arcface_extractor;
