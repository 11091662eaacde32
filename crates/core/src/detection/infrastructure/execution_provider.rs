use ort::execution_providers::{CPUExecutionProvider, ExecutionProviderDispatch};

/// ONNX execution providers in preference order for this platform.
///
/// Detector and extractor sessions share this list so both stages run on
/// the same device. CPU is always appended as the last resort.
pub fn preferred_execution_providers() -> Vec<ExecutionProviderDispatch> {
    let mut providers = Vec::new();
    #[cfg(target_os = "macos")]
    providers.push(ort::execution_providers::CoreMLExecutionProvider::default().build());
    #[cfg(target_os = "windows")]
    providers.push(ort::execution_providers::DirectMLExecutionProvider::default().build());
    providers.push(CPUExecutionProvider::default().build());
    providers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_is_always_available() {
        assert!(!preferred_execution_providers().is_empty());
    }
}
