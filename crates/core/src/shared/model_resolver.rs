use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::shared::constants::APP_DIR_NAME;

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("failed to create cache directory: {0}")]
    CacheDir(#[source] std::io::Error),
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write model to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("model {0} not found and downloads are disabled")]
    Missing(String),
    #[error("could not determine cache directory")]
    NoCacheDir,
}

/// Progress callback: `(bytes_downloaded, total_bytes)`.
/// `total_bytes` is 0 if the server didn't provide Content-Length.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send>;

/// Where to look for a model and whether fetching it is allowed.
pub struct ModelSource<'a> {
    pub name: &'a str,
    pub url: &'a str,
    pub bundled_dir: Option<&'a Path>,
    pub allow_download: bool,
}

/// Resolve a model file by name, checking local locations before downloading.
///
/// Resolution order:
/// 1. Bundled path (operator-provided model directory)
/// 2. User cache directory (platform-specific)
/// 3. Download from URL to cache, if allowed
pub fn resolve(
    source: &ModelSource<'_>,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    if let Some(dir) = source.bundled_dir {
        let bundled_path = dir.join(source.name);
        if bundled_path.exists() {
            return Ok(bundled_path);
        }
    }

    let cache_dir = model_cache_dir()?;
    let cached_path = cache_dir.join(source.name);
    if cached_path.exists() {
        return Ok(cached_path);
    }

    if !source.allow_download {
        return Err(ModelResolveError::Missing(source.name.to_string()));
    }

    fs::create_dir_all(&cache_dir).map_err(ModelResolveError::CacheDir)?;
    log::info!("Downloading {} from {}", source.name, source.url);
    download(source.url, &cached_path, progress)?;
    Ok(cached_path)
}

/// Platform-specific model cache directory, e.g. `~/.cache/facesign/models/`.
pub fn model_cache_dir() -> Result<PathBuf, ModelResolveError> {
    dirs::cache_dir()
        .map(|d| d.join(APP_DIR_NAME).join("models"))
        .ok_or(ModelResolveError::NoCacheDir)
}

fn download(url: &str, dest: &Path, progress: Option<ProgressFn>) -> Result<(), ModelResolveError> {
    let temp_path = dest.with_extension("part");

    let result = download_inner(url, dest, &temp_path, progress);

    // A half-written model must never be picked up by `resolve`.
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }

    result
}

fn download_inner(
    url: &str,
    dest: &Path,
    temp_path: &Path,
    progress: Option<ProgressFn>,
) -> Result<(), ModelResolveError> {
    let response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| ModelResolveError::Download {
            url: url.to_string(),
            source: e,
        })?;

    let total = response.content_length().unwrap_or(0);
    stream_to_file(response, temp_path, total, progress.as_deref())?;

    fs::rename(temp_path, dest).map_err(|e| ModelResolveError::Write {
        path: dest.to_path_buf(),
        source: e,
    })?;

    Ok(())
}

/// Copies `reader` into `path` in 1 MB chunks, reporting progress as bytes
/// arrive.
fn stream_to_file(
    mut reader: impl Read,
    path: &Path,
    total: u64,
    progress: Option<&(dyn Fn(u64, u64) + Send)>,
) -> Result<u64, ModelResolveError> {
    let write_err = |e: std::io::Error| ModelResolveError::Write {
        path: path.to_path_buf(),
        source: e,
    };
    let mut file = fs::File::create(path).map_err(write_err)?;

    let mut downloaded: u64 = 0;
    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = reader.read(&mut buf).map_err(write_err)?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).map_err(write_err)?;
        downloaded += n as u64;
        if let Some(cb) = progress {
            cb(downloaded, total);
        }
    }

    file.sync_all().map_err(write_err)?;
    Ok(downloaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_prefers_bundled_file() {
        let tmp = TempDir::new().unwrap();
        let bundled_path = tmp.path().join("test_model.onnx");
        fs::write(&bundled_path, b"bundled model").unwrap();

        let resolved = resolve(
            &ModelSource {
                name: "test_model.onnx",
                url: "http://invalid.example.com/model.onnx",
                bundled_dir: Some(tmp.path()),
                allow_download: false,
            },
            None,
        )
        .unwrap();

        assert_eq!(resolved, bundled_path);
    }

    #[test]
    fn test_resolve_without_download_reports_missing() {
        let tmp = TempDir::new().unwrap();
        let result = resolve(
            &ModelSource {
                name: "definitely-not-cached-7f3a.onnx",
                url: "http://invalid.example.com/model.onnx",
                bundled_dir: Some(tmp.path()),
                allow_download: false,
            },
            None,
        );
        assert!(matches!(result, Err(ModelResolveError::Missing(_))));
    }

    #[test]
    fn test_model_cache_dir_is_namespaced() {
        let path = model_cache_dir().unwrap();
        assert!(path.to_string_lossy().contains(APP_DIR_NAME));
        assert!(path.ends_with("models"));
    }

    #[test]
    fn test_download_invalid_url_leaves_nothing_behind() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("model.onnx");
        let result = download("http://invalid.nonexistent.example.com/model", &dest, None);
        assert!(result.is_err());
        assert!(!dest.exists());
        assert!(!dest.with_extension("part").exists());
    }

    #[test]
    fn test_stream_reports_progress_per_chunk() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("model.part");
        let body = vec![7u8; 2 * 1024 * 1024 + 10];
        let seen = std::sync::Mutex::new(Vec::new());
        let record: &(dyn Fn(u64, u64) + Send) =
            &|done, total| seen.lock().unwrap().push((done, total));

        let written =
            stream_to_file(std::io::Cursor::new(body.clone()), &path, body.len() as u64, Some(record))
                .unwrap();

        assert_eq!(written, body.len() as u64);
        assert_eq!(fs::read(&path).unwrap(), body);
        let seen = seen.into_inner().unwrap();
        assert!(seen.len() >= 3);
        assert!(seen.windows(2).all(|w| w[0].0 < w[1].0));
        assert_eq!(seen.last().copied(), Some((body.len() as u64, body.len() as u64)));
    }

    struct BrokenBody {
        sent: bool,
    }

    impl Read for BrokenBody {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.sent {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection reset",
                ));
            }
            self.sent = true;
            buf[..4].copy_from_slice(b"onnx");
            Ok(4)
        }
    }

    #[test]
    fn test_stream_error_is_a_write_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("model.part");
        let result = stream_to_file(BrokenBody { sent: false }, &path, 0, None);
        assert!(matches!(result, Err(ModelResolveError::Write { .. })));
    }
}
