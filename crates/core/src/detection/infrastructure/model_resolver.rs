use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("model file not found: {0}")]
    Missing(PathBuf),
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
    #[error("could not determine cache directory")]
    NoCacheDir,
}

/// Progress callback: `(bytes_downloaded, total_bytes)`.
/// `total_bytes` is 0 if the server didn't provide Content-Length.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send>;

/// Where to look for the detector model before falling back to a download.
#[derive(Clone, Debug, Default)]
pub struct ModelLocation {
    /// A user-supplied model path. When set, it is the only candidate.
    pub explicit: Option<PathBuf>,
    /// Directory shipped next to the binary (development checkouts).
    pub bundled_dir: Option<PathBuf>,
}

/// Resolve a model file by name.
///
/// Resolution order:
/// 1. Explicit path (must exist, never downloaded over)
/// 2. User cache directory (platform-specific)
/// 3. Bundled directory
/// 4. Download from URL to cache
pub fn resolve(
    name: &str,
    url: &str,
    location: &ModelLocation,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    if let Some(path) = &location.explicit {
        return if path.is_file() {
            Ok(path.clone())
        } else {
            Err(ModelResolveError::Missing(path.clone()))
        };
    }
    let cache_dir = model_cache_dir()?;
    resolve_in(
        &cache_dir,
        name,
        url,
        location.bundled_dir.as_deref(),
        progress,
    )
}

fn resolve_in(
    cache_dir: &Path,
    name: &str,
    url: &str,
    bundled_dir: Option<&Path>,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    let cached_path = cache_dir.join(name);
    if cached_path.exists() {
        return Ok(cached_path);
    }

    if let Some(dir) = bundled_dir {
        let bundled_path = dir.join(name);
        if bundled_path.exists() {
            return Ok(bundled_path);
        }
    }

    log::info!("Model {name} not cached, downloading from {url}");
    fs::create_dir_all(cache_dir).map_err(ModelResolveError::CacheDir)?;
    download(url, &cached_path, progress)?;
    Ok(cached_path)
}

/// Platform-specific model cache directory.
///
/// - macOS: `~/Library/Application Support/Facecam/models/`
/// - Linux: `$XDG_CACHE_HOME/Facecam/models/` or `~/.cache/Facecam/models/`
/// - Windows: `%LOCALAPPDATA%/Facecam/models/`
pub fn model_cache_dir() -> Result<PathBuf, ModelResolveError> {
    #[cfg(target_os = "macos")]
    {
        dirs::data_dir()
            .map(|d| d.join("Facecam").join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
    #[cfg(not(target_os = "macos"))]
    {
        dirs::cache_dir()
            .map(|d| d.join("Facecam").join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
}

fn download(url: &str, dest: &Path, progress: Option<ProgressFn>) -> Result<(), ModelResolveError> {
    let temp_path = dest.with_extension("part");

    let result = download_inner(url, dest, &temp_path, progress);

    // Never leave a half-written .part behind.
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
    let mut downloaded: u64 = 0;

    let mut file = fs::File::create(temp_path).map_err(write_error(temp_path))?;

    let mut reader = response;
    let mut buf = vec![0u8; 256 * 1024];
    loop {
        let n = reader.read(&mut buf).map_err(write_error(temp_path))?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).map_err(write_error(temp_path))?;
        downloaded += n as u64;
        if let Some(ref cb) = progress {
            cb(downloaded, total);
        }
    }

    file.flush().map_err(write_error(temp_path))?;
    drop(file);

    fs::rename(temp_path, dest).map_err(write_error(dest))?;

    Ok(())
}

fn write_error(path: &Path) -> impl FnOnce(std::io::Error) -> ModelResolveError {
    let path = path.to_path_buf();
    move |source| ModelResolveError::Write { path, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const UNREACHABLE_URL: &str = "http://invalid.nonexistent.example.com/model.bin";

    #[test]
    fn test_explicit_path_is_returned_as_is() {
        let tmp = TempDir::new().unwrap();
        let model = tmp.path().join("custom.bin");
        fs::write(&model, b"model").unwrap();

        let location = ModelLocation {
            explicit: Some(model.clone()),
            bundled_dir: None,
        };
        let resolved = resolve("ignored.bin", UNREACHABLE_URL, &location, None).unwrap();
        assert_eq!(resolved, model);
    }

    #[test]
    fn test_missing_explicit_path_is_an_error() {
        let location = ModelLocation {
            explicit: Some(PathBuf::from("/nonexistent/model.bin")),
            bundled_dir: None,
        };
        let err = resolve("model.bin", UNREACHABLE_URL, &location, None).unwrap_err();
        assert!(matches!(err, ModelResolveError::Missing(_)));
    }

    #[test]
    fn test_resolve_prefers_cached_file() {
        let tmp = TempDir::new().unwrap();
        let cache = tmp.path().join("cache");
        let bundled = tmp.path().join("bundled");
        fs::create_dir_all(&cache).unwrap();
        fs::create_dir_all(&bundled).unwrap();
        fs::write(cache.join("m.bin"), b"cached").unwrap();
        fs::write(bundled.join("m.bin"), b"bundled").unwrap();

        let resolved = resolve_in(&cache, "m.bin", UNREACHABLE_URL, Some(&bundled), None).unwrap();
        assert_eq!(resolved, cache.join("m.bin"));
    }

    #[test]
    fn test_resolve_falls_back_to_bundled() {
        let tmp = TempDir::new().unwrap();
        let cache = tmp.path().join("cache");
        let bundled = tmp.path().join("bundled");
        fs::create_dir_all(&bundled).unwrap();
        fs::write(bundled.join("m.bin"), b"bundled").unwrap();

        let resolved = resolve_in(&cache, "m.bin", UNREACHABLE_URL, Some(&bundled), None).unwrap();
        assert_eq!(resolved, bundled.join("m.bin"));
    }

    #[test]
    fn test_model_cache_dir_returns_path() {
        let path = model_cache_dir().unwrap();
        assert!(path.to_string_lossy().contains("Facecam"));
        assert!(path.ends_with("models"));
    }

    #[test]
    fn test_download_invalid_url_returns_error() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("model.bin");
        let result = download(UNREACHABLE_URL, &dest, None);
        assert!(matches!(result, Err(ModelResolveError::Download { .. })));
    }

    #[test]
    fn test_download_atomic_no_partial_on_failure() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("model.bin");
        let _ = download(UNREACHABLE_URL, &dest, None);
        assert!(!dest.exists());
        assert!(!dest.with_extension("part").exists());
    }
}
