//! Process-wide texture cache.
//!
//! Images are decoded once per absolute path and requested size and kept
//! for the lifetime of the process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use image::imageops::FilterType;
use image::DynamicImage;
use tracing::debug;

use crate::{DddError, Result};

type Key = (PathBuf, Option<(u32, u32)>);

fn cache() -> &'static Mutex<HashMap<Key, Arc<DynamicImage>>> {
    static CACHE: OnceLock<Mutex<HashMap<Key, Arc<DynamicImage>>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

fn missing(path: &Path, message: impl ToString) -> DddError {
    DddError::MissingResource {
        resource: path.display().to_string(),
        message: message.to_string(),
    }
}

/// Loads the image at `path`, resized to `size` when given.
///
/// Returns [`DddError::MissingResource`] when the file cannot be read or
/// decoded; callers usually downgrade this to a warning.
pub fn load(path: impl AsRef<Path>, size: Option<(u32, u32)>) -> Result<Arc<DynamicImage>> {
    let path = path.as_ref();
    let abs = std::path::absolute(path).map_err(|e| missing(path, e))?;
    let key = (abs, size);

    if let Some(img) = cache().lock().ok().and_then(|c| c.get(&key).cloned()) {
        return Ok(img);
    }

    debug!(path = %key.0.display(), ?size, "loading texture");
    let mut img = image::open(&key.0).map_err(|e| missing(path, e))?;
    if let Some((w, h)) = size {
        img = img.resize_exact(w, h, FilterType::Triangle);
    }
    let img = Arc::new(img);
    if let Ok(mut c) = cache().lock() {
        c.entry(key).or_insert_with(|| img.clone());
    }
    Ok(img)
}

/// Number of cached images.
pub fn cached() -> usize {
    cache().lock().map(|c| c.len()).unwrap_or(0)
}

/// PNG encoding of `img`.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>> {
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png)
        .map_err(|e| DddError::Serialization(e.to_string()))?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_loads_once_per_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checker.png");
        let img = RgbaImage::from_fn(8, 8, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        });
        img.save(&path).unwrap();

        let a = load(&path, None).unwrap();
        let b = load(&path, None).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        let small = load(&path, Some((4, 4))).unwrap();
        assert_eq!((small.width(), small.height()), (4, 4));
        assert!(!Arc::ptr_eq(&a, &small));
        assert!(cached() >= 2);
        assert!(!encode_png(&small).unwrap().is_empty());
    }

    #[test]
    fn test_missing_file_is_resource_error() {
        let err = load("/nonexistent/texture.png", None).unwrap_err();
        assert!(matches!(err, DddError::MissingResource { .. }));
    }
}
