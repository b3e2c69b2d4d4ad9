/// Image handling utilities
///
/// This module loads keyboard photos from disk, detects their format,
/// fingerprints them and finds candidate images in directories.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::Engine;
use log::{debug, warn};
use regex::Regex;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

/// Image container formats the recognition engine can read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Bmp,
    Tiff,
    Webp,
    /// Unknown format
    Unknown,
}

impl ImageFormat {
    /// MIME type used in data URLs
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Bmp => "image/bmp",
            ImageFormat::Tiff => "image/tiff",
            ImageFormat::Webp => "image/webp",
            ImageFormat::Unknown => "application/octet-stream",
        }
    }

    fn from_extension(ext: &str) -> ImageFormat {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => ImageFormat::Jpeg,
            "png" => ImageFormat::Png,
            "bmp" => ImageFormat::Bmp,
            "tif" | "tiff" => ImageFormat::Tiff,
            "webp" => ImageFormat::Webp,
            _ => ImageFormat::Unknown,
        }
    }

    /// Identify the format from file signatures (magic numbers)
    fn from_magic(bytes: &[u8]) -> ImageFormat {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            ImageFormat::Jpeg
        } else if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
            ImageFormat::Png
        } else if bytes.starts_with(b"BM") {
            ImageFormat::Bmp
        } else if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
            ImageFormat::Tiff
        } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            ImageFormat::Webp
        } else {
            ImageFormat::Unknown
        }
    }
}

/// A keyboard photo held in memory
#[derive(Debug, Clone)]
pub struct KeyboardImage {
    /// Where the image was read from
    pub path: PathBuf,
    /// Raw encoded bytes
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
    /// Hex SHA-256 of `bytes`
    pub sha256: String,
}

impl KeyboardImage {
    /// Wrap bytes that did not come from a file
    pub fn from_bytes(name: &str, bytes: Vec<u8>) -> Self {
        let format = ImageFormat::from_magic(&bytes);
        let sha256 = fingerprint(&bytes);
        Self {
            path: PathBuf::from(name),
            bytes,
            format,
            sha256,
        }
    }

    /// Display name for reports
    pub fn name(&self) -> String {
        self.path.to_string_lossy().to_string()
    }

    /// Encode the image as a `data:` URL
    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.format.mime_type(),
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

/// Read an image from disk.
///
/// The format is taken from the file signature first and falls back to the
/// extension when the signature is not recognized.
pub fn load_image(path: &Path) -> Result<KeyboardImage> {
    let bytes = fs::read(path)
        .with_context(|| format!("Failed to read image: {}", path.display()))?;

    let mut format = ImageFormat::from_magic(&bytes);
    if format == ImageFormat::Unknown {
        format = path
            .extension()
            .map(|ext| ImageFormat::from_extension(&ext.to_string_lossy()))
            .unwrap_or(ImageFormat::Unknown);
    }
    if format == ImageFormat::Unknown {
        warn!("Could not determine image format of {}", path.display());
    }

    let sha256 = fingerprint(&bytes);
    debug!("Loaded {} ({} bytes, {:?}, sha256 {})", path.display(), bytes.len(), format, sha256);

    Ok(KeyboardImage {
        path: path.to_path_buf(),
        bytes,
        format,
        sha256,
    })
}

/// Hex SHA-256 digest of a byte buffer
pub fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Check whether a path has a known image extension
pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ImageFormat::from_extension(&ext.to_string_lossy()) != ImageFormat::Unknown)
        .unwrap_or(false)
}

/// Translate a glob pattern (`*`, `?`) into an anchored regex
pub fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let escaped = regex::escape(pattern)
        .replace(r"\*", ".*")
        .replace(r"\?", ".");
    Regex::new(&format!("^{}$", escaped))
        .with_context(|| format!("Invalid glob pattern: {}", pattern))
}

/// Recursively collect image files under `dir`.
///
/// Filters are matched against the file name. An empty `include` list
/// accepts every image.
pub fn collect_images(
    dir: &Path,
    include: &[String],
    exclude: &[String],
    max_files: usize,
    max_size_bytes: u64,
) -> Result<Vec<PathBuf>> {
    let include = include.iter().map(|p| glob_to_regex(p)).collect::<Result<Vec<_>>>()?;
    let exclude = exclude.iter().map(|p| glob_to_regex(p)).collect::<Result<Vec<_>>>()?;

    let mut images = Vec::new();
    for entry in WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if images.len() >= max_files {
            warn!("Reached maximum file limit ({})", max_files);
            break;
        }

        let path = entry.path();
        if !path.is_file() || !has_image_extension(path) {
            continue;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let included = include.is_empty() || include.iter().any(|re| re.is_match(&file_name));
        let excluded = exclude.iter().any(|re| re.is_match(&file_name));
        if !included || excluded {
            continue;
        }

        match path.metadata() {
            Ok(metadata) if metadata.len() > max_size_bytes => {
                warn!(
                    "Skipping {}: exceeds maximum file size ({:.2} MB)",
                    path.display(),
                    metadata.len() as f64 / 1024.0 / 1024.0
                );
            }
            Ok(_) => images.push(path.to_path_buf()),
            Err(e) => warn!("Error reading metadata for {}: {}", path.display(), e),
        }
    }

    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn test_format_from_magic() {
        assert_eq!(ImageFormat::from_magic(&PNG_HEADER), ImageFormat::Png);
        assert_eq!(ImageFormat::from_magic(&[0xFF, 0xD8, 0xFF, 0xE0]), ImageFormat::Jpeg);
        assert_eq!(ImageFormat::from_magic(b"RIFF\0\0\0\0WEBPVP8 "), ImageFormat::Webp);
        assert_eq!(ImageFormat::from_magic(b"hello"), ImageFormat::Unknown);
    }

    #[test]
    fn test_data_url() {
        let image = KeyboardImage::from_bytes("mem.png", PNG_HEADER.to_vec());
        assert_eq!(image.to_data_url(), "data:image/png;base64,iVBORw0KGgo=");
    }

    #[test]
    fn test_fingerprint_of_empty_input() {
        assert_eq!(
            fingerprint(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_glob_to_regex_escapes_literals() {
        let re = glob_to_regex("key*.jpg").unwrap();
        assert!(re.is_match("keyboard.jpg"));
        assert!(!re.is_match("keyboardXjpg"));
        assert!(!re.is_match("my-keyboard.jpg"));
    }

    #[test]
    fn test_load_image_uses_extension_as_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.jpeg");
        std::fs::write(&path, b"not really a jpeg").unwrap();

        let image = load_image(&path).unwrap();
        assert_eq!(image.format, ImageFormat::Jpeg);
        assert_eq!(image.bytes.len(), 17);
    }

    #[test]
    fn test_collect_images_filters() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("a.png"), PNG_HEADER).unwrap();
        std::fs::write(dir.path().join("nested/b.jpg"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        std::fs::write(dir.path().join("skip_me.png"), PNG_HEADER).unwrap();

        let found = collect_images(dir.path(), &[], &["skip_*".to_string()], 100, 1024).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.png", "b.jpg"]);

        let limited = collect_images(dir.path(), &[], &[], 1, 1024).unwrap();
        assert_eq!(limited.len(), 1);
    }
}
