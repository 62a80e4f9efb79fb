//! Avatar sourcing and upload deduplication.
//!
//! A manifest names an avatar as a local path, an `http(s)` URL or a
//! `data:` URL. The candidate is materialized to raster bytes, then
//! fingerprinted against the currently stored reference (byte size, MIME
//! type, basename containment) to decide whether an upload is needed at
//! all. The fingerprint carries no content hash; identical re-encodes can
//! slip past it, which is accepted behavior.
//!
//! Vector input needs rasterization, which is an external concern behind
//! the [`Rasterizer`] seam; no converter is bundled.

use crate::error::{SyncError, SyncResult};
use base64::Engine;
use mxsync_client::{MediaMeta, MediaRef, RemoteDirectory};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Timeout for fetching candidate images from URLs.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// A materialized candidate image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub filename: String,
}

/// Vector-to-raster conversion seam.
pub trait Rasterizer: Send + Sync {
    /// Convert a vector image to a raster format.
    fn rasterize(&self, image: ImageData) -> SyncResult<ImageData>;
}

/// Decides whether a candidate must be uploaded.
pub struct MediaSync<'a> {
    directory: &'a dyn RemoteDirectory,
    fetcher: reqwest::Client,
    rasterizer: Option<&'a dyn Rasterizer>,
}

impl<'a> MediaSync<'a> {
    pub fn new(directory: &'a dyn RemoteDirectory) -> Self {
        let fetcher = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(concat!("mxsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            directory,
            fetcher,
            rasterizer: None,
        }
    }

    /// Attach a vector converter.
    pub fn with_rasterizer(mut self, rasterizer: &'a dyn Rasterizer) -> Self {
        self.rasterizer = Some(rasterizer);
        self
    }

    /// Resolve `source` and upload it unless the stored reference already
    /// holds the same image. Returns the new reference, or `None` for a
    /// no-op (same image: no upload, no change entry).
    pub async fn upload_if_new(
        &self,
        source: &str,
        current: Option<&MediaRef>,
    ) -> SyncResult<Option<MediaRef>> {
        let image = self.materialize(source).await?;

        if let Some(current) = current {
            let meta = self.directory.download_media_meta(current).await?;
            if same_image(&image, &meta) {
                debug!(source = %source, current = %current, "avatar unchanged, skipping upload");
                return Ok(None);
            }
        }

        let uploaded = self
            .directory
            .upload_media(image.bytes, &image.mime, &image.filename)
            .await?;
        Ok(Some(uploaded))
    }

    /// Materialize a candidate to raster bytes with a detected MIME type.
    pub async fn materialize(&self, source: &str) -> SyncResult<ImageData> {
        let image = if source.starts_with("data:") {
            decode_data_url(source)?
        } else if source.starts_with("http://") || source.starts_with("https://") {
            self.fetch_url(source).await?
        } else {
            read_file(source)?
        };

        if !image.mime.contains("image") {
            return Err(SyncError::Media(format!(
                "`{source}` has MIME type {} which is not an image",
                image.mime
            )));
        }

        if image.mime == "image/svg+xml" {
            return match self.rasterizer {
                Some(r) => r.rasterize(image),
                None => Err(SyncError::Media(format!(
                    "`{source}` is a vector image and no rasterizer is available"
                ))),
            };
        }

        Ok(image)
    }

    async fn fetch_url(&self, url: &str) -> SyncResult<ImageData> {
        let resp = self
            .fetcher
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| SyncError::Media(format!("failed to fetch `{url}`: {e}")))?;

        let header_mime = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
        let filename = url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("avatar")
            .split('?')
            .next()
            .unwrap_or("avatar")
            .to_string();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| SyncError::Media(format!("failed to read `{url}`: {e}")))?
            .to_vec();

        let mime = header_mime
            .or_else(|| mime_for_name(&filename).map(str::to_string))
            .ok_or_else(|| SyncError::Media(format!("cannot determine MIME type of `{url}`")))?;

        Ok(ImageData {
            bytes,
            mime,
            filename,
        })
    }
}

/// Fingerprint comparison: size, MIME, and basename containment.
pub fn same_image(candidate: &ImageData, stored: &MediaMeta) -> bool {
    stored.size == candidate.bytes.len() as u64
        && stored.mime == candidate.mime
        && stored
            .filename
            .as_deref()
            .is_some_and(|f| f.contains(&candidate.filename))
}

fn read_file(path: &str) -> SyncResult<ImageData> {
    let bytes = std::fs::read(path)
        .map_err(|e| SyncError::Media(format!("cannot read `{path}`: {e}")))?;
    let filename = Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("avatar")
        .to_string();
    let mime = mime_for_name(&filename)
        .ok_or_else(|| SyncError::Media(format!("cannot determine MIME type of `{path}`")))?
        .to_string();
    Ok(ImageData {
        bytes,
        mime,
        filename,
    })
}

fn decode_data_url(source: &str) -> SyncResult<ImageData> {
    let rest = source
        .strip_prefix("data:")
        .unwrap_or(source);
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| SyncError::Media("malformed data URL: no payload".into()))?;
    if !meta.contains("base64") {
        return Err(SyncError::Media("data URL must be base64 encoded".into()));
    }
    let mime = meta.split(';').next().unwrap_or("").to_string();
    if mime.is_empty() {
        return Err(SyncError::Media("data URL carries no MIME type".into()));
    }
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| SyncError::Media(format!("undecodable data URL: {e}")))?;
    let ext = match mime.as_str() {
        "image/svg+xml" => "svg",
        m => m.rsplit('/').next().unwrap_or("bin"),
    };
    let filename = format!("avatar.{ext}");
    Ok(ImageData {
        bytes,
        mime,
        filename,
    })
}

/// MIME type from a filename extension; image formats only.
fn mime_for_name(name: &str) -> Option<&'static str> {
    let ext = name.rsplit('.').next()?;
    match ext.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        "svg" => Some("image/svg+xml"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_matches_spec_fixture() {
        let candidate = ImageData {
            bytes: vec![0u8; 2048],
            mime: "image/png".into(),
            filename: "logo.png".into(),
        };
        let stored = MediaMeta {
            size: 2048,
            mime: "image/png".into(),
            filename: Some("upload-logo.png".into()),
        };
        assert!(same_image(&candidate, &stored));
    }

    #[test]
    fn fingerprint_rejects_size_mime_or_name_mismatch() {
        let candidate = ImageData {
            bytes: vec![0u8; 2048],
            mime: "image/png".into(),
            filename: "logo.png".into(),
        };
        let mut stored = MediaMeta {
            size: 2047,
            mime: "image/png".into(),
            filename: Some("logo.png".into()),
        };
        assert!(!same_image(&candidate, &stored));

        stored.size = 2048;
        stored.mime = "image/jpeg".into();
        assert!(!same_image(&candidate, &stored));

        stored.mime = "image/png".into();
        stored.filename = Some("other.png".into());
        assert!(!same_image(&candidate, &stored));

        stored.filename = None;
        assert!(!same_image(&candidate, &stored));
    }

    #[test]
    fn data_url_decoding() {
        // "data" for a 4-byte payload.
        let url = "data:image/png;charset=utf-8;base64,AAECAw==";
        let image = decode_data_url(url).unwrap();
        assert_eq!(image.mime, "image/png");
        assert_eq!(image.bytes, vec![0, 1, 2, 3]);
        assert_eq!(image.filename, "avatar.png");
    }

    #[test]
    fn data_url_without_payload_fails() {
        assert!(decode_data_url("data:image/png;base64").is_err());
    }

    #[test]
    fn local_file_mime_detection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logo.png");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();
        let image = read_file(path.to_str().unwrap()).unwrap();
        assert_eq!(image.mime, "image/png");
        assert_eq!(image.filename, "logo.png");
        assert_eq!(image.bytes.len(), 3);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hi").unwrap();
        assert!(read_file(path.to_str().unwrap()).is_err());
    }

    #[test]
    fn mime_table() {
        assert_eq!(mime_for_name("a.JPG"), Some("image/jpeg"));
        assert_eq!(mime_for_name("a.svg"), Some("image/svg+xml"));
        assert_eq!(mime_for_name("archive.tar"), None);
    }
}
