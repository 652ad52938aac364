//! Output download, inspection, and storage.

use std::io::Cursor;

use base64::Engine;
use tracing::debug;

use easel_core::store::ContentStore;

use crate::{GeneratedFile, ImageGenError, ProviderOutput, Result};

/// Format facts read from image bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageInfo {
    pub mime_type: String,
    pub extension: String,
    pub width: u32,
    pub height: u32,
}

/// Fresh opaque file id stem: `im_` followed by 8 hex characters.
pub fn new_file_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("im_{}", &id[..8])
}

/// Download a provider output with a shared HTTP client.
pub async fn download(client: &reqwest::Client, output: &ProviderOutput) -> Result<Vec<u8>> {
    match output {
        ProviderOutput::Bytes(bytes) => Ok(bytes.clone()),
        ProviderOutput::Url(url) => {
            let response = client.get(url).send().await?;
            if !response.status().is_success() {
                return Err(ImageGenError::Provider(format!(
                    "failed to download output ({}): {url}",
                    response.status()
                )));
            }
            Ok(response.bytes().await?.to_vec())
        }
    }
}

/// Detect format and dimensions from the bytes themselves.
pub fn inspect(bytes: &[u8]) -> Result<ImageInfo> {
    let format = image::guess_format(bytes)?;
    let (width, height) = image::ImageReader::with_format(Cursor::new(bytes), format)
        .into_dimensions()?;
    let extension = format
        .extensions_str()
        .first()
        .copied()
        .unwrap_or("png")
        .to_string();
    Ok(ImageInfo {
        mime_type: format.to_mime_type().to_string(),
        extension,
        width,
        height,
    })
}

/// Store image bytes under a new file id and describe the result.
pub async fn persist(store: &dyn ContentStore, bytes: &[u8]) -> Result<GeneratedFile> {
    let info = inspect(bytes)?;
    let filename = format!("{}.{}", new_file_id(), info.extension);
    store.write(&filename, bytes).await?;
    debug!(%filename, width = info.width, height = info.height, "Stored generated image");
    Ok(GeneratedFile {
        mime_type: info.mime_type,
        width: info.width,
        height: info.height,
        filename,
    })
}

/// Decode a base64 payload returned inline by a provider.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .map_err(|e| ImageGenError::Provider(format!("invalid base64 image data: {e}")))
}

/// Encode bytes as a data URI, guessing the MIME type from `name`.
pub fn data_uri(name: &str, bytes: &[u8]) -> String {
    let mime = mime_guess::from_path(name)
        .first_raw()
        .unwrap_or("image/png");
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    format!("data:{mime};base64,{encoded}")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use easel_core::store::FileStore;

    /// A valid PNG of the given size.
    pub(crate) fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::new(width, height);
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_file_id_shape() {
        let id = new_file_id();
        assert!(id.starts_with("im_"));
        assert_eq!(id.len(), 11);
        assert_ne!(id, new_file_id());
    }

    #[test]
    fn test_inspect_png() {
        let info = inspect(&png(64, 32)).unwrap();
        assert_eq!(info.mime_type, "image/png");
        assert_eq!(info.extension, "png");
        assert_eq!((info.width, info.height), (64, 32));
    }

    #[test]
    fn test_inspect_rejects_garbage() {
        assert!(matches!(
            inspect(b"not an image"),
            Err(ImageGenError::Image(_))
        ));
    }

    #[tokio::test]
    async fn test_persist_uses_content_extension() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().to_path_buf());
        let file = persist(&store, &png(10, 20)).await.unwrap();
        assert!(file.filename.starts_with("im_"));
        assert!(file.filename.ends_with(".png"));
        assert_eq!((file.width, file.height), (10, 20));
        assert_eq!(store.read(&file.filename).await.unwrap(), png(10, 20));
    }

    #[test]
    fn test_data_uri_mime_guess() {
        assert!(data_uri("im_abc.jpg", b"x").starts_with("data:image/jpeg;base64,"));
        assert!(data_uri("im_abc", b"x").starts_with("data:image/png;base64,"));
    }
}
