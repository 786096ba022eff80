//! Media pipeline: turns submitted media into stored object keys.
//!
//! A newly added item carries base64 image bytes that get a fresh key under
//! the media prefix. Anything else references a key issued earlier, usually
//! wrapped in a public URL, and is reused as-is.

use std::io::Cursor;

use base64::Engine;
use bytes::Bytes;
use image::{ImageFormat, ImageReader};
use rand::Rng;
use serde::Deserialize;

use crate::domain::posts::models::StoredMedia;
use crate::services::error::ServiceError;
use crate::storage::{ObjectStore, StorageError};

#[derive(Debug, Clone, Deserialize)]
pub struct MediaInput {
    pub newly_added: bool,
    /// base64 payload when newly added, otherwise a URL or key containing the media prefix
    pub url: String,
    pub tweet_order: i32,
    pub media_order: i32,
}

/// A validated media item, with bytes still to upload when it is new
#[derive(Debug, Clone)]
pub struct PreparedMedia {
    pub record: StoredMedia,
    pub upload: Option<Bytes>,
}

/// Decode and check one item without touching the object store.
pub fn prepare_media(item: &MediaInput, prefix: &str) -> Result<PreparedMedia, ServiceError> {
    if !item.newly_added {
        let key = extract_key(&item.url, prefix).ok_or_else(|| {
            ServiceError::Validation("Media reference is not a stored image".to_string())
        })?;
        return Ok(PreparedMedia {
            record: StoredMedia {
                tweet_order: item.tweet_order,
                media_order: item.media_order,
                key,
            },
            upload: None,
        });
    }

    let data = decode_payload(&item.url)?;
    let extension = image_extension(&data)?;
    Ok(PreparedMedia {
        record: StoredMedia {
            tweet_order: item.tweet_order,
            media_order: item.media_order,
            key: new_key(prefix, extension),
        },
        upload: Some(Bytes::from(data)),
    })
}

/// Write the bytes of a new item under its key. Existing references are left alone.
pub async fn store_prepared(
    store: &dyn ObjectStore,
    prepared: &PreparedMedia,
) -> Result<(), StorageError> {
    match &prepared.upload {
        Some(data) => store.put(&prepared.record.key, data.clone()).await,
        None => Ok(()),
    }
}

/// Reuse the part of `url` starting at the media prefix.
pub fn extract_key(url: &str, prefix: &str) -> Option<String> {
    let (_, rest) = url.split_once(prefix)?;
    let rest = rest.split(['?', '#']).next().unwrap_or_default();
    if rest.is_empty() || rest.contains('/') || rest.contains("..") {
        return None;
    }
    Some(format!("{}{}", prefix, rest))
}

/// Raw bytes of a base64 payload, with or without a `data:` URL header
pub fn decode_payload(payload: &str) -> Result<Vec<u8>, ServiceError> {
    let encoded = payload
        .split_once("base64,")
        .map(|(_, data)| data)
        .unwrap_or(payload);
    base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|_| ServiceError::FileType)
}

/// Only PNG and JPEG images are accepted
fn image_extension(data: &[u8]) -> Result<&'static str, ServiceError> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|_| ServiceError::FileType)?;
    let extension = match reader.format() {
        Some(ImageFormat::Png) => "png",
        Some(ImageFormat::Jpeg) => "jpeg",
        _ => return Err(ServiceError::FileType),
    };
    reader
        .into_dimensions()
        .map_err(|_| ServiceError::FileType)?;
    Ok(extension)
}

fn new_key(prefix: &str, extension: &str) -> String {
    let bytes: [u8; 16] = rand::rng().random();
    let id = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes);
    format!("{}{}.{}", prefix, id, extension)
}

/// A tiny encoded image, base64'd the way clients send it
#[cfg(test)]
pub(crate) fn encoded_image(format: ImageFormat) -> String {
    let image = image::DynamicImage::ImageRgb8(image::RgbImage::new(2, 2));
    let mut buf = Vec::new();
    image.write_to(&mut Cursor::new(&mut buf), format).unwrap();
    base64::engine::general_purpose::STANDARD.encode(buf)
}
