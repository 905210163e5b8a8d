//! Payload validation: a payload is admitted only if it decodes as an image

use crate::error::{CacheError, Result};
use crate::types::CachedImage;

/// Decode `data` into a [`CachedImage`], keeping the original bytes
pub fn decode_image(data: Vec<u8>) -> Result<CachedImage> {
    if data.is_empty() {
        return Err(CacheError::InvalidPayload("empty payload".to_string()));
    }
    let format = image::guess_format(&data)?;
    let image = image::load_from_memory_with_format(&data, format)?;
    Ok(CachedImage {
        data,
        format,
        image,
    })
}
