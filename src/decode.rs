use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ndarray::Array3;

use crate::error::{Result, TrackError};

/// Decode a base64 image payload into an RGB HWC raster.
///
/// Accepts both bare base64 and data URIs (`data:image/png;base64,...`).
/// Line breaks and other ASCII whitespace inside the base64 are ignored.
pub fn decode_image(payload: &str) -> Result<Array3<u8>> {
    let encoded = match payload.split_once(',') {
        Some((_, data)) => data,
        None => payload,
    };
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    let bytes = STANDARD
        .decode(compact)
        .map_err(|e| TrackError::ImageDecode(e.to_string()))?;
    let image = image::load_from_memory(&bytes)
        .map_err(|e| TrackError::ImageDecode(e.to_string()))?
        .to_rgb8();

    let (width, height) = image.dimensions();
    Array3::from_shape_vec((height as usize, width as usize, 3), image.into_raw())
        .map_err(|e| TrackError::ImageDecode(e.to_string()))
}
