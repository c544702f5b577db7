use image::RgbImage;

/// Decodes an uploaded image in any enabled format and converts it to RGB.
pub fn decode_image(bytes: &[u8]) -> crate::Result<RgbImage> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| crate::Error::bad_request_with_source("Invalid image upload", e))?;
    Ok(image.to_rgb8())
}
