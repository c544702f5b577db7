use std::num::{IntErrorKind, ParseIntError};

use crate::batch::ImageUpload;

pub const DEFAULT_IMAGE_PROMPT: &str = "Describe this image.";
pub const DEFAULT_BATCH_PROMPT: &str = "Describe these images.";
pub const MIN_MAX_NEW_TOKENS: usize = 1;
pub const MAX_MAX_NEW_TOKENS: usize = 2048;

pub(crate) fn validate_prompt(prompt: Option<&str>) -> crate::Result<String> {
    match prompt {
        Some(prompt) if !prompt.trim().is_empty() => Ok(prompt.to_string()),
        _ => Err(crate::Error::bad_request("No prompt provided")),
    }
}

/// A missing prompt means the route default; a blank one is rejected.
pub(crate) fn resolve_image_prompt(prompt: Option<String>, default: &str) -> crate::Result<String> {
    match prompt {
        None => Ok(default.to_string()),
        Some(prompt) if prompt.trim().is_empty() => {
            Err(crate::Error::bad_request("prompt must not be empty"))
        }
        Some(prompt) => Ok(prompt),
    }
}

pub(crate) fn parse_max_new_tokens(raw: Option<&str>, default: usize) -> crate::Result<usize> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(default);
    };
    let out_of_range = || {
        crate::Error::bad_request(format!(
            "max_new_tokens must be between {MIN_MAX_NEW_TOKENS} and {MAX_MAX_NEW_TOKENS}"
        ))
    };
    let value: i64 = raw.parse().map_err(|e: ParseIntError| match e.kind() {
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => out_of_range(),
        _ => crate::Error::bad_request(format!("max_new_tokens must be an integer, got {raw:?}")),
    })?;
    if value < MIN_MAX_NEW_TOKENS as i64 || value > MAX_MAX_NEW_TOKENS as i64 {
        return Err(out_of_range());
    }
    Ok(value as usize)
}

pub(crate) fn validate_upload(upload: Option<ImageUpload>) -> crate::Result<ImageUpload> {
    let upload = upload.ok_or_else(|| crate::Error::bad_request("No image uploaded"))?;
    if upload.bytes.is_empty() {
        return Err(crate::Error::bad_request("Empty image upload"));
    }
    Ok(upload)
}

pub(crate) fn validate_uploads(uploads: &[ImageUpload]) -> crate::Result<()> {
    if uploads.is_empty() {
        return Err(crate::Error::bad_request("No images uploaded"));
    }
    Ok(())
}
