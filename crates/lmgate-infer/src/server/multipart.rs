use axum::extract::Multipart;
use axum::extract::multipart::Field;
use tracing::debug;

use crate::batch::ImageUpload;
use crate::server::{DescribeImageBatchForm, DescribeImageForm};

#[derive(Default)]
struct RawForm {
    uploads: Vec<ImageUpload>,
    prompt: Option<String>,
    max_new_tokens: Option<String>,
}

/// Reads `file`, `prompt` and `max_new_tokens`. Later `file` parts are ignored.
pub(crate) async fn read_image_form(multipart: Multipart) -> crate::Result<DescribeImageForm> {
    let form = read_form(multipart, "file").await?;
    Ok(DescribeImageForm {
        file: form.uploads.into_iter().next(),
        prompt: form.prompt,
        max_new_tokens: form.max_new_tokens,
    })
}

/// Reads every `files` part plus `prompt` and `max_new_tokens`.
pub(crate) async fn read_batch_form(
    multipart: Multipart,
) -> crate::Result<DescribeImageBatchForm> {
    let form = read_form(multipart, "files").await?;
    Ok(DescribeImageBatchForm {
        files: form.uploads,
        prompt: form.prompt,
        max_new_tokens: form.max_new_tokens,
    })
}

async fn read_form(mut multipart: Multipart, file_field: &str) -> crate::Result<RawForm> {
    let mut form = RawForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| crate::Error::bad_request_with_source("malformed multipart body", e))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            n if n == file_field => {
                let filename = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(|e| {
                    crate::Error::bad_request_with_source("failed to read uploaded file", e)
                })?;
                form.uploads.push(ImageUpload { filename, bytes });
            }
            "prompt" => form.prompt = Some(read_text(field, "prompt").await?),
            "max_new_tokens" => {
                form.max_new_tokens = Some(read_text(field, "max_new_tokens").await?)
            }
            other => debug!(field = other, "ignoring unknown multipart field"),
        }
    }
    Ok(form)
}

async fn read_text(field: Field<'_>, name: &str) -> crate::Result<String> {
    field
        .text()
        .await
        .map_err(|e| crate::Error::bad_request_with_source(format!("failed to read {name}"), e))
}
