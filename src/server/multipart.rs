use crate::{
    error::{Result, StudioError},
    models::{generation::file_too_large, GenerationRequest, ImageUpload},
};
use actix_multipart::{Field, Multipart, MultipartError};
use actix_web::{guard::GuardContext, http::header};
use futures::StreamExt;

pub const PROMPT_FIELD: &str = "prompt";
pub const STYLE_FIELD: &str = "style";
pub const IMAGE_FIELD: &str = "imageUpload";

/// Cap for the text parts; they only carry a prompt and a style name.
const MAX_TEXT_FIELD_BYTES: usize = 64 * 1024;

/// Routes `multipart/form-data` submissions to the form handler.
pub fn is_multipart(ctx: &GuardContext<'_>) -> bool {
    ctx.head()
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map_or(false, |value| {
            value
                .trim_start()
                .to_ascii_lowercase()
                .starts_with("multipart/form-data")
        })
}

fn invalid_body(err: MultipartError) -> StudioError {
    StudioError::Validation(format!("Invalid request body: {}", err))
}

/// Reads one part, failing as soon as it grows past `limit`.
async fn read_field(
    field: &mut Field,
    limit: usize,
    too_large: impl Fn() -> StudioError,
) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(invalid_body)?;
        if data.len() + chunk.len() > limit {
            return Err(too_large());
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}

async fn read_text(field: &mut Field, name: &str) -> Result<String> {
    let data = read_field(field, MAX_TEXT_FIELD_BYTES, || {
        StudioError::Validation(format!("Field '{}' is too large", name))
    })
    .await?;
    String::from_utf8(data)
        .map_err(|_| StudioError::Validation(format!("Field '{}' is not valid UTF-8", name)))
}

/// Collects `prompt`, `style` and the optional `imageUpload` file from a
/// form submission. Unknown parts are drained and ignored.
pub async fn read_generation_form(
    mut form: Multipart,
    max_image_bytes: usize,
) -> Result<GenerationRequest> {
    let mut prompt = String::new();
    let mut style = String::new();
    let mut image = None;

    while let Some(field) = form.next().await {
        let mut field = field.map_err(invalid_body)?;
        let disposition = field.content_disposition();
        let name = disposition.get_name().unwrap_or_default().to_string();
        let filename = disposition.get_filename().unwrap_or_default().to_string();

        match name.as_str() {
            PROMPT_FIELD => prompt = read_text(&mut field, PROMPT_FIELD).await?,
            STYLE_FIELD => style = read_text(&mut field, STYLE_FIELD).await?,
            IMAGE_FIELD => {
                let content_type = field
                    .content_type()
                    .map(|mime| mime.essence_str().to_string())
                    .unwrap_or_default();
                let data =
                    read_field(&mut field, max_image_bytes, || file_too_large(max_image_bytes))
                        .await?;
                // Browsers send an empty part when no file was picked.
                if !(filename.is_empty() && data.is_empty()) {
                    image = Some(ImageUpload::new(filename, content_type, data));
                }
            }
            other => {
                log::debug!("Ignoring unexpected form field '{}'", other);
                while let Some(chunk) = field.next().await {
                    chunk.map_err(invalid_body)?;
                }
            }
        }
    }

    Ok(GenerationRequest {
        prompt,
        style,
        image,
    })
}
