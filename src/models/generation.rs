use crate::error::{Result, StudioError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MAX_PROMPT_CHARS: usize = 500;
pub const DEFAULT_HISTORY_LIMIT: usize = 5;
pub const MAX_HISTORY_LIMIT: usize = 10;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpeg", "jpg", "png"];
const IMAGE_CONTENT_TYPES: [&str; 3] = ["image/jpeg", "image/jpg", "image/png"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    Completed,
    Failed,
}

impl GenerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationStatus::Completed => "completed",
            GenerationStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GenerationStatus {
    type Err = StudioError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "completed" => Ok(GenerationStatus::Completed),
            "failed" => Ok(GenerationStatus::Failed),
            other => Err(StudioError::Storage(format!(
                "unknown generation status '{}'",
                other
            ))),
        }
    }
}

pub(crate) fn file_too_large(max_bytes: usize) -> StudioError {
    StudioError::Validation(format!(
        "File too large (max {}MB)",
        max_bytes / (1024 * 1024)
    ))
}

/// Reference image attached to a generation request.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl fmt::Debug for ImageUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageUpload")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl ImageUpload {
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    /// Lowercased extension of the original filename, if it has one.
    pub fn extension(&self) -> Option<String> {
        self.filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
    }

    pub fn validate(&self, max_bytes: usize) -> Result<()> {
        if self.data.len() > max_bytes {
            return Err(file_too_large(max_bytes));
        }
        let extension_ok = self
            .extension()
            .map_or(false, |ext| IMAGE_EXTENSIONS.contains(&ext.as_str()));
        let content_type = self.content_type.to_ascii_lowercase();
        let content_type_ok = IMAGE_CONTENT_TYPES.contains(&content_type.as_str());
        if !extension_ok || !content_type_ok {
            return Err(StudioError::Validation(
                "Only JPEG and PNG images are allowed".to_string(),
            ));
        }
        Ok(())
    }
}

/// One logical generate call. Never mutated after submission, so every retry
/// sends exactly the same payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub style: String,
    pub image: Option<ImageUpload>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, style: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            style: style.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, image: ImageUpload) -> Self {
        self.image = Some(image);
        self
    }

    pub fn validate(&self, max_image_bytes: usize) -> Result<()> {
        if self.prompt.is_empty() {
            return Err(StudioError::Validation("Prompt is required".to_string()));
        }
        if self.prompt.chars().count() > MAX_PROMPT_CHARS {
            return Err(StudioError::Validation("Prompt too long".to_string()));
        }
        if self.style.is_empty() {
            return Err(StudioError::Validation("Style is required".to_string()));
        }
        if let Some(image) = &self.image {
            image.validate(max_image_bytes)?;
        }
        Ok(())
    }
}

/// Image as it travels inside the JSON request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePayload {
    pub filename: String,
    pub content_type: String,
    /// Standard base64 of the raw file bytes.
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGenerationBody {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub style: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImagePayload>,
}

impl From<&GenerationRequest> for CreateGenerationBody {
    fn from(request: &GenerationRequest) -> Self {
        Self {
            prompt: request.prompt.clone(),
            style: request.style.clone(),
            image: request.image.as_ref().map(|image| ImagePayload {
                filename: image.filename.clone(),
                content_type: image.content_type.clone(),
                data: STANDARD.encode(&image.data),
            }),
        }
    }
}

impl TryFrom<CreateGenerationBody> for GenerationRequest {
    type Error = StudioError;

    fn try_from(body: CreateGenerationBody) -> Result<Self> {
        let image = match body.image {
            Some(payload) => {
                let data = STANDARD.decode(payload.data.as_bytes()).map_err(|_| {
                    StudioError::Validation("Image data is not valid base64".to_string())
                })?;
                Some(ImageUpload::new(payload.filename, payload.content_type, data))
            }
            None => None,
        };
        Ok(GenerationRequest {
            prompt: body.prompt,
            style: body.style,
            image,
        })
    }
}

/// Stored generation row.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub id: i64,
    pub user_id: i64,
    pub prompt: String,
    pub style: String,
    pub image_url: String,
    pub original_image_url: Option<String>,
    pub status: GenerationStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewGeneration {
    pub user_id: i64,
    pub prompt: String,
    pub style: String,
    pub image_url: String,
    pub original_image_url: Option<String>,
    pub status: GenerationStatus,
}

/// What callers see of a generation: the success payload of a submission and
/// one entry of the history listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub id: i64,
    pub image_url: String,
    pub prompt: String,
    pub style: String,
    pub status: GenerationStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_image_url: Option<String>,
}

impl From<Generation> for GenerationResult {
    fn from(generation: Generation) -> Self {
        Self {
            id: generation.id,
            image_url: generation.image_url,
            prompt: generation.prompt,
            style: generation.style,
            status: generation.status,
            created_at: generation.created_at,
            original_image_url: generation.original_image_url,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<String>,
}

impl HistoryQuery {
    pub fn limit(&self) -> Result<usize> {
        let raw = match self.limit.as_deref() {
            None | Some("") => return Ok(DEFAULT_HISTORY_LIMIT),
            Some(raw) => raw,
        };
        let limit: usize = raw
            .trim()
            .parse()
            .map_err(|_| StudioError::Validation("Limit must be a number".to_string()))?;
        if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
            return Err(StudioError::Validation(format!(
                "Limit must be between 1 and {}",
                MAX_HISTORY_LIMIT
            )));
        }
        Ok(limit)
    }
}
