//! Core types shared by the generation client and the session.

use crate::error::{ForgeError, Result};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Supported image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// PNG format (lossless).
    #[default]
    Png,
    /// JPEG format (lossy).
    Jpeg,
    /// WebP format (modern, efficient).
    WebP,
    /// GIF format.
    Gif,
}

impl ImageFormat {
    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
            Self::Gif => "gif",
        }
    }

    /// Returns the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
            Self::Gif => "image/gif",
        }
    }

    /// Maps a MIME type back to a format.
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime.to_lowercase().as_str() {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/webp" => Some(Self::WebP),
            "image/gif" => Some(Self::Gif),
            _ => None,
        }
    }

    /// Attempts to detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::WebP),
            "gif" => Some(Self::Gif),
            _ => None,
        }
    }

    /// Detects image format from magic bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 12 {
            return None;
        }

        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(Self::Png);
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }

        // WebP: RIFF....WEBP
        if data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some(Self::WebP);
        }

        if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            return Some(Self::Gif);
        }

        None
    }
}

/// Two-valued quality setting selecting the backend model and image config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    /// Fast, economical model.
    #[default]
    Standard,
    /// Highest quality model with a fixed square 1K output.
    High,
}

impl QualityTier {
    /// Returns the image model identifier for this tier.
    pub fn model(&self) -> &'static str {
        match self {
            Self::Standard => "gemini-2.5-flash-image",
            Self::High => "gemini-3-pro-image-preview",
        }
    }

    /// Returns the `(aspect ratio, image size)` pair requested for this tier.
    pub fn image_config(&self) -> Option<(&'static str, &'static str)> {
        match self {
            Self::Standard => None,
            Self::High => Some(("1:1", "1K")),
        }
    }
}

impl std::fmt::Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Standard => write!(f, "standard"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Status of the most recent generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GenerationStatus {
    /// Nothing requested yet.
    #[default]
    Idle,
    /// A generation call is in flight.
    Loading,
    /// The last generation produced a result.
    Success,
    /// The last generation failed.
    Error,
}

/// The user-supplied character image used as generation input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceImage {
    /// Base64 encoded image payload.
    pub data: String,
    /// MIME type of the payload, always `image/*`.
    pub mime_type: String,
}

impl ReferenceImage {
    /// Creates a reference from an already encoded payload.
    pub fn new(data: impl Into<String>, mime_type: impl Into<String>) -> Result<Self> {
        let reference = Self {
            data: data.into(),
            mime_type: mime_type.into(),
        };
        reference.validate()?;
        Ok(reference)
    }

    /// Encodes raw bytes into a reference image.
    pub fn from_bytes(bytes: &[u8], mime_type: impl Into<String>) -> Result<Self> {
        Self::new(
            base64::engine::general_purpose::STANDARD.encode(bytes),
            mime_type,
        )
    }

    /// Reads an image file, detecting its MIME type from the content first
    /// and the extension second.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let format = ImageFormat::from_magic_bytes(&bytes)
            .or_else(|| {
                path.extension()
                    .and_then(|e| e.to_str())
                    .and_then(ImageFormat::from_extension)
            })
            .ok_or_else(|| {
                ForgeError::InvalidRequest(format!("{} is not a supported image", path.display()))
            })?;
        Self::from_bytes(&bytes, format.mime_type())
    }

    /// Parses a `data:<mime>;base64,<payload>` URI.
    pub fn from_data_uri(uri: &str) -> Result<Self> {
        let (mime_type, data) = split_data_uri(uri)?;
        Self::new(data, mime_type)
    }

    /// Returns the reference as a self-contained data URI.
    pub fn to_data_uri(&self) -> String {
        to_data_uri(&self.mime_type, &self.data)
    }

    /// Checks that the payload is present and the MIME type names an image.
    pub fn validate(&self) -> Result<()> {
        if self.data.trim().is_empty() {
            return Err(ForgeError::InvalidRequest(
                "reference image payload is empty".into(),
            ));
        }
        if !self.mime_type.starts_with("image/") {
            return Err(ForgeError::InvalidRequest(format!(
                "reference MIME type '{}' is not an image",
                self.mime_type
            )));
        }
        Ok(())
    }
}

/// A generated image kept in the session history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedResult {
    /// Unique id, also used for the download file name.
    pub id: String,
    /// Embedded image as a data URI.
    pub source_url: String,
    /// Prompt the image was generated from.
    pub prompt_text: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl GeneratedResult {
    /// Creates a result with a fresh id and the current time.
    pub fn new(source_url: impl Into<String>, prompt_text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            source_url: source_url.into(),
            prompt_text: prompt_text.into(),
            created_at: Utc::now(),
        }
    }

    /// Returns the MIME type embedded in the data URI.
    pub fn mime_type(&self) -> Option<&str> {
        split_data_uri(&self.source_url).ok().map(|(mime, _)| mime)
    }

    /// Returns the image format, defaulting to PNG for unknown types.
    pub fn format(&self) -> ImageFormat {
        self.mime_type()
            .and_then(ImageFormat::from_mime_type)
            .unwrap_or_default()
    }

    /// File name offered when the result is downloaded.
    pub fn download_file_name(&self) -> String {
        format!("forge-{}.{}", self.id, self.format().extension())
    }

    /// Decodes the embedded payload.
    pub fn image_bytes(&self) -> Result<Vec<u8>> {
        let (_, data) = split_data_uri(&self.source_url)?;
        decode_base64_lenient(data).map_err(|e| ForgeError::Decode(e.to_string()))
    }

    /// Rebuilds a reference image from the embedded payload.
    pub fn to_reference(&self) -> Result<ReferenceImage> {
        ReferenceImage::from_data_uri(&self.source_url)
    }

    /// Writes the image into `dir` under its download file name.
    pub fn save_to_dir(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let path = dir.as_ref().join(self.download_file_name());
        std::fs::write(&path, self.image_bytes()?)?;
        Ok(path)
    }
}

/// Formats a MIME type and base64 payload as a data URI.
pub fn to_data_uri(mime_type: &str, data: &str) -> String {
    format!("data:{};base64,{}", mime_type, data)
}

/// Splits a base64 data URI into `(mime type, payload)`.
pub fn split_data_uri(uri: &str) -> Result<(&str, &str)> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| ForgeError::Decode("not a data URI".into()))?;
    let (mime_type, data) = rest
        .split_once(";base64,")
        .ok_or_else(|| ForgeError::Decode("data URI is not base64 encoded".into()))?;
    Ok((mime_type, data))
}

/// Decodes a base64 string that may be imperfectly formatted.
///
/// Tolerates a data URI prefix, embedded whitespace and missing padding.
pub(crate) fn decode_base64_lenient(input: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    let b64 = match input.find(";base64,") {
        Some(pos) => &input[pos + 8..],
        None => input,
    };

    let cleaned: String = b64.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    if let Ok(data) = base64::engine::general_purpose::STANDARD.decode(&cleaned) {
        return Ok(data);
    }

    base64::engine::general_purpose::STANDARD_NO_PAD.decode(&cleaned)
}
