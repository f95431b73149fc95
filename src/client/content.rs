//! Wire types for the `generateContent` call.
//!
//! These mirror the JSON shapes of the Gemini REST API closely enough that a
//! backend can serialize a [`ContentRequest`] directly and deserialize the
//! body into a [`ContentResponse`].

use crate::types::to_data_uri;
use serde::{Deserialize, Serialize};

/// Body of a `generateContent` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRequest {
    /// Conversation contents; this crate always sends a single user turn.
    pub contents: Vec<Content>,
    /// Optional system instruction (text models only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    /// Optional generation config.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

impl ContentRequest {
    /// Creates a request with a single user turn made of `parts`.
    pub fn from_parts(parts: Vec<Part>) -> Self {
        Self {
            contents: vec![Content::user(parts)],
            ..Self::default()
        }
    }

    /// Sets the system instruction text.
    pub fn with_system_instruction(mut self, text: impl Into<String>) -> Self {
        self.system_instruction = Some(Content {
            role: None,
            parts: vec![Part::text(text)],
        });
        self
    }

    /// Requests a fixed aspect ratio and image size.
    pub fn with_image_config(
        mut self,
        aspect_ratio: impl Into<String>,
        image_size: impl Into<String>,
    ) -> Self {
        self.generation_config = Some(GenerationConfig {
            image_config: Some(ImageConfig {
                aspect_ratio: aspect_ratio.into(),
                image_size: image_size.into(),
            }),
        });
        self
    }

    /// Returns the parts of the first content, if any.
    pub fn parts(&self) -> &[Part] {
        self.contents
            .first()
            .map(|c| c.parts.as_slice())
            .unwrap_or_default()
    }
}

/// A turn of content made of ordered parts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    /// `user` or `model`; absent on system instructions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Ordered parts of the turn.
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    /// Creates a user turn.
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts,
        }
    }
}

/// A single content part carrying text, inline binary data, or both absent
/// (parts of kinds this crate does not use).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    /// Text payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Inline binary payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

impl Part {
    /// Creates a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    /// Creates an inline data part.
    pub fn inline(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: mime_type.into(),
                data: data.into(),
            }),
        }
    }
}

/// Base64 encoded binary payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    /// MIME type, e.g. `image/png`.
    pub mime_type: String,
    /// Base64 data without a data-URI prefix.
    pub data: String,
}

impl InlineData {
    /// Returns the payload as a self-contained data URI.
    pub fn to_data_uri(&self) -> String {
        to_data_uri(&self.mime_type, &self.data)
    }

    /// Returns true if the payload is a non-empty image.
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/") && !self.data.is_empty()
    }
}

/// Generation config; only the image section is used.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Aspect ratio and size for image output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_config: Option<ImageConfig>,
}

/// Output shape for image models.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageConfig {
    /// Aspect ratio such as `1:1`.
    pub aspect_ratio: String,
    /// Image size such as `1K` or `2K`.
    pub image_size: String,
}

/// Body of a `generateContent` response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentResponse {
    /// Generated candidates; this crate reads only the first.
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    /// Feedback on the prompt, set when it was blocked.
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

impl ContentResponse {
    /// Creates a response with one candidate made of `parts`.
    pub fn from_parts(parts: Vec<Part>) -> Self {
        Self {
            candidates: vec![Candidate {
                content: Some(Content { role: None, parts }),
                finish_reason: Some("STOP".to_string()),
            }],
            prompt_feedback: None,
        }
    }

    /// Returns the parts of the first candidate, in order.
    pub fn first_candidate_parts(&self) -> &[Part] {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.as_slice())
            .unwrap_or_default()
    }

    /// Returns the first part of the first candidate carrying an image.
    pub fn first_inline_image(&self) -> Option<&InlineData> {
        self.first_candidate_parts()
            .iter()
            .find_map(|p| p.inline_data.as_ref().filter(|d| d.is_image()))
    }

    /// Concatenates the text parts of the first candidate.
    pub fn text(&self) -> Option<String> {
        let text: String = self
            .first_candidate_parts()
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// Returns the block message when the prompt itself was rejected.
    pub fn block_message(&self) -> Option<String> {
        let feedback = self.prompt_feedback.as_ref()?;
        let reason = feedback.block_reason.as_ref()?;
        Some(
            feedback
                .block_reason_message
                .clone()
                .unwrap_or_else(|| format!("Prompt blocked: {}", reason)),
        )
    }

    /// Returns the finish reason of the first candidate.
    pub fn finish_reason(&self) -> Option<&str> {
        self.candidates
            .first()
            .and_then(|c| c.finish_reason.as_deref())
    }
}

/// One generated answer.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Generated content.
    #[serde(default)]
    pub content: Option<Content>,
    /// Why generation stopped, e.g. `STOP` or `SAFETY`.
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Prompt-level safety feedback.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    /// Block reason, present when the prompt was rejected.
    #[serde(default)]
    pub block_reason: Option<String>,
    /// Human-readable block message.
    #[serde(default)]
    pub block_reason_message: Option<String>,
}
