//! Generation client: image transformation and prompt improvement requests.

pub mod content;
mod gemini;

pub use gemini::{GeminiBackend, GeminiBackendBuilder, API_KEY_ENV_VARS, DEFAULT_BASE_URL};

use crate::client::content::{ContentRequest, ContentResponse, Part};
use crate::error::{ForgeError, Result};
use crate::types::{QualityTier, ReferenceImage};
use async_trait::async_trait;

/// Text model used for prompt improvement.
pub const PROMPT_MODEL: &str = "gemini-3-flash-preview";

/// Prompt returned when improving an empty prompt fails.
pub const FALLBACK_PROMPT: &str = "A funny space cat on a surfboard";

const IMPROVE_INSTRUCTION: &str = "You are a prompt engineer. Improve the user's image generation prompt to be more descriptive, creative, and detailed for a high-quality AI meme. Return ONLY the improved prompt text.";

const RANDOM_INSTRUCTION: &str = "You are a creative meme generator. Create a random, funny, and highly descriptive prompt for a character-based meme. Return ONLY the prompt text.";

const RANDOM_TRIGGER: &str = "Generate a random funny meme prompt.";

/// Transport for a single `generateContent` call.
#[async_trait]
pub trait ContentBackend: Send + Sync {
    /// Sends `request` to `model` and returns the parsed response.
    async fn generate_content(
        &self,
        model: &str,
        request: &ContentRequest,
    ) -> Result<ContentResponse>;
}

/// The two operations the session needs from a generation client.
#[async_trait]
pub trait ForgeClient: Send + Sync {
    /// Transforms the reference character according to `prompt`.
    ///
    /// Returns the generated image as a data URI.
    async fn request_image_transformation(
        &self,
        prompt: &str,
        reference: &ReferenceImage,
        tier: QualityTier,
    ) -> Result<String>;

    /// Returns an improved (or invented, when `current` is empty) prompt.
    ///
    /// Never fails: on any error the input prompt is returned unchanged, or
    /// [`FALLBACK_PROMPT`] when the input was empty.
    async fn request_prompt_improvement(&self, current: &str) -> String;
}

/// Generation client over any [`ContentBackend`].
pub struct GenerationClient<B> {
    backend: B,
}

impl GenerationClient<GeminiBackend> {
    /// Builds a client over the Gemini backend, reading the API key from the
    /// environment.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(GeminiBackend::builder().build()?))
    }
}

impl<B: ContentBackend> GenerationClient<B> {
    /// Wraps a backend.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Returns the underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    async fn transform_impl(
        &self,
        prompt: &str,
        reference: &ReferenceImage,
        tier: QualityTier,
    ) -> Result<String> {
        if prompt.trim().is_empty() {
            return Err(ForgeError::InvalidRequest("prompt is empty".into()));
        }
        reference.validate()?;

        let request = transformation_request(prompt, reference, tier);
        tracing::debug!(model = tier.model(), %tier, "requesting image transformation");
        let response = self.backend.generate_content(tier.model(), &request).await?;

        if let Some(message) = response.block_message() {
            return Err(ForgeError::ContentBlocked(message));
        }

        match response.first_inline_image() {
            Some(inline) => Ok(inline.to_data_uri()),
            None => match response.finish_reason() {
                Some(
                    reason @ ("SAFETY" | "IMAGE_SAFETY" | "IMAGE_PROHIBITED_CONTENT"
                    | "PROHIBITED_CONTENT" | "BLOCKLIST"),
                ) => Err(ForgeError::ContentBlocked(format!(
                    "Content blocked by safety filter: {}",
                    reason
                ))),
                _ => Err(ForgeError::NoImageReturned),
            },
        }
    }

    async fn improve_impl(&self, current: &str) -> Result<Option<String>> {
        let request = improvement_request(current);
        let response = self.backend.generate_content(PROMPT_MODEL, &request).await?;
        Ok(response
            .text()
            .map(|t| clean_generated_text(&t))
            .filter(|t| !t.is_empty()))
    }
}

#[async_trait]
impl<B: ContentBackend> ForgeClient for GenerationClient<B> {
    async fn request_image_transformation(
        &self,
        prompt: &str,
        reference: &ReferenceImage,
        tier: QualityTier,
    ) -> Result<String> {
        self.transform_impl(prompt, reference, tier)
            .await
            .inspect_err(|e| tracing::error!(%tier, "image generation failed: {e}"))
    }

    async fn request_prompt_improvement(&self, current: &str) -> String {
        let fallback = || {
            if current.trim().is_empty() {
                FALLBACK_PROMPT.to_string()
            } else {
                current.to_string()
            }
        };

        match self.improve_impl(current).await {
            Ok(Some(text)) => text,
            Ok(None) => fallback(),
            Err(e) => {
                tracing::warn!("prompt improvement failed, keeping prompt: {e}");
                fallback()
            }
        }
    }
}

/// Builds the image request: reference first, instruction second.
fn transformation_request(
    prompt: &str,
    reference: &ReferenceImage,
    tier: QualityTier,
) -> ContentRequest {
    let instruction = format!(
        "Reimagine this character in the following scene or style: {}. Maintain the core identifying features of the character while adapting them to the new context.",
        prompt
    );
    let request = ContentRequest::from_parts(vec![
        Part::inline(&reference.mime_type, &reference.data),
        Part::text(instruction),
    ]);

    match tier.image_config() {
        Some((aspect_ratio, image_size)) => request.with_image_config(aspect_ratio, image_size),
        None => request,
    }
}

/// Builds the text request, picking the template by whether a prompt exists.
fn improvement_request(current: &str) -> ContentRequest {
    if current.trim().is_empty() {
        ContentRequest::from_parts(vec![Part::text(RANDOM_TRIGGER)])
            .with_system_instruction(RANDOM_INSTRUCTION)
    } else {
        ContentRequest::from_parts(vec![Part::text(format!("Improve this prompt: {}", current))])
            .with_system_instruction(IMPROVE_INSTRUCTION)
    }
}

/// Strips whitespace, code fences and wrapping quotes from model output.
fn clean_generated_text(text: &str) -> String {
    let mut text = text.trim();

    if let Some(inner) = text.strip_prefix("```").and_then(|t| t.strip_suffix("```")) {
        // Drop an optional language tag on the opening fence.
        text = match inner.split_once('\n') {
            Some((tag, body)) if !tag.trim().contains(' ') => body,
            _ => inner,
        }
        .trim();
    }

    for (open, close) in [('"', '"'), ('\'', '\''), ('\u{201C}', '\u{201D}')] {
        // Only a pair that wraps the whole text is removed.
        if let Some(inner) = text
            .strip_prefix(open)
            .and_then(|t| t.strip_suffix(close))
            .filter(|inner| !inner.contains(close))
        {
            text = inner.trim();
            break;
        }
    }

    text.to_string()
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::client::content::{Candidate, Content, PromptFeedback};

    fn client(backend: ScriptedBackend) -> GenerationClient<ScriptedBackend> {
        GenerationClient::new(backend)
    }

    #[tokio::test]
    async fn test_transformation_standard_request_shape() {
        let client = client(ScriptedBackend::new().reply(image_response("image/png", "OUT")));

        let url = client
            .request_image_transformation("on the moon", &reference(), QualityTier::Standard)
            .await
            .unwrap();
        assert_eq!(url, "data:image/png;base64,OUT");

        let calls = client.backend().calls();
        assert_eq!(calls.len(), 1);
        let (model, request) = &calls[0];
        assert_eq!(model, "gemini-2.5-flash-image");
        assert!(request.generation_config.is_none());

        let parts = request.parts();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].inline_data.as_ref().unwrap().data, "iVBORw0KGgo=");
        let text = parts[1].text.as_deref().unwrap();
        assert!(text.starts_with(
            "Reimagine this character in the following scene or style: on the moon."
        ));
        assert!(text.contains("Maintain the core identifying features"));
    }

    #[tokio::test]
    async fn test_transformation_inserts_prompt_verbatim() {
        let client = client(ScriptedBackend::new().reply(image_response("image/png", "OUT")));

        client
            .request_image_transformation(" on the moon\n", &reference(), QualityTier::Standard)
            .await
            .unwrap();

        let (_, request) = &client.backend().calls()[0];
        let text = request.parts()[1].text.as_deref().unwrap();
        assert!(text.starts_with(
            "Reimagine this character in the following scene or style:  on the moon\n."
        ));
    }

    #[tokio::test]
    async fn test_transformation_high_tier_requests_image_config() {
        let client = client(ScriptedBackend::new().reply(image_response("image/png", "OUT")));

        client
            .request_image_transformation("as a knight", &reference(), QualityTier::High)
            .await
            .unwrap();

        let (model, request) = &client.backend().calls()[0];
        assert_eq!(model, "gemini-3-pro-image-preview");
        let json = serde_json::to_value(request).unwrap();
        assert_eq!(json["generationConfig"]["imageConfig"]["aspectRatio"], "1:1");
        assert_eq!(json["generationConfig"]["imageConfig"]["imageSize"], "1K");
    }

    #[tokio::test]
    async fn test_transformation_takes_image_from_second_part() {
        let response = ContentResponse::from_parts(vec![
            Part::text("Here is your character"),
            Part::inline("image/jpeg", "SECOND"),
            Part::inline("image/png", "THIRD"),
        ]);
        let client = client(ScriptedBackend::new().reply(response));

        let url = client
            .request_image_transformation("pirate", &reference(), QualityTier::Standard)
            .await
            .unwrap();
        assert_eq!(url, "data:image/jpeg;base64,SECOND");
    }

    #[tokio::test]
    async fn test_transformation_without_image_fails() {
        let client = client(
            ScriptedBackend::new()
                .reply(text_response("I cannot draw that"))
                .reply(ContentResponse::default()),
        );

        for _ in 0..2 {
            let err = client
                .request_image_transformation("pirate", &reference(), QualityTier::Standard)
                .await
                .unwrap_err();
            assert!(matches!(err, ForgeError::NoImageReturned));
        }
    }

    #[tokio::test]
    async fn test_transformation_safety_finish_reason() {
        let response = ContentResponse {
            candidates: vec![Candidate {
                content: Some(Content::default()),
                finish_reason: Some("IMAGE_SAFETY".into()),
            }],
            prompt_feedback: None,
        };
        let client = client(ScriptedBackend::new().reply(response));

        let err = client
            .request_image_transformation("pirate", &reference(), QualityTier::Standard)
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::ContentBlocked(_)));
    }

    #[tokio::test]
    async fn test_transformation_prompt_feedback_block() {
        let response = ContentResponse {
            candidates: vec![],
            prompt_feedback: Some(PromptFeedback {
                block_reason: Some("SAFETY".into()),
                block_reason_message: None,
            }),
        };
        let client = client(ScriptedBackend::new().reply(response));

        let err = client
            .request_image_transformation("pirate", &reference(), QualityTier::Standard)
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::ContentBlocked(ref m) if m == "Prompt blocked: SAFETY"));
    }

    #[tokio::test]
    async fn test_transformation_passes_upstream_errors_through() {
        let client = client(
            ScriptedBackend::new().fail(ForgeError::CredentialMissing("not found".into())),
        );

        let err = client
            .request_image_transformation("pirate", &reference(), QualityTier::High)
            .await
            .unwrap_err();
        assert!(err.is_upstream());
        assert!(err.is_credential_missing());
    }

    #[tokio::test]
    async fn test_transformation_validates_inputs_before_calling() {
        let client = client(ScriptedBackend::new());

        let err = client
            .request_image_transformation("   ", &reference(), QualityTier::Standard)
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::InvalidRequest(_)));

        let bad_reference = ReferenceImage {
            data: "AAAA".into(),
            mime_type: "application/pdf".into(),
        };
        let err = client
            .request_image_transformation("pirate", &bad_reference, QualityTier::Standard)
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::InvalidRequest(_)));

        assert!(client.backend().calls().is_empty());
    }

    #[tokio::test]
    async fn test_improvement_uses_improve_template() {
        let client = client(ScriptedBackend::new().reply(text_response(
            "  A cat in a neon-lit cyberpunk alley, rain reflecting pink light  \n",
        )));

        let improved = client.request_prompt_improvement("cat in city").await;
        assert_eq!(
            improved,
            "A cat in a neon-lit cyberpunk alley, rain reflecting pink light"
        );

        let (model, request) = &client.backend().calls()[0];
        assert_eq!(model, PROMPT_MODEL);
        assert_eq!(
            request.parts()[0].text.as_deref(),
            Some("Improve this prompt: cat in city")
        );
        let system = request.system_instruction.as_ref().unwrap();
        assert_eq!(system.parts[0].text.as_deref(), Some(IMPROVE_INSTRUCTION));
    }

    #[tokio::test]
    async fn test_improvement_sends_prompt_verbatim() {
        let client = client(ScriptedBackend::new().reply(text_response("A bold knight")));

        client.request_prompt_improvement("  knight ").await;

        let (_, request) = &client.backend().calls()[0];
        assert_eq!(
            request.parts()[0].text.as_deref(),
            Some("Improve this prompt:   knight ")
        );
    }

    #[tokio::test]
    async fn test_improvement_uses_random_template_for_empty_prompt() {
        let client = client(ScriptedBackend::new().reply(text_response("A dancing robot")));

        assert_eq!(client.request_prompt_improvement("").await, "A dancing robot");

        let (_, request) = &client.backend().calls()[0];
        assert_eq!(request.parts()[0].text.as_deref(), Some(RANDOM_TRIGGER));
        let system = request.system_instruction.as_ref().unwrap();
        assert_eq!(system.parts[0].text.as_deref(), Some(RANDOM_INSTRUCTION));
    }

    #[tokio::test]
    async fn test_improvement_never_fails() {
        for input in ["", "   ", "a wizard cat", "dragon"] {
            let client = client(
                ScriptedBackend::new().fail(ForgeError::Api {
                    status: 503,
                    message: "unavailable".into(),
                }),
            );
            let result = client.request_prompt_improvement(input).await;
            if input.trim().is_empty() {
                assert_eq!(result, FALLBACK_PROMPT);
            } else {
                assert_eq!(result, input);
            }
        }
    }

    #[tokio::test]
    async fn test_improvement_empty_text_falls_back() {
        let client = client(
            ScriptedBackend::new()
                .reply(ContentResponse::default())
                .reply(text_response("   ")),
        );

        assert_eq!(client.request_prompt_improvement("").await, FALLBACK_PROMPT);
        assert_eq!(client.request_prompt_improvement("keep me").await, "keep me");
    }

    #[test]
    fn test_clean_generated_text() {
        assert_eq!(clean_generated_text("  plain  "), "plain");
        assert_eq!(clean_generated_text("\"quoted prompt\""), "quoted prompt");
        assert_eq!(clean_generated_text("\u{201C}curly\u{201D}"), "curly");
        assert_eq!(clean_generated_text("```\nfenced\n```"), "fenced");
        assert_eq!(clean_generated_text("```text\nfenced\n```"), "fenced");
        assert_eq!(clean_generated_text("it's fine"), "it's fine");
        assert_eq!(
            clean_generated_text("\"Sunset\" over a neon city, \"golden hour\""),
            "\"Sunset\" over a neon city, \"golden hour\""
        );
        assert_eq!(
            clean_generated_text("'Moon' cat meets 'Sun' dog"),
            "'Moon' cat meets 'Sun' dog"
        );
    }
}
