use std::path::Path;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use super::{AnalysisError, ImageAnalyzer};
use crate::llm::{GenerateRequest, ImageAttachment, LlmClient, Stage};

const CAPTION_PROMPT: &str = "Describe this image for a business analyst in one or two sentences. \
    If it is a chart, graph or table, say what it measures and the most visible pattern.";

/// Captions images with a vision-capable model.
pub struct VisionCaptioner {
    llm_client: Arc<LlmClient>,
    model: String,
}

impl VisionCaptioner {
    pub fn new(llm_client: Arc<LlmClient>, model: impl Into<String>) -> Self {
        Self {
            llm_client,
            model: model.into(),
        }
    }
}

/// Media type from the file signature; only formats vision models accept.
pub fn detect_media_type(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some("image/png"),
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [b'G', b'I', b'F', b'8', ..] => Some("image/gif"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("image/webp"),
        _ => None,
    }
}

#[async_trait::async_trait]
impl ImageAnalyzer for VisionCaptioner {
    #[tracing::instrument(
        name = "analysis.image",
        skip(self),
        fields(image.bytes, image.media_type)
    )]
    async fn analyze_image(&self, path: &Path) -> Result<String, AnalysisError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AnalysisError::unreadable(path, e))?;

        let media_type = detect_media_type(&bytes)
            .ok_or_else(|| AnalysisError::unreadable(path, "not a PNG, JPEG, GIF or WEBP image"))?;

        let span = tracing::Span::current();
        span.record("image.bytes", bytes.len());
        span.record("image.media_type", media_type);

        let resp = self
            .llm_client
            .generate(&GenerateRequest {
                model: self.model.clone(),
                system: String::new(),
                prompt: CAPTION_PROMPT.to_string(),
                temperature: 0.0,
                max_tokens: 150,
                stage: Stage::Caption,
                images: vec![ImageAttachment {
                    media_type: media_type.to_string(),
                    data_base64: BASE64.encode(&bytes),
                }],
            })
            .await
            .map_err(|e| AnalysisError::Upstream(e.to_string()))?;

        Ok(resp.content.trim().to_string())
    }
}
