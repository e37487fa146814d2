pub mod anthropic;
pub mod client;
pub mod openai;
pub mod pricing;

pub use client::LlmClient;

/// Which part of report generation a model call serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Describing one uploaded image.
    Caption,
    /// Writing the report from the merged context.
    Narrative,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Caption => "caption",
            Stage::Narrative => "narrative",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stage: Stage,
    pub images: Vec<ImageAttachment>,
}

/// Inline image sent alongside the prompt to vision-capable models.
#[derive(Clone)]
pub struct ImageAttachment {
    pub media_type: String,
    pub data_base64: String,
}

impl ImageAttachment {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data_base64)
    }
}

impl std::fmt::Debug for ImageAttachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageAttachment")
            .field("media_type", &self.media_type)
            .field("data_len", &self.data_base64.len())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct GenerateResponse {
    pub content: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_usd: f64,
    pub finish_reason: String,
    pub provider: String,
}

#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    async fn generate(&self, req: &GenerateRequest) -> anyhow::Result<GenerateResponse>;
    fn name(&self) -> &str;
}
