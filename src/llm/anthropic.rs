use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use super::{GenerateRequest, GenerateResponse, Provider};

pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
}

impl AnthropicProvider {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
        }
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "String::is_empty")]
    system: String,
    messages: Vec<AnthropicMessage>,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: String,
    content: AnthropicMessageContent,
}

#[derive(Serialize)]
#[serde(untagged)]
enum AnthropicMessageContent {
    Text(String),
    Blocks(Vec<AnthropicBlock>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicBlock {
    Text { text: String },
    Image { source: AnthropicImageSource },
}

#[derive(Serialize)]
struct AnthropicImageSource {
    #[serde(rename = "type")]
    source_type: &'static str,
    media_type: String,
    data: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    model: String,
    usage: AnthropicUsage,
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Deserialize)]
struct AnthropicError {
    error: AnthropicErrorDetail,
}

#[derive(Deserialize)]
struct AnthropicErrorDetail {
    message: String,
}

fn message_content(req: &GenerateRequest) -> AnthropicMessageContent {
    if req.images.is_empty() {
        return AnthropicMessageContent::Text(req.prompt.clone());
    }

    // Images go before the instruction text.
    let mut blocks: Vec<AnthropicBlock> = req
        .images
        .iter()
        .map(|image| AnthropicBlock::Image {
            source: AnthropicImageSource {
                source_type: "base64",
                media_type: image.media_type.clone(),
                data: image.data_base64.clone(),
            },
        })
        .collect();
    blocks.push(AnthropicBlock::Text {
        text: req.prompt.clone(),
    });

    AnthropicMessageContent::Blocks(blocks)
}

#[async_trait::async_trait]
impl Provider for AnthropicProvider {
    async fn generate(&self, req: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|e| anyhow::anyhow!("invalid API key header: {e}"))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let body = AnthropicRequest {
            model: req.model.clone(),
            max_tokens: req.max_tokens,
            temperature: req.temperature,
            system: req.system.clone(),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: message_content(req),
            }],
        };

        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .headers(headers)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            if let Ok(err) = serde_json::from_str::<AnthropicError>(&error_body) {
                return Err(anyhow::anyhow!(
                    "Anthropic API error ({}): {}",
                    status,
                    err.error.message
                ));
            }
            return Err(anyhow::anyhow!(
                "Anthropic API error ({}): {}",
                status,
                error_body
            ));
        }

        let resp: AnthropicResponse = response.json().await?;

        let content = resp
            .content
            .iter()
            .filter(|c| c.content_type == "text")
            .filter_map(|c| c.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        Ok(GenerateResponse {
            content,
            model: resp.model,
            input_tokens: resp.usage.input_tokens,
            output_tokens: resp.usage.output_tokens,
            cost_usd: 0.0,
            finish_reason: resp.stop_reason.unwrap_or_default(),
            provider: String::new(),
        })
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ImageAttachment, Stage};

    fn request(images: Vec<ImageAttachment>) -> GenerateRequest {
        GenerateRequest {
            model: "claude-haiku-4-5-20251001".to_string(),
            system: String::new(),
            prompt: "Describe the chart".to_string(),
            temperature: 0.0,
            max_tokens: 150,
            stage: Stage::Caption,
            images,
        }
    }

    #[test]
    fn test_text_only_content_is_plain_string() {
        let content = serde_json::to_value(message_content(&request(vec![]))).unwrap();
        assert_eq!(content, serde_json::json!("Describe the chart"));
    }

    #[test]
    fn test_image_blocks_precede_text() {
        let content = serde_json::to_value(message_content(&request(vec![ImageAttachment {
            media_type: "image/png".to_string(),
            data_base64: "iVBORw0K".to_string(),
        }])))
        .unwrap();

        assert_eq!(content[0]["type"], "image");
        assert_eq!(content[0]["source"]["type"], "base64");
        assert_eq!(content[0]["source"]["media_type"], "image/png");
        assert_eq!(content[0]["source"]["data"], "iVBORw0K");
        assert_eq!(content[1]["type"], "text");
        assert_eq!(content[1]["text"], "Describe the chart");
    }

    #[test]
    fn test_empty_system_prompt_is_omitted() {
        let body = AnthropicRequest {
            model: "m".to_string(),
            max_tokens: 1,
            temperature: 0.0,
            system: String::new(),
            messages: vec![],
        };
        let value = serde_json::to_value(body).unwrap();
        assert!(value.get("system").is_none());
    }
}
