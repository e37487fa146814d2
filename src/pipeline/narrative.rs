use crate::error::AppError;
use crate::llm::{GenerateRequest, LlmClient, Stage};

use super::context::Context;

/// Unmodified model response; no structure is guaranteed.
pub type RawModelOutput = String;

pub const SYSTEM_PROMPT: &str = "You are a senior business analyst.";

#[derive(Debug, Clone)]
pub struct NarrativeSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

pub fn build_prompt(context: &Context) -> String {
    format!(
        "Using ONLY the information below, write a structured analytical business report.\n\n\
        {context}\n\n\
        Return a single JSON object with exactly these keys and nothing else:\n\
        {{\n  \
        \"key_metrics\": {{\"metric_name\": value or {{\"sub_metric\": value}}}},\n  \
        \"trends_and_correlations\": {{\"trend_name\": \"description\"}},\n  \
        \"recommendations\": [\"recommendation\"],\n  \
        \"summary\": \"overall summary\"\n}}\n\n\
        Do not add commentary before or after the JSON. \
        Do not invent figures that are not supported by the information above."
    )
}

#[tracing::instrument(
    name = "pipeline_stage narrative",
    skip(llm_client, settings, context),
    fields(
        pipeline.stage = "narrative",
        narrative.model = %settings.model,
        narrative.prompt_chars,
        narrative.response_chars,
    )
)]
pub async fn generate_report(
    llm_client: &LlmClient,
    settings: &NarrativeSettings,
    context: &Context,
) -> Result<RawModelOutput, AppError> {
    let prompt = build_prompt(context);

    let span = tracing::Span::current();
    span.record("narrative.prompt_chars", prompt.len());

    let resp = llm_client
        .generate(&GenerateRequest {
            model: settings.model.clone(),
            system: SYSTEM_PROMPT.to_string(),
            prompt,
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            stage: Stage::Narrative,
            images: Vec::new(),
        })
        .await
        .map_err(|e| AppError::UpstreamUnavailable(e.to_string()))?;

    span.record("narrative.response_chars", resp.content.len());

    Ok(resp.content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use crate::analysis::{ArtifactAnalysis, ArtifactKind};
    use crate::llm::{GenerateResponse, Provider};

    struct CannedProvider {
        reply: Option<String>,
        prompts: Mutex<Vec<GenerateRequest>>,
    }

    #[async_trait::async_trait]
    impl Provider for CannedProvider {
        async fn generate(&self, req: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
            self.prompts.lock().unwrap().push(req.clone());
            match &self.reply {
                Some(content) => Ok(GenerateResponse {
                    content: content.clone(),
                    model: req.model.clone(),
                    input_tokens: 10,
                    output_tokens: 20,
                    cost_usd: 0.0,
                    finish_reason: "stop".to_string(),
                    provider: String::new(),
                }),
                None => Err(anyhow::anyhow!("429 Too Many Requests")),
            }
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    fn client(provider: Arc<CannedProvider>) -> LlmClient {
        LlmClient {
            primary: provider,
            fallback: None,
            primary_provider: "openai".to_string(),
            fallback_provider: "none".to_string(),
            fallback_model: String::new(),
            max_retries: 1,
        }
    }

    fn settings() -> NarrativeSettings {
        NarrativeSettings {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            max_tokens: 4096,
        }
    }

    fn context() -> Context {
        Context::new(vec![ArtifactAnalysis {
            kind: ArtifactKind::Tabular,
            insight: "Rows: 100, Columns: 3".to_string(),
        }])
    }

    #[test]
    fn test_prompt_embeds_context_once() {
        let prompt = build_prompt(&context());
        assert_eq!(prompt.matches("CSV Insight:\nRows: 100, Columns: 3").count(), 1);
        for key in ["key_metrics", "trends_and_correlations", "recommendations", "summary"] {
            assert!(prompt.contains(key), "prompt should name {key}");
        }
    }

    #[tokio::test]
    async fn test_returns_raw_response_unmodified() {
        let raw = "```json\n{\"summary\": \"ok\"}\n```  ".to_string();
        let provider = Arc::new(CannedProvider {
            reply: Some(raw.clone()),
            prompts: Mutex::new(Vec::new()),
        });

        let output = generate_report(&client(provider.clone()), &settings(), &context())
            .await
            .unwrap();

        assert_eq!(output, raw);
        let prompts = provider.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].system, SYSTEM_PROMPT);
        assert_eq!(prompts[0].stage, Stage::Narrative);
        assert_eq!(prompts[0].temperature, 0.2);
        assert!(prompts[0].images.is_empty());
    }

    #[tokio::test]
    async fn test_model_failure_is_upstream_unavailable() {
        let provider = Arc::new(CannedProvider {
            reply: None,
            prompts: Mutex::new(Vec::new()),
        });

        let err = generate_report(&client(provider), &settings(), &context())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UpstreamUnavailable(_)));
    }
}
