use std::sync::Arc;
use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use tracing::Instrument;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use super::pricing::{PRICES, endpoint};
use super::{GenerateRequest, GenerateResponse, Provider};
use crate::telemetry::metrics::{
    GEN_AI_COST, GEN_AI_ERROR_COUNT, GEN_AI_FALLBACK_COUNT, GEN_AI_OPERATION_DURATION,
    GEN_AI_RETRY_COUNT, GEN_AI_TOKEN_USAGE,
};

const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Shared model client for captioning and narrative calls. Each call is
/// retried on the primary provider, then once more through the fallback
/// with the fallback model substituted.
pub struct LlmClient {
    pub primary: Arc<dyn Provider>,
    pub fallback: Option<Arc<dyn Provider>>,
    pub primary_provider: String,
    pub fallback_provider: String,
    pub fallback_model: String,
    pub max_retries: u32,
}

/// Attributes shared by every metric of one call.
fn call_attributes(provider: &str, model: &str, req: &GenerateRequest) -> Vec<KeyValue> {
    vec![
        KeyValue::new("gen_ai.operation.name", "chat"),
        KeyValue::new("gen_ai.provider.name", provider.to_string()),
        KeyValue::new("gen_ai.request.model", model.to_string()),
        KeyValue::new("report.stage", req.stage.as_str()),
    ]
}

fn with(attributes: &[KeyValue], extra: KeyValue) -> Vec<KeyValue> {
    let mut all = attributes.to_vec();
    all.push(extra);
    all
}

/// Exponential backoff capped at [`MAX_BACKOFF`], plus up to 25% jitter.
fn backoff_delay(attempt: u32) -> Duration {
    let base = Duration::from_secs(1)
        .saturating_mul(2u32.saturating_pow(attempt))
        .min(MAX_BACKOFF);
    let jitter_ms = fastrand::u64(0..=base.as_millis() as u64 / 4);
    base + Duration::from_millis(jitter_ms)
}

impl LlmClient {
    pub async fn generate(&self, req: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        let primary_err = match self
            .call_with_retry(self.primary.as_ref(), &self.primary_provider, req)
            .await
        {
            Ok(resp) => return Ok(resp),
            Err(err) => err,
        };

        let Some(fallback) = &self.fallback else {
            return Err(anyhow::anyhow!(
                "{} call to {} failed after {} attempt(s): {primary_err}",
                req.stage,
                self.primary_provider,
                self.max_retries.max(1)
            ));
        };

        tracing::warn!(
            stage = %req.stage,
            primary_provider = %self.primary_provider,
            fallback_provider = %self.fallback_provider,
            fallback_model = %self.fallback_model,
            error = %primary_err,
            "primary provider failed, falling back"
        );
        GEN_AI_FALLBACK_COUNT.add(
            1,
            &[
                KeyValue::new("gen_ai.provider.name", self.primary_provider.clone()),
                KeyValue::new("report.stage", req.stage.as_str()),
            ],
        );

        let fallback_req = GenerateRequest {
            model: self.fallback_model.clone(),
            ..req.clone()
        };
        self.call_with_retry(fallback.as_ref(), &self.fallback_provider, &fallback_req)
            .await
            .map_err(|err| {
                anyhow::anyhow!(
                    "{} call failed on {} ({primary_err}) and fallback {} ({err})",
                    req.stage,
                    self.primary_provider,
                    self.fallback_provider
                )
            })
    }

    async fn call_with_retry(
        &self,
        provider: &dyn Provider,
        provider_name: &str,
        req: &GenerateRequest,
    ) -> anyhow::Result<GenerateResponse> {
        let attempts = self.max_retries.max(1);
        let mut attempt = 0;

        loop {
            let err = match self.call(provider, provider_name, req).await {
                Ok(resp) => return Ok(resp),
                Err(err) => err,
            };
            attempt += 1;
            if attempt >= attempts {
                return Err(err);
            }

            let delay = backoff_delay(attempt - 1);
            tracing::warn!(
                stage = %req.stage,
                attempt,
                attempts,
                provider = provider_name,
                model = %req.model,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "LLM call failed, retrying"
            );
            GEN_AI_RETRY_COUNT.add(1, &call_attributes(provider_name, &req.model, req));
            tokio::time::sleep(delay).await;
        }
    }

    /// One provider call inside a `gen_ai.chat` span, with usage, cost and
    /// error metrics.
    async fn call(
        &self,
        provider: &dyn Provider,
        provider_name: &str,
        req: &GenerateRequest,
    ) -> anyhow::Result<GenerateResponse> {
        let server = endpoint(provider_name);
        let start = Instant::now();

        let span = tracing::info_span!(
            "gen_ai.chat",
            otel.name = %format!("gen_ai.chat {} {}", req.stage, req.model),
            gen_ai.operation.name = "chat",
            gen_ai.provider.name = %provider_name,
            gen_ai.request.model = %req.model,
            server.address = server.host,
            server.port = server.port,
            gen_ai.request.temperature = req.temperature,
            gen_ai.request.max_tokens = req.max_tokens as i64,
            gen_ai.response.model = tracing::field::Empty,
            gen_ai.usage.input_tokens = tracing::field::Empty,
            gen_ai.usage.output_tokens = tracing::field::Empty,
            gen_ai.usage.cost_usd = tracing::field::Empty,
            gen_ai.response.finish_reasons = tracing::field::Empty,
            report.stage = req.stage.as_str(),
            report.image_count = req.images.len() as i64,
            otel.status_code = tracing::field::Empty,
            error.type = tracing::field::Empty,
        );

        let mut prompt_event = vec![KeyValue::new("gen_ai.prompt", truncate(&req.prompt, 1000))];
        if !req.system.is_empty() {
            prompt_event.push(KeyValue::new(
                "gen_ai.system_instructions",
                truncate(&req.system, 500),
            ));
        }
        span.add_event("gen_ai.user.message", prompt_event);

        let result = provider.generate(req).instrument(span.clone()).await;
        let duration = start.elapsed().as_secs_f64();

        let mut resp = match result {
            Ok(resp) => resp,
            Err(err) => {
                let error_type = classify_error(&err);
                span.record("otel.status_code", "ERROR");
                span.record("error.type", error_type);
                GEN_AI_ERROR_COUNT.add(
                    1,
                    &with(
                        &call_attributes(provider_name, &req.model, req),
                        KeyValue::new("error.type", error_type),
                    ),
                );
                return Err(err);
            }
        };

        resp.provider = provider_name.to_string();
        resp.cost_usd = PRICES.cost(&resp.model, resp.input_tokens, resp.output_tokens);

        span.record("gen_ai.response.model", resp.model.as_str());
        span.record("gen_ai.usage.input_tokens", resp.input_tokens as i64);
        span.record("gen_ai.usage.output_tokens", resp.output_tokens as i64);
        span.record("gen_ai.usage.cost_usd", resp.cost_usd);
        if !resp.finish_reason.is_empty() {
            span.record("gen_ai.response.finish_reasons", resp.finish_reason.as_str());
        }
        span.add_event(
            "gen_ai.assistant.message",
            vec![KeyValue::new("gen_ai.completion", truncate(&resp.content, 2000))],
        );

        let attributes = call_attributes(provider_name, &resp.model, req);
        GEN_AI_TOKEN_USAGE.record(
            f64::from(resp.input_tokens),
            &with(&attributes, KeyValue::new("gen_ai.token.type", "input")),
        );
        GEN_AI_TOKEN_USAGE.record(
            f64::from(resp.output_tokens),
            &with(&attributes, KeyValue::new("gen_ai.token.type", "output")),
        );
        GEN_AI_OPERATION_DURATION.record(duration, &attributes);
        GEN_AI_COST.add(resp.cost_usd, &attributes);

        Ok(resp)
    }
}

fn classify_error(err: &anyhow::Error) -> &'static str {
    let msg = err.to_string().to_lowercase();
    let any = |needles: &[&str]| needles.iter().any(|n| msg.contains(n));

    if any(&["rate limit", "429"]) {
        "rate_limit"
    } else if any(&["timeout", "timed out", "deadline"]) {
        "timeout"
    } else if any(&["401", "403", "auth", "api key"]) {
        "auth_error"
    } else if any(&["400", "422", "invalid"]) {
        "invalid_request"
    } else if any(&["500", "502", "503", "server"]) {
        "server_error"
    } else if any(&["connect", "dns", "network", "reset"]) {
        "network_error"
    } else {
        "unknown_error"
    }
}

/// At most `max` bytes, cut on a char boundary.
fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}
