//! Recovers a [`CanonicalReport`] from free-form model text.
//!
//! Each step is a separate function: strip fences, locate the outermost
//! braces, parse strictly, require an object, then fill defaults.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::report::CanonicalReport;
use crate::telemetry::metrics::REPORT_PARSE_FAILURES;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("no object boundaries found")]
    NoObjectBoundaries,

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("top-level value is not an object")]
    NotAnObject,
}

/// Trims whitespace and one pair of enclosing markdown fences, with or
/// without a language tag.
pub fn strip_fences(raw: &str) -> &str {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix("```") {
        let (opening, body) = rest.split_once('\n').unwrap_or((rest, ""));
        text = if opening.trim().chars().all(is_tag_char) {
            body
        } else {
            // Content shares the fence line; only a leading tag is dropped.
            rest.trim_start_matches(is_tag_char)
        };
    }
    if let Some(rest) = text.trim_end().strip_suffix("```") {
        text = rest;
    }

    text.trim()
}

fn is_tag_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '.' | '-')
}

/// The span from the first `{` to the last `}` inclusive.
pub fn locate_object(text: &str) -> Result<&str, ParseError> {
    let start = text.find('{').ok_or(ParseError::NoObjectBoundaries)?;
    let end = text.rfind('}').ok_or(ParseError::NoObjectBoundaries)?;
    if end < start {
        return Err(ParseError::NoObjectBoundaries);
    }
    Ok(&text[start..=end])
}

pub fn parse_object(span: &str) -> Result<Value, ParseError> {
    serde_json::from_str(span).map_err(|e| ParseError::InvalidJson(e.to_string()))
}

pub fn require_object(value: Value) -> Result<Map<String, Value>, ParseError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ParseError::NotAnObject),
    }
}

#[tracing::instrument(
    name = "pipeline_stage normalize",
    skip(raw),
    fields(
        pipeline.stage = "normalize",
        normalize.raw_chars = raw.len(),
        normalize.key_metrics,
        normalize.trends,
    )
)]
pub fn clean_model_output(raw: &str) -> Result<CanonicalReport, ParseError> {
    let result = locate_object(strip_fences(raw))
        .and_then(parse_object)
        .and_then(require_object)
        .map(CanonicalReport::from_object);

    match &result {
        Ok(report) => {
            let span = tracing::Span::current();
            span.record(
                "normalize.key_metrics",
                report.key_metrics.as_object().map_or(0, |m| m.len()),
            );
            span.record("normalize.trends", report.trends().len());
        }
        Err(err) => {
            REPORT_PARSE_FAILURES.add(1, &[]);
            tracing::warn!(error = %err, "model output could not be normalized");
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const E2E_RESPONSE: &str = "```json\n{\"summary\":\"Sales are rising\",\"key_metrics\":{\"total_rows\":100},\"trends_and_correlations\":{},\"recommendations\":[\"Increase inventory\"]}\n```";

    #[test]
    fn test_strip_fences_variants() {
        assert_eq!(strip_fences("  {\"a\":1}  "), "{\"a\":1}");
        assert_eq!(strip_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_fences("```json\n{\"a\":1}\n```\n"), "{\"a\":1}");
        assert_eq!(strip_fences("```json{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_fences("```objective-c++\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn test_brace_on_fence_line_is_kept() {
        let body = "{\n\"summary\": \"ok\"\n}";
        assert_eq!(strip_fences(&format!("```{body}\n```")), body);
        assert_eq!(strip_fences(&format!("```json {body}\n```")), body);

        let fenced = clean_model_output(&format!("```{body}\n```")).unwrap();
        assert_eq!(fenced, clean_model_output(body).unwrap());
        assert_eq!(fenced.summary, json!("ok"));
    }

    #[test]
    fn test_locate_object_uses_outermost_braces() {
        let text = "Here you go: {\"a\": {\"b\": 1}} hope it helps";
        assert_eq!(locate_object(text).unwrap(), "{\"a\": {\"b\": 1}}");
    }

    #[test]
    fn test_no_braces_is_parse_error() {
        assert_eq!(
            clean_model_output("I could not produce a report.").unwrap_err(),
            ParseError::NoObjectBoundaries
        );
        assert_eq!(
            locate_object("} reversed {").unwrap_err(),
            ParseError::NoObjectBoundaries
        );
    }

    #[test]
    fn test_invalid_json_carries_reason() {
        let err = clean_model_output("{\"summary\": \"unterminated}").unwrap_err();
        match err {
            ParseError::InvalidJson(reason) => assert!(!reason.is_empty()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_require_object_rejects_other_values() {
        assert_eq!(require_object(json!([1, 2])).unwrap_err(), ParseError::NotAnObject);
    }

    #[test]
    fn test_fenced_and_unfenced_recover_same_report() {
        let body = "{\"summary\": \"ok\", \"recommendations\": {\"a\": \"do X\"}}";
        let fenced = format!("```json\n{body}\n```");
        assert_eq!(
            clean_model_output(&fenced).unwrap(),
            clean_model_output(body).unwrap()
        );
    }

    #[test]
    fn test_idempotent_on_canonical_input() {
        let first = clean_model_output(E2E_RESPONSE).unwrap();
        let canonical = serde_json::to_string(&first).unwrap();
        let second = clean_model_output(&canonical).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_sections_are_defaulted() {
        let report = clean_model_output("{\"key_metrics\": {\"revenue\": 10}}").unwrap();
        assert_eq!(report.trends_and_correlations, json!({}));
        assert_eq!(report.recommendations, json!([]));
        assert_eq!(report.summary, json!("Summary not available"));
    }

    #[test]
    fn test_end_to_end_response() {
        let report = clean_model_output(E2E_RESPONSE).unwrap();
        assert_eq!(report.summary, json!("Sales are rising"));
        assert_eq!(report.key_metrics, json!({"total_rows": 100}));
        assert_eq!(report.trends_and_correlations, json!({}));
        assert_eq!(report.recommendations, json!(["Increase inventory"]));
    }
}
