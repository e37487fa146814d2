//! The canonical four-section report recovered from model output.
//!
//! Section values stay as JSON so the report serializes back exactly as the
//! model shaped it; the accessors below resolve each section's shape once for
//! rendering.

use serde::Serialize;
use serde_json::{Map, Value};

pub const KEY_METRICS: &str = "key_metrics";
pub const TRENDS_AND_CORRELATIONS: &str = "trends_and_correlations";
pub const RECOMMENDATIONS: &str = "recommendations";
pub const SUMMARY: &str = "summary";

pub const DEFAULT_SUMMARY: &str = "Summary not available";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalReport {
    pub key_metrics: Value,
    pub trends_and_correlations: Value,
    pub recommendations: Value,
    pub summary: Value,
}

impl Default for CanonicalReport {
    fn default() -> Self {
        Self {
            key_metrics: Value::Object(Map::new()),
            trends_and_correlations: Value::Object(Map::new()),
            recommendations: Value::Array(Vec::new()),
            summary: Value::String(DEFAULT_SUMMARY.to_string()),
        }
    }
}

/// Shape of the `recommendations` section.
#[derive(Debug, Clone, PartialEq)]
pub enum Recommendations {
    Titled(Vec<(String, String)>),
    List(Vec<String>),
    Single(String),
    Empty,
}

impl CanonicalReport {
    /// Builds a report from a parsed object, filling absent or `null`
    /// sections with their defaults and dropping unknown keys.
    pub fn from_object(mut object: Map<String, Value>) -> Self {
        let defaults = Self::default();
        let mut take = |key: &str, default: Value| match object.remove(key) {
            Some(Value::Null) | None => default,
            Some(value) => value,
        };

        Self {
            key_metrics: take(KEY_METRICS, defaults.key_metrics),
            trends_and_correlations: take(TRENDS_AND_CORRELATIONS, defaults.trends_and_correlations),
            recommendations: take(RECOMMENDATIONS, defaults.recommendations),
            summary: take(SUMMARY, defaults.summary),
        }
    }

    pub fn summary_text(&self) -> String {
        match &self.summary {
            Value::Object(map) => ["overview", "overall_insight"]
                .iter()
                .filter_map(|key| map.get(*key))
                .map(plain_text)
                .find(|text| !text.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SUMMARY.to_string()),
            Value::Null => DEFAULT_SUMMARY.to_string(),
            Value::String(text) if text.trim().is_empty() => DEFAULT_SUMMARY.to_string(),
            other => plain_text(other),
        }
    }

    /// Trend entries in model order. Anything other than a mapping yields none.
    pub fn trends(&self) -> Vec<(String, String)> {
        match &self.trends_and_correlations {
            Value::Object(map) => map
                .iter()
                .map(|(key, description)| (key.clone(), plain_text(description)))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn recommendations(&self) -> Recommendations {
        match &self.recommendations {
            Value::Object(map) if !map.is_empty() => Recommendations::Titled(
                map.iter()
                    .map(|(title, text)| (title.clone(), plain_text(text)))
                    .collect(),
            ),
            Value::Array(items) if !items.is_empty() => {
                Recommendations::List(items.iter().map(plain_text).collect())
            }
            Value::String(text) if !text.trim().is_empty() => {
                Recommendations::Single(text.clone())
            }
            _ => Recommendations::Empty,
        }
    }
}

/// Text form of a JSON value as it should appear in a document.
pub fn plain_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => "N/A".to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::Array(items) => items.iter().map(plain_text).collect::<Vec<_>>().join(", "),
        Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn test_from_object_fills_missing_sections() {
        let report = CanonicalReport::from_object(object(json!({"summary": "ok"})));
        assert_eq!(report.key_metrics, json!({}));
        assert_eq!(report.trends_and_correlations, json!({}));
        assert_eq!(report.recommendations, json!([]));
        assert_eq!(report.summary, json!("ok"));
    }

    #[test]
    fn test_from_object_treats_null_as_absent() {
        let report = CanonicalReport::from_object(object(json!({"summary": null, "key_metrics": null})));
        assert_eq!(report.summary, json!(DEFAULT_SUMMARY));
        assert_eq!(report.key_metrics, json!({}));
    }

    #[test]
    fn test_serializes_exactly_four_keys() {
        let report = CanonicalReport::from_object(object(json!({
            "summary": "s",
            "title": "dropped",
            "notes": ["dropped"]
        })));
        let value = serde_json::to_value(&report).unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![KEY_METRICS, TRENDS_AND_CORRELATIONS, RECOMMENDATIONS, SUMMARY]
        );
    }

    #[test]
    fn test_summary_prefers_overview_then_overall_insight() {
        let both = CanonicalReport {
            summary: json!({"overall_insight": "second", "overview": "first"}),
            ..Default::default()
        };
        assert_eq!(both.summary_text(), "first");

        let insight_only = CanonicalReport {
            summary: json!({"overall_insight": "second"}),
            ..Default::default()
        };
        assert_eq!(insight_only.summary_text(), "second");

        let neither = CanonicalReport {
            summary: json!({"highlights": "ignored"}),
            ..Default::default()
        };
        assert_eq!(neither.summary_text(), DEFAULT_SUMMARY);
    }

    #[test]
    fn test_summary_blank_string_uses_default() {
        let report = CanonicalReport {
            summary: json!("   "),
            ..Default::default()
        };
        assert_eq!(report.summary_text(), DEFAULT_SUMMARY);
    }

    #[test]
    fn test_recommendation_shapes() {
        let titled = CanonicalReport {
            recommendations: json!({"stock_up": "Increase inventory"}),
            ..Default::default()
        };
        assert_eq!(
            titled.recommendations(),
            Recommendations::Titled(vec![(
                "stock_up".to_string(),
                "Increase inventory".to_string()
            )])
        );

        let list = CanonicalReport {
            recommendations: json!(["Increase inventory", 42]),
            ..Default::default()
        };
        assert_eq!(
            list.recommendations(),
            Recommendations::List(vec!["Increase inventory".to_string(), "42".to_string()])
        );

        let single = CanonicalReport {
            recommendations: json!("Increase inventory"),
            ..Default::default()
        };
        assert_eq!(
            single.recommendations(),
            Recommendations::Single("Increase inventory".to_string())
        );

        for empty in [json!([]), json!({}), json!(""), json!(7)] {
            let report = CanonicalReport {
                recommendations: empty,
                ..Default::default()
            };
            assert_eq!(report.recommendations(), Recommendations::Empty);
        }
    }

    #[test]
    fn test_trends_keep_model_order() {
        let report = CanonicalReport {
            trends_and_correlations: json!({"zeta": "last letter", "alpha": "first letter"}),
            ..Default::default()
        };
        let keys: Vec<String> = report.trends().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_trends_ignore_non_mapping() {
        let report = CanonicalReport {
            trends_and_correlations: json!(["rising"]),
            ..Default::default()
        };
        assert!(report.trends().is_empty());
    }
}
