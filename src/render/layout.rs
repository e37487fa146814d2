use std::fmt;

use serde_json::Value;

use super::RenderError;
use crate::report::{CanonicalReport, Recommendations, plain_text};

pub const TITLE: &str = "Analytical Business Report";
pub const NO_KEY_METRICS: &str = "No key metrics available.";
pub const NO_TRENDS: &str = "No trends or correlations identified.";
pub const NO_RECOMMENDATIONS: &str = "No recommendations provided.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Justify,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricRow {
    pub label: String,
    pub value: String,
}

impl fmt::Display for MetricRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} | {}", self.label, self.value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulletItem {
    /// Bold run before the text, e.g. a recommendation title.
    pub lead: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Title(String),
    Heading(String),
    Paragraph {
        lead: Option<String>,
        text: String,
        align: Align,
    },
    MetricsTable(Vec<MetricRow>),
    Bullets(Vec<BulletItem>),
    Spacer(f32),
}

impl Block {
    fn paragraph(text: impl Into<String>, align: Align) -> Self {
        Block::Paragraph {
            lead: None,
            text: text.into(),
            align,
        }
    }
}

/// Lays out the report as a flat sequence of blocks, one section after another.
pub fn layout_report(report: &CanonicalReport) -> Result<Vec<Block>, RenderError> {
    let mut blocks = vec![
        Block::Title(TITLE.to_string()),
        Block::Spacer(25.2),
        Block::Heading("Executive Summary".to_string()),
        Block::paragraph(report.summary_text(), Align::Left),
        Block::Spacer(21.6),
        Block::Heading("Key Metrics".to_string()),
    ];

    let rows = flatten_metrics(&report.key_metrics)?;
    if rows.is_empty() {
        blocks.push(Block::paragraph(NO_KEY_METRICS, Align::Left));
    } else {
        blocks.push(Block::MetricsTable(rows));
    }
    blocks.push(Block::Spacer(25.2));

    blocks.push(Block::Heading("Trends & Correlations".to_string()));
    let trends = report.trends();
    if trends.is_empty() {
        blocks.push(Block::paragraph(NO_TRENDS, Align::Justify));
    }
    for (key, description) in trends {
        blocks.push(Block::Paragraph {
            lead: Some(format!("{}:", title_case(&key))),
            text: description,
            align: Align::Justify,
        });
        blocks.push(Block::Spacer(8.64));
    }
    blocks.push(Block::Spacer(18.0));

    blocks.push(Block::Heading("Recommendations".to_string()));
    let items: Vec<BulletItem> = match report.recommendations() {
        Recommendations::Titled(entries) => entries
            .into_iter()
            .map(|(title, text)| BulletItem {
                lead: Some(format!("{}:", title_case(&title))),
                text,
            })
            .collect(),
        Recommendations::List(texts) => texts
            .into_iter()
            .map(|text| BulletItem { lead: None, text })
            .collect(),
        Recommendations::Single(text) => vec![BulletItem { lead: None, text }],
        Recommendations::Empty => Vec::new(),
    };
    if items.is_empty() {
        blocks.push(Block::paragraph(NO_RECOMMENDATIONS, Align::Justify));
    } else {
        blocks.push(Block::Bullets(items));
    }

    Ok(blocks)
}

/// Expands `key_metrics` into table rows. One level of nested mappings
/// becomes `"Parent – Child"` rows; anything deeper is rejected.
pub fn flatten_metrics(metrics: &Value) -> Result<Vec<MetricRow>, RenderError> {
    let map = match metrics {
        Value::Object(map) => map,
        Value::Null => return Ok(Vec::new()),
        _ => return Err(RenderError::MetricsNotAnObject),
    };

    let mut rows = Vec::with_capacity(map.len());
    for (key, value) in map {
        let label = title_case(key);
        match value {
            Value::Object(children) => {
                for (child_key, child) in children {
                    if child.is_object() {
                        return Err(RenderError::MetricTooDeep(format!("{key}.{child_key}")));
                    }
                    rows.push(MetricRow {
                        label: format!("{label} \u{2013} {}", title_case(child_key)),
                        value: format_value(child),
                    });
                }
            }
            scalar => rows.push(MetricRow {
                label,
                value: format_value(scalar),
            }),
        }
    }

    Ok(rows)
}

fn format_value(value: &Value) -> String {
    match value.as_f64() {
        Some(number) if value.is_number() => format_number(number),
        _ => plain_text(value),
    }
}

/// Two decimals with comma thousands separators, e.g. `1,234,567.89`.
pub fn format_number(number: f64) -> String {
    let fixed = format!("{number:.2}");
    let (sign, unsigned) = match fixed.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", fixed.as_str()),
    };
    let (integer, fraction) = unsigned.split_once('.').unwrap_or((unsigned, "00"));

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (i, digit) in integer.chars().enumerate() {
        if i > 0 && (integer.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    format!("{sign}{grouped}.{fraction}")
}

/// Underscores become spaces; each run of letters starts upper case and
/// continues lower case.
pub fn title_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut in_word = false;
    for c in key.chars() {
        let c = if c == '_' { ' ' } else { c };
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report(value: Value) -> CanonicalReport {
        match value {
            Value::Object(map) => CanonicalReport::from_object(map),
            other => panic!("expected object, got {other}"),
        }
    }

    fn bullets(blocks: &[Block]) -> Vec<&BulletItem> {
        blocks
            .iter()
            .filter_map(|b| match b {
                Block::Bullets(items) => Some(items),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn paragraphs(blocks: &[Block]) -> Vec<&str> {
        blocks
            .iter()
            .filter_map(|b| match b {
                Block::Paragraph { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("total_rows"), "Total Rows");
        assert_eq!(title_case("AVERAGE_order_VALUE"), "Average Order Value");
        assert_eq!(title_case("q3_revenue"), "Q3 Revenue");
        assert_eq!(title_case("revenue (usd)"), "Revenue (Usd)");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(100.0), "100.00");
        assert_eq!(format_number(0.5), "0.50");
        assert_eq!(format_number(1234.5), "1,234.50");
        assert_eq!(format_number(1234567.891), "1,234,567.89");
        assert_eq!(format_number(-98765.4), "-98,765.40");
        assert_eq!(format_number(999.999), "1,000.00");
    }

    #[test]
    fn test_metrics_rows() {
        let rows = flatten_metrics(&json!({
            "total_rows": 100,
            "region": "North",
            "sales": {"q1_total": 1500.5, "q2_total": 2000}
        }))
        .unwrap();

        let rendered: Vec<String> = rows.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec![
                "Total Rows | 100.00",
                "Region | North",
                "Sales \u{2013} Q1 Total | 1,500.50",
                "Sales \u{2013} Q2 Total | 2,000.00",
            ]
        );
    }

    #[test]
    fn test_metrics_deeper_than_one_level_fail() {
        let err = flatten_metrics(&json!({"sales": {"north": {"q1": 1}}})).unwrap_err();
        assert!(matches!(err, RenderError::MetricTooDeep(ref path) if path == "sales.north"));
    }

    #[test]
    fn test_metrics_must_be_mapping() {
        let err = flatten_metrics(&json!(["revenue"])).unwrap_err();
        assert!(matches!(err, RenderError::MetricsNotAnObject));
    }

    #[test]
    fn test_empty_sections_use_placeholders() {
        let blocks = layout_report(&report(json!({"summary": "Quiet quarter"}))).unwrap();
        let texts = paragraphs(&blocks);
        assert_eq!(
            texts,
            vec!["Quiet quarter", NO_KEY_METRICS, NO_TRENDS, NO_RECOMMENDATIONS]
        );
        assert!(!blocks.iter().any(|b| matches!(b, Block::MetricsTable(_))));
    }

    #[test]
    fn test_each_recommendation_shape_renders_one_bullet() {
        for shape in [json!({"a": "do X"}), json!(["do X"]), json!("do X")] {
            let blocks =
                layout_report(&report(json!({ "recommendations": shape.clone() }))).unwrap();
            let items = bullets(&blocks);
            assert_eq!(items.len(), 1, "one bullet for {shape}");
            assert_eq!(items[0].text, "do X");
        }
    }

    #[test]
    fn test_titled_recommendation_has_bold_lead() {
        let blocks =
            layout_report(&report(json!({"recommendations": {"stock_up": "Order more"}}))).unwrap();
        assert_eq!(bullets(&blocks)[0].lead.as_deref(), Some("Stock Up:"));
    }

    #[test]
    fn test_trends_are_justified_with_lead() {
        let blocks = layout_report(&report(json!({
            "trends_and_correlations": {"seasonal_peak": "Sales peak in December"}
        })))
        .unwrap();

        let trend = blocks
            .iter()
            .find(|b| matches!(b, Block::Paragraph { lead: Some(_), .. }))
            .unwrap();
        assert_eq!(
            trend,
            &Block::Paragraph {
                lead: Some("Seasonal Peak:".to_string()),
                text: "Sales peak in December".to_string(),
                align: Align::Justify,
            }
        );
    }

    #[test]
    fn test_end_to_end_layout() {
        let blocks = layout_report(&report(json!({
            "summary": "Sales are rising",
            "key_metrics": {"total_rows": 100},
            "trends_and_correlations": {},
            "recommendations": ["Increase inventory"]
        })))
        .unwrap();

        assert_eq!(blocks[0], Block::Title(TITLE.to_string()));
        let table: Vec<String> = blocks
            .iter()
            .find_map(|b| match b {
                Block::MetricsTable(rows) => Some(rows.iter().map(ToString::to_string).collect()),
                _ => None,
            })
            .unwrap();
        assert_eq!(table, vec!["Total Rows | 100.00"]);

        let items = bullets(&blocks);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].text, "Increase inventory");
        assert!(paragraphs(&blocks).contains(&NO_TRENDS));
    }
}
