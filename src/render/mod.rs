pub mod fonts;
pub mod layout;
pub mod pdf;
pub mod target;

use serde_json::Value;
use thiserror::Error;

use crate::report::CanonicalReport;
use crate::telemetry::metrics::{REPORT_DOCUMENT_BYTES, REPORT_DOCUMENT_PAGES};

pub use target::{FileTarget, WritableTarget};

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("report must be a JSON object")]
    NotAnObject,

    #[error("key_metrics must be a mapping")]
    MetricsNotAnObject,

    #[error("key metric {0} is nested more than one level deep")]
    MetricTooDeep(String),

    #[error("document encoding failed: {0}")]
    Encode(String),

    #[error("document could not be written: {0}")]
    Io(#[from] std::io::Error),
}

/// Lays out and typesets the report, then hands the finished bytes to
/// `target` in a single commit.
#[tracing::instrument(
    name = "pipeline_stage render",
    skip(report, target),
    fields(
        pipeline.stage = "render",
        document.bytes,
        document.pages,
    )
)]
pub fn render_document<T>(report: &CanonicalReport, target: &mut T) -> Result<(), RenderError>
where
    T: WritableTarget + ?Sized,
{
    let blocks = layout::layout_report(report)?;
    let rendered = pdf::write_pdf(&blocks)?;

    target.commit(&rendered.bytes)?;

    REPORT_DOCUMENT_BYTES.record(rendered.bytes.len() as f64, &[]);
    REPORT_DOCUMENT_PAGES.record(rendered.page_count as f64, &[]);

    let span = tracing::Span::current();
    span.record("document.bytes", rendered.bytes.len());
    span.record("document.pages", rendered.page_count);

    Ok(())
}

/// Renders an arbitrary JSON value, which must be an object; missing
/// sections take their defaults.
pub fn render_json<T>(value: &Value, target: &mut T) -> Result<(), RenderError>
where
    T: WritableTarget + ?Sized,
{
    let Value::Object(map) = value else {
        return Err(RenderError::NotAnObject);
    };
    render_document(&CanonicalReport::from_object(map.clone()), target)
}
