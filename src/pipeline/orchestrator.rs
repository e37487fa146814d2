use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use opentelemetry::trace::TraceContextExt;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::analysis::Analyzers;
use crate::error::AppError;
use crate::llm::LlmClient;
use crate::render::{self, FileTarget};
use crate::report::CanonicalReport;
use crate::telemetry::metrics::{REPORT_ARTIFACTS, REPORT_GENERATION_DURATION};

use super::context::build_context;
use super::narrative::{NarrativeSettings, generate_report};
use super::normalize::clean_model_output;

/// Request-scoped report synthesis over shared, read-mostly clients.
pub struct ReportPipeline {
    pub analyzers: Analyzers,
    pub llm_client: Arc<LlmClient>,
    pub narrative: NarrativeSettings,
    pub generation_timeout: Duration,
}

impl ReportPipeline {
    #[tracing::instrument(
        name = "pipeline report",
        skip(self, images, tables),
        fields(
            report.images = images.len(),
            report.tables = tables.len(),
            report.trace_id,
            report.duration_ms,
        )
    )]
    pub async fn run(
        &self,
        images: &[PathBuf],
        tables: &[PathBuf],
    ) -> Result<CanonicalReport, AppError> {
        if images.is_empty() && tables.is_empty() {
            return Err(AppError::Validation("no artifacts supplied".to_string()));
        }

        let start = Instant::now();

        let span = tracing::Span::current();
        let trace_id = span.context().span().span_context().trace_id().to_string();
        span.record("report.trace_id", trace_id.as_str());

        // Stage 1: per-artifact analysis merged into one context
        let context = build_context(&self.analyzers, images, tables).await?;

        // Stage 2: one bounded model call
        let raw = tokio::time::timeout(
            self.generation_timeout,
            generate_report(&self.llm_client, &self.narrative, &context),
        )
        .await
        .map_err(|_| {
            AppError::UpstreamUnavailable(format!(
                "narrative generation timed out after {}s",
                self.generation_timeout.as_secs()
            ))
        })??;

        // Stage 3: recover the canonical report
        let report = clean_model_output(&raw)?;

        let duration = start.elapsed();
        REPORT_GENERATION_DURATION.record(duration.as_secs_f64(), &[]);
        REPORT_ARTIFACTS.record((images.len() + tables.len()) as f64, &[]);
        span.record("report.duration_ms", duration.as_millis() as i64);

        tracing::info!(
            artifacts = images.len() + tables.len(),
            duration_ms = duration.as_millis() as u64,
            "report generated"
        );

        Ok(report)
    }

    /// Renders on the blocking pool and commits the document to `path`.
    pub async fn render_to_file(
        &self,
        report: CanonicalReport,
        path: &Path,
    ) -> Result<PathBuf, AppError> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(render::RenderError::from)?;
            }
            let mut target = FileTarget::new(&path);
            render::render_document(&report, &mut target)?;
            Ok::<_, render::RenderError>(path)
        })
        .await
        .map_err(|e| AppError::Internal(format!("render task failed: {e}")))?
        .map_err(AppError::from)
    }
}

/// Renders into memory on the blocking pool.
pub async fn render_to_bytes(report: CanonicalReport) -> Result<Vec<u8>, AppError> {
    tokio::task::spawn_blocking(move || {
        let mut buf = Vec::new();
        render::render_document(&report, &mut buf)?;
        Ok::<_, render::RenderError>(buf)
    })
    .await
    .map_err(|e| AppError::Internal(format!("render task failed: {e}")))?
    .map_err(AppError::from)
}
