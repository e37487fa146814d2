use std::fmt;
use std::path::PathBuf;

use tokio::task::JoinSet;

use crate::analysis::{AnalysisError, Analyzers, ArtifactAnalysis, ArtifactKind};

const BLOCK_SEPARATOR: &str = "\n\n";

/// Ordered insight blocks handed to the narrative model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    blocks: Vec<ArtifactAnalysis>,
}

impl Context {
    pub fn new(blocks: Vec<ArtifactAnalysis>) -> Self {
        Self { blocks }
    }

    pub fn blocks(&self) -> &[ArtifactAnalysis] {
        &self.blocks
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, block) in self.blocks.iter().enumerate() {
            if i > 0 {
                f.write_str(BLOCK_SEPARATOR)?;
            }
            write!(f, "{}{}", block.kind.context_prefix(), block.insight)?;
        }
        Ok(())
    }
}

/// Analyzes every artifact concurrently and assembles the insights in input
/// order, images first. The first failure aborts the remaining analyses.
#[tracing::instrument(
    name = "pipeline_stage context",
    skip(analyzers, images, tables),
    fields(
        pipeline.stage = "context",
        context.images = images.len(),
        context.tables = tables.len(),
        context.insight_chars,
    )
)]
pub async fn build_context(
    analyzers: &Analyzers,
    images: &[PathBuf],
    tables: &[PathBuf],
) -> Result<Context, AnalysisError> {
    let artifacts: Vec<(ArtifactKind, PathBuf)> = images
        .iter()
        .map(|p| (ArtifactKind::Image, p.clone()))
        .chain(tables.iter().map(|p| (ArtifactKind::Tabular, p.clone())))
        .collect();

    let mut tasks = JoinSet::new();
    for (index, (kind, path)) in artifacts.into_iter().enumerate() {
        let analyzers = analyzers.clone();
        tasks.spawn(async move {
            let insight = match kind {
                ArtifactKind::Image => analyzers.image.analyze_image(&path).await,
                ArtifactKind::Tabular => analyzers.tabular.analyze_tabular(&path).await,
            };
            (index, kind, insight)
        });
    }

    let mut slots: Vec<Option<ArtifactAnalysis>> = vec![None; tasks.len()];
    while let Some(joined) = tasks.join_next().await {
        let (index, kind, insight) = joined.map_err(|e| AnalysisError::Task(e.to_string()))?;
        // Returning here drops the JoinSet, which aborts the tasks still running.
        let insight = insight?;
        slots[index] = Some(ArtifactAnalysis { kind, insight });
    }

    let context = Context::new(slots.into_iter().flatten().collect());

    // Serialized size is recorded once, as narrative.prompt_chars.
    let insight_chars: usize = context.blocks().iter().map(|b| b.insight.len()).sum();
    tracing::Span::current().record("context.insight_chars", insight_chars);

    Ok(context)
}
