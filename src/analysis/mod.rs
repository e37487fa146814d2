//! Per-artifact analysis capabilities consumed by the context aggregator.

pub mod image;
pub mod tabular;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

pub use image::VisionCaptioner;
pub use tabular::CsvAnalyzer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Image,
    Tabular,
}

impl ArtifactKind {
    pub fn label(self) -> &'static str {
        match self {
            ArtifactKind::Image => "image",
            ArtifactKind::Tabular => "tabular",
        }
    }

    /// Prefix placed before an insight of this kind in the model context.
    pub fn context_prefix(self) -> &'static str {
        match self {
            ArtifactKind::Image => "Image Insight: ",
            ArtifactKind::Tabular => "CSV Insight:\n",
        }
    }

    /// Classifies an uploaded file by its declared content type, falling back
    /// to the file extension for generic or legacy types.
    pub fn classify(content_type: &str, filename: &str) -> Option<Self> {
        let content_type = content_type.trim().to_ascii_lowercase();
        if content_type.starts_with("image/") {
            return Some(ArtifactKind::Image);
        }
        if matches!(
            content_type.as_str(),
            "text/csv" | "application/csv" | "text/tab-separated-values"
        ) {
            return Some(ArtifactKind::Tabular);
        }
        if !matches!(
            content_type.as_str(),
            "" | "application/octet-stream" | "application/vnd.ms-excel" | "text/plain"
        ) {
            return None;
        }

        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)?;
        match extension.as_str() {
            "csv" | "tsv" => Some(ArtifactKind::Tabular),
            "png" | "jpg" | "jpeg" | "gif" | "webp" => Some(ArtifactKind::Image),
            _ => None,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One artifact's insight text, tagged with the kind of artifact it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactAnalysis {
    pub kind: ArtifactKind,
    pub insight: String,
}

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("cannot read artifact {}: {reason}", .path.display())]
    Unreadable { path: PathBuf, reason: String },

    #[error("analysis service unavailable: {0}")]
    Upstream(String),

    #[error("analysis task failed: {0}")]
    Task(String),
}

impl AnalysisError {
    pub fn unreadable(path: &Path, reason: impl ToString) -> Self {
        AnalysisError::Unreadable {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait::async_trait]
pub trait ImageAnalyzer: Send + Sync {
    async fn analyze_image(&self, path: &Path) -> Result<String, AnalysisError>;
}

#[async_trait::async_trait]
pub trait TabularAnalyzer: Send + Sync {
    async fn analyze_tabular(&self, path: &Path) -> Result<String, AnalysisError>;
}

#[derive(Clone)]
pub struct Analyzers {
    pub image: Arc<dyn ImageAnalyzer>,
    pub tabular: Arc<dyn TabularAnalyzer>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_content_type() {
        assert_eq!(ArtifactKind::classify("image/png", "chart.png"), Some(ArtifactKind::Image));
        assert_eq!(ArtifactKind::classify("IMAGE/JPEG", "x"), Some(ArtifactKind::Image));
        assert_eq!(ArtifactKind::classify("text/csv", "sales.csv"), Some(ArtifactKind::Tabular));
        assert_eq!(
            ArtifactKind::classify("text/tab-separated-values", "sales.tsv"),
            Some(ArtifactKind::Tabular)
        );
    }

    #[test]
    fn test_classify_falls_back_to_extension_for_generic_types() {
        assert_eq!(
            ArtifactKind::classify("application/vnd.ms-excel", "sales.csv"),
            Some(ArtifactKind::Tabular)
        );
        assert_eq!(
            ArtifactKind::classify("application/octet-stream", "chart.JPG"),
            Some(ArtifactKind::Image)
        );
        assert_eq!(ArtifactKind::classify("application/octet-stream", "notes"), None);
    }

    #[test]
    fn test_classify_rejects_unsupported_types() {
        assert_eq!(ArtifactKind::classify("application/pdf", "report.csv"), None);
        assert_eq!(ArtifactKind::classify("text/plain", "notes.txt"), None);
    }

    #[test]
    fn test_unreadable_message_names_path() {
        let err = AnalysisError::unreadable(Path::new("/data/sales.csv"), "unequal row lengths");
        assert_eq!(
            err.to_string(),
            "cannot read artifact /data/sales.csv: unequal row lengths"
        );
    }

    #[test]
    fn test_labels() {
        assert_eq!(ArtifactKind::Image.label(), "image");
        assert_eq!(ArtifactKind::Tabular.to_string(), "tabular");
    }
}
