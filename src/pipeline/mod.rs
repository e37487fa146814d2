pub mod context;
pub mod narrative;
pub mod normalize;
pub mod orchestrator;

pub use orchestrator::{ReportPipeline, render_to_bytes};
