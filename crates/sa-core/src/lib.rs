//! STEP analysis pipeline
//!
//! Input acquisition, shape loading, geometric analysis and derived metrics
//! on top of a [`sa_cad::CadKernel`].

pub mod analyzer;
pub mod error;
pub mod input;
pub mod loader;
pub mod materials;
pub mod metrics;
pub mod pipeline;

pub use analyzer::{GeometryReport, analyze_shape};
pub use error::{AnalysisError, PipelineResult};
pub use input::{DownloadLimits, RawFileBytes, download, validate_upload, validate_url};
pub use loader::load_step;
pub use materials::{DEFAULT_MATERIAL, MaterialDensityTable};
pub use metrics::{AnalysisResult, MaterialSpec, SizeClass};
pub use pipeline::analyze_step;
