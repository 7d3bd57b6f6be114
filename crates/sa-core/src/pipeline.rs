//! End-to-end analysis of one STEP file

use std::path::Path;
use std::time::Instant;

use sa_cad::CadKernel;

use crate::analyzer::analyze_shape;
use crate::error::PipelineResult;
use crate::input::RawFileBytes;
use crate::loader::load_step;
use crate::materials::MaterialDensityTable;
use crate::metrics::{AnalysisResult, MaterialSpec, derive_metrics};

/// Load, measure and derive metrics for one file
///
/// Blocking. The shape is released and the scratch file removed before this
/// returns, whatever the outcome.
pub fn analyze_step(
    kernel: &dyn CadKernel,
    bytes: &RawFileBytes,
    spec: &MaterialSpec,
    scratch_dir: Option<&Path>,
) -> PipelineResult<AnalysisResult> {
    let start = Instant::now();

    let report = {
        let shape = load_step(kernel, bytes, scratch_dir)?;
        analyze_shape(&shape)?
    };
    let result = derive_metrics(
        &report,
        spec,
        MaterialDensityTable::standard(),
        kernel.name(),
    );

    tracing::debug!(
        "Analyzed {} bytes in {:?}: {} x {} x {} mm, {} faces{}",
        bytes.len(),
        start.elapsed(),
        result.length_mm,
        result.width_mm,
        result.height_mm,
        result.face_count,
        if result.approximate { " (approximate volume)" } else { "" }
    );
    Ok(result)
}
