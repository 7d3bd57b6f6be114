//! Geometric analysis of a loaded shape

use std::panic::{self, AssertUnwindSafe};

use sa_cad::{BoundingBox, ShapeHandle, ShapeKind};

use crate::error::{AnalysisError, PipelineResult};

/// Share of the bounding-box volume assumed when the kernel cannot measure
/// a solid
pub const APPROXIMATE_FILL_FACTOR: f64 = 0.85;

/// Cubic millimeters to cubic meters
pub const MM3_TO_M3: f64 = 1e-9;

/// Raw measurements of one shape, in millimeters
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryReport {
    /// Extents along x, y, z (unsorted, non-negative)
    pub extents_mm: [f64; 3],
    pub volume_mm3: f64,
    /// Volume is the bounding-box estimate, not a measurement
    pub approximate: bool,
    pub face_count: usize,
    pub edge_count: usize,
}

impl GeometryReport {
    pub fn volume_m3(&self) -> f64 {
        self.volume_mm3 * MM3_TO_M3
    }
}

/// Measure a shape
///
/// Bounding-box and topology failures are fatal. Volume failures fall back
/// to [`APPROXIMATE_FILL_FACTOR`] of the bounding-box volume.
pub fn analyze_shape(shape: &ShapeHandle<'_>) -> PipelineResult<GeometryReport> {
    let kernel = shape.kernel();

    let mut bbox = BoundingBox::empty();
    kernel
        .add_to_box(shape, &mut bbox, true)
        .map_err(|e| AnalysisError::analysis(format!("Bounding box failed: {}", e)))?;
    let extents_mm = bbox.extents();

    let (volume_mm3, approximate) = match measure_volume(shape) {
        Some(volume) => (volume, false),
        None => (bbox.volume() * APPROXIMATE_FILL_FACTOR, true),
    };

    let face_count = count_entities(shape, ShapeKind::Face)?;
    let edge_count = count_entities(shape, ShapeKind::Edge)?;

    Ok(GeometryReport {
        extents_mm,
        volume_mm3,
        approximate,
        face_count,
        edge_count,
    })
}

/// Kernel volume, or `None` when it is unusable
fn measure_volume(shape: &ShapeHandle<'_>) -> Option<f64> {
    let kernel = shape.kernel();
    match panic::catch_unwind(AssertUnwindSafe(|| kernel.volume_properties(shape))) {
        Ok(Ok(props)) if props.mass().is_finite() && props.mass() > 0.0 => Some(props.mass()),
        Ok(Ok(props)) => {
            tracing::warn!(
                "Kernel reported volume {}; using bounding-box estimate",
                props.mass()
            );
            None
        }
        Ok(Err(e)) => {
            tracing::warn!("Volume computation failed: {}; using bounding-box estimate", e);
            None
        }
        Err(_) => {
            tracing::warn!("Volume computation panicked; using bounding-box estimate");
            None
        }
    }
}

/// Count sub-entities of one kind with a single pass of the explorer
pub fn count_entities(shape: &ShapeHandle<'_>, kind: ShapeKind) -> PipelineResult<usize> {
    let mut explorer = shape
        .kernel()
        .explore(shape, kind)
        .map_err(|e| AnalysisError::analysis(format!("Topology traversal failed: {}", e)))?;

    let mut count = 0;
    while explorer.more() {
        count += 1;
        explorer.advance();
    }
    Ok(count)
}
