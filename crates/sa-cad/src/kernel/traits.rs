//! CAD Kernel trait definitions
//!
//! These traits define the capability set that every geometry kernel binding
//! must provide so the analysis pipeline never depends on a particular backend.

use std::fmt;
use std::path::Path;

use glam::DVec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a shape held by a kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShapeId(Uuid);

impl ShapeId {
    /// Create a fresh shape ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ShapeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Kind of topological entity visited by an [`Explorer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeKind {
    Face,
    Edge,
}

/// Completion status reported by a STEP reader
///
/// Only [`ReadStatus::Done`] means the file was parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadStatus {
    /// Nothing was read (e.g. the file holds no data section)
    Void,
    /// The file was read successfully
    Done,
    /// The file could not be parsed
    Error,
    /// The reader failed before parsing
    Fail,
    /// Reading was interrupted
    Stop,
}

impl ReadStatus {
    /// Whether this is the success sentinel
    pub fn is_done(self) -> bool {
        self == ReadStatus::Done
    }
}

/// How a kernel build treats progress-range arguments on long calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProgressSupport {
    /// A progress range must be passed
    Required,
    /// A progress range may be passed or omitted
    #[default]
    Optional,
    /// Passing a progress range is an error
    Rejected,
}

impl ProgressSupport {
    /// Whether callers should hand over a progress range
    pub fn wants_progress(self) -> bool {
        !matches!(self, ProgressSupport::Rejected)
    }
}

/// Progress indicator handed to long-running kernel calls
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressRange;

impl ProgressRange {
    pub fn new() -> Self {
        Self
    }
}

/// Error type for CAD kernel operations
#[derive(Debug, Clone, Error)]
pub enum CadError {
    #[error("Kernel not available: {0}")]
    KernelNotAvailable(String),

    #[error("File I/O error: {0}")]
    FileIo(String),

    #[error("STEP import failed: {0}")]
    StepImport(String),

    #[error("Shape not found: {0}")]
    ShapeNotFound(ShapeId),

    #[error("Mass properties failed: {0}")]
    MassProperties(String),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

/// Result type for CAD operations
pub type CadResult<T> = Result<T, CadError>;

/// Axis-aligned bounding box accumulator, in model units (mm)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Minimum corner of the bounding box
    pub min: DVec3,
    /// Maximum corner of the bounding box
    pub max: DVec3,
}

impl BoundingBox {
    /// Creates a bounding box from min and max points.
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Creates an empty (inverted) bounding box.
    pub fn empty() -> Self {
        Self {
            min: DVec3::splat(f64::INFINITY),
            max: DVec3::splat(f64::NEG_INFINITY),
        }
    }

    /// Returns true if nothing has been added to the box yet.
    pub fn is_void(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Grows the box to contain `point`.
    pub fn add_point(&mut self, point: DVec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Grows the box to contain `other`.
    pub fn merge(&mut self, other: &BoundingBox) {
        if other.is_void() {
            return;
        }
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Returns `(xmin, ymin, zmin, xmax, ymax, zmax)`.
    pub fn get(&self) -> [f64; 6] {
        [
            self.min.x, self.min.y, self.min.z, self.max.x, self.max.y, self.max.z,
        ]
    }

    /// Returns the extents along x, y and z, clamped to be non-negative.
    ///
    /// A void box has zero extents.
    pub fn extents(&self) -> [f64; 3] {
        if self.is_void() {
            return [0.0; 3];
        }
        let [xmin, ymin, zmin, xmax, ymax, zmax] = self.get();
        [
            clamp_extent(xmax - xmin),
            clamp_extent(ymax - ymin),
            clamp_extent(zmax - zmin),
        ]
    }

    /// Returns the volume enclosed by the box.
    pub fn volume(&self) -> f64 {
        let [x, y, z] = self.extents();
        x * y * z
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}

fn clamp_extent(value: f64) -> f64 {
    if value.is_finite() { value.max(0.0) } else { 0.0 }
}

/// Volumetric mass properties of a shape
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MassProperties {
    mass: f64,
}

impl MassProperties {
    pub fn new(mass: f64) -> Self {
        Self { mass }
    }

    /// Integrated mass; equals the volume under unit density
    pub fn mass(&self) -> f64 {
        self.mass
    }
}

/// A STEP reader created by a kernel
///
/// Use it in order: [`read_file`](StepReader::read_file), then
/// [`transfer_roots`](StepReader::transfer_roots), then
/// [`one_shape`](StepReader::one_shape).
pub trait StepReader {
    /// Parse the STEP file at `path`
    fn read_file(&mut self, path: &Path) -> CadResult<ReadStatus>;

    /// Convert all parsed roots into kernel shapes, returning how many
    /// roots were transferred
    fn transfer_roots(&mut self, progress: Option<&ProgressRange>) -> CadResult<usize>;

    /// Combine the transferred roots into a single shape stored by the kernel
    fn one_shape(&mut self) -> CadResult<ShapeId>;
}

/// Cursor over the sub-entities of a shape of one [`ShapeKind`]
///
/// A new explorer is positioned at the first match.
pub trait Explorer {
    /// Whether the cursor points at an entity
    fn more(&self) -> bool;

    /// Move to the next entity
    fn advance(&mut self);
}

/// The main CAD kernel trait
///
/// Implementations of this trait provide the actual geometry operations
/// using different backends (OpenCASCADE, Truck, etc.)
pub trait CadKernel: Send + Sync {
    /// Get the name of this kernel
    fn name(&self) -> &str;

    /// Check if the kernel is available
    fn is_available(&self) -> bool;

    /// How this build treats progress-range arguments
    fn progress_support(&self) -> ProgressSupport {
        ProgressSupport::Optional
    }

    /// Create a STEP reader
    fn step_reader(&self) -> CadResult<Box<dyn StepReader + '_>>;

    /// Accumulate a shape into a bounding box
    ///
    /// # Arguments
    /// * `shape` - The shape to measure
    /// * `bbox` - The box to grow
    /// * `use_triangulation` - Use the shape's triangulation where available
    fn add_to_box(
        &self,
        shape: &ShapeHandle<'_>,
        bbox: &mut BoundingBox,
        use_triangulation: bool,
    ) -> CadResult<()>;

    /// Compute volumetric mass properties of a shape
    fn volume_properties(&self, shape: &ShapeHandle<'_>) -> CadResult<MassProperties>;

    /// Create an explorer over the entities of `kind` in a shape
    fn explore(
        &self,
        shape: &ShapeHandle<'_>,
        kind: ShapeKind,
    ) -> CadResult<Box<dyn Explorer + '_>>;

    /// Drop the kernel's storage for a shape
    fn release(&self, shape: ShapeId);

    /// Number of shapes currently stored by the kernel
    fn live_shapes(&self) -> usize;
}

/// Scoped ownership of a kernel shape
///
/// The shape is released from the kernel when the handle is dropped.
pub struct ShapeHandle<'k> {
    id: ShapeId,
    kernel: &'k dyn CadKernel,
}

impl<'k> ShapeHandle<'k> {
    /// Take ownership of a shape stored in `kernel`
    pub fn new(kernel: &'k dyn CadKernel, id: ShapeId) -> Self {
        Self { id, kernel }
    }

    pub fn id(&self) -> ShapeId {
        self.id
    }

    /// The kernel that owns the shape
    pub fn kernel(&self) -> &'k dyn CadKernel {
        self.kernel
    }
}

impl fmt::Debug for ShapeHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShapeHandle")
            .field("id", &self.id)
            .field("kernel", &self.kernel.name())
            .finish()
    }
}

impl Drop for ShapeHandle<'_> {
    fn drop(&mut self) {
        self.kernel.release(self.id);
    }
}

/// Cursor over a fixed number of entities
///
/// Used by backends that know their entity counts up front.
#[derive(Debug, Clone)]
pub struct CountingExplorer {
    index: usize,
    len: usize,
}

impl CountingExplorer {
    pub fn new(len: usize) -> Self {
        Self { index: 0, len }
    }
}

impl Explorer for CountingExplorer {
    fn more(&self) -> bool {
        self.index < self.len
    }

    fn advance(&mut self) {
        if self.more() {
            self.index += 1;
        }
    }
}

/// A null kernel that always returns errors (used when no kernel is available)
#[derive(Debug, Default)]
pub struct NullKernel;

impl CadKernel for NullKernel {
    fn name(&self) -> &str {
        "null"
    }

    fn is_available(&self) -> bool {
        false
    }

    fn step_reader(&self) -> CadResult<Box<dyn StepReader + '_>> {
        Err(CadError::KernelNotAvailable(
            "No CAD kernel available for STEP import".into(),
        ))
    }

    fn add_to_box(
        &self,
        _shape: &ShapeHandle<'_>,
        _bbox: &mut BoundingBox,
        _use_triangulation: bool,
    ) -> CadResult<()> {
        Err(CadError::KernelNotAvailable(
            "No CAD kernel available".into(),
        ))
    }

    fn volume_properties(&self, _shape: &ShapeHandle<'_>) -> CadResult<MassProperties> {
        Err(CadError::KernelNotAvailable(
            "No CAD kernel available".into(),
        ))
    }

    fn explore(
        &self,
        _shape: &ShapeHandle<'_>,
        _kind: ShapeKind,
    ) -> CadResult<Box<dyn Explorer + '_>> {
        Err(CadError::KernelNotAvailable(
            "No CAD kernel available".into(),
        ))
    }

    fn release(&self, _shape: ShapeId) {}

    fn live_shapes(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_box_is_void() {
        let bbox = BoundingBox::empty();
        assert!(bbox.is_void());
        assert_eq!(bbox.extents(), [0.0, 0.0, 0.0]);
        assert_eq!(bbox.volume(), 0.0);
    }

    #[test]
    fn test_box_accumulates_points() {
        let mut bbox = BoundingBox::empty();
        bbox.add_point(DVec3::new(1.0, -2.0, 3.0));
        bbox.add_point(DVec3::new(4.0, 2.0, 3.5));

        assert!(!bbox.is_void());
        assert_eq!(bbox.get(), [1.0, -2.0, 3.0, 4.0, 2.0, 3.5]);
        assert_eq!(bbox.extents(), [3.0, 4.0, 0.5]);
    }

    #[test]
    fn test_merge_ignores_void_box() {
        let mut bbox = BoundingBox::new(DVec3::ZERO, DVec3::ONE);
        bbox.merge(&BoundingBox::empty());
        assert_eq!(bbox.extents(), [1.0, 1.0, 1.0]);

        bbox.merge(&BoundingBox::new(DVec3::splat(-1.0), DVec3::ZERO));
        assert_eq!(bbox.extents(), [2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_non_finite_extent_clamps_to_zero() {
        let bbox = BoundingBox::new(DVec3::ZERO, DVec3::new(f64::INFINITY, 1.0, 1.0));
        assert_eq!(bbox.extents(), [0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_counting_explorer_visits_each_entity_once() {
        let mut explorer = CountingExplorer::new(3);
        let mut count = 0;
        while explorer.more() {
            count += 1;
            explorer.advance();
        }
        assert_eq!(count, 3);

        explorer.advance();
        assert!(!explorer.more());
    }

    #[test]
    fn test_read_status_sentinel() {
        assert!(ReadStatus::Done.is_done());
        assert!(!ReadStatus::Void.is_done());
        assert!(!ReadStatus::Error.is_done());
    }

    #[test]
    fn test_progress_support() {
        assert!(ProgressSupport::Required.wants_progress());
        assert!(ProgressSupport::Optional.wants_progress());
        assert!(!ProgressSupport::Rejected.wants_progress());
    }

    #[test]
    fn test_null_kernel_is_unavailable() {
        let kernel = NullKernel;
        assert!(!kernel.is_available());
        assert!(matches!(
            kernel.step_reader(),
            Err(CadError::KernelNotAvailable(_))
        ));
    }
}
