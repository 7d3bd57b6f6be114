//! Truck CAD Kernel Backend
//!
//! Pure Rust B-Rep kernel using the Truck library.
//!
//! STEP shells are converted with `truck-stepio` and tessellated once at
//! transfer time; bounding boxes and volumes are measured on that
//! triangulation.
//!
//! Edges are counted once per face boundary that uses them, the way a
//! `TopExp_Explorer` over a solid visits them.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use glam::DVec3;
use parking_lot::Mutex;
use truck_meshalgo::prelude::*;
use truck_polymesh::PolygonMesh;
use truck_stepio::r#in::{Table, ruststep};

use super::{
    BoundingBox, CadError, CadKernel, CadResult, CountingExplorer, Explorer, MassProperties,
    ProgressRange, ReadStatus, ShapeHandle, ShapeId, ShapeKind, StepReader,
};

/// Tolerance of the first, coarse triangulation pass
const COARSE_TOLERANCE: f64 = 0.01;

/// Final tolerance as a fraction of the bounding-box diameter
const RELATIVE_TOLERANCE: f64 = 0.001;

/// A transferred shape: tessellated shells plus their topology counts
struct TruckShape {
    meshes: Vec<PolygonMesh>,
    faces: usize,
    edges: usize,
}

/// Truck-based CAD kernel
pub struct TruckKernel {
    /// Storage for shape data (keyed by ID)
    shapes: Mutex<HashMap<ShapeId, Arc<TruckShape>>>,
}

impl TruckKernel {
    /// Create a new Truck kernel
    pub fn new() -> Self {
        Self {
            shapes: Mutex::new(HashMap::new()),
        }
    }

    /// Store a shape and return its ID
    fn store_shape(&self, shape: TruckShape) -> ShapeId {
        let id = ShapeId::new();
        self.shapes.lock().insert(id, Arc::new(shape));
        id
    }

    /// Get a stored shape by ID
    fn get_shape(&self, id: ShapeId) -> CadResult<Arc<TruckShape>> {
        self.shapes
            .lock()
            .get(&id)
            .cloned()
            .ok_or(CadError::ShapeNotFound(id))
    }
}

impl Default for TruckKernel {
    fn default() -> Self {
        Self::new()
    }
}

/// One converted shell
struct TransferredShell {
    mesh: PolygonMesh,
    faces: usize,
    edges: usize,
}

/// STEP reader backed by `truck-stepio`
struct TruckStepReader<'k> {
    kernel: &'k TruckKernel,
    table: Option<Table>,
    transferred: Vec<TransferredShell>,
}

impl StepReader for TruckStepReader<'_> {
    fn read_file(&mut self, path: &Path) -> CadResult<ReadStatus> {
        let step_string = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                tracing::debug!("STEP file is not valid UTF-8 text");
                return Ok(ReadStatus::Error);
            }
            Err(e) => return Err(CadError::FileIo(e.to_string())),
        };

        let exchange = match ruststep::parser::parse(&step_string) {
            Ok(exchange) => exchange,
            Err(e) => {
                tracing::debug!("Failed to parse STEP file: {}", e);
                return Ok(ReadStatus::Error);
            }
        };

        let Some(data) = exchange.data.first() else {
            return Ok(ReadStatus::Void);
        };

        self.table = Some(Table::from_data_section(data));
        Ok(ReadStatus::Done)
    }

    fn transfer_roots(&mut self, _progress: Option<&ProgressRange>) -> CadResult<usize> {
        let table = self
            .table
            .as_ref()
            .ok_or_else(|| CadError::StepImport("No STEP file has been read".into()))?;

        self.transferred.clear();
        for shell_holder in table.shell.values() {
            let Ok(compressed_shell) = table.to_compressed_shell(shell_holder) else {
                tracing::debug!("Skipping shell that failed to convert");
                continue;
            };

            // First pass to get bounding box for tolerance calculation
            let coarse = compressed_shell
                .robust_triangulation(COARSE_TOLERANCE)
                .to_polygon();
            let diameter = coarse.bounding_box().diameter();
            let tolerance = if diameter.is_finite() && diameter > 0.0 {
                diameter * RELATIVE_TOLERANCE
            } else {
                COARSE_TOLERANCE
            };

            let mesh = compressed_shell.robust_triangulation(tolerance).to_polygon();
            self.transferred.push(TransferredShell {
                mesh,
                faces: compressed_shell.faces.len(),
                edges: compressed_shell
                    .faces
                    .iter()
                    .flat_map(|face| face.boundaries.iter())
                    .map(Vec::len)
                    .sum(),
            });
        }

        Ok(self.transferred.len())
    }

    fn one_shape(&mut self) -> CadResult<ShapeId> {
        if self.transferred.is_empty() {
            return Err(CadError::StepImport(
                "No valid shapes found in STEP file".into(),
            ));
        }

        let shells = std::mem::take(&mut self.transferred);
        let shape = TruckShape {
            faces: shells.iter().map(|s| s.faces).sum(),
            edges: shells.iter().map(|s| s.edges).sum(),
            meshes: shells.into_iter().map(|s| s.mesh).collect(),
        };

        Ok(self.kernel.store_shape(shape))
    }
}

impl CadKernel for TruckKernel {
    fn name(&self) -> &str {
        "truck"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn step_reader(&self) -> CadResult<Box<dyn StepReader + '_>> {
        Ok(Box::new(TruckStepReader {
            kernel: self,
            table: None,
            transferred: Vec::new(),
        }))
    }

    fn add_to_box(
        &self,
        shape: &ShapeHandle<'_>,
        bbox: &mut BoundingBox,
        _use_triangulation: bool,
    ) -> CadResult<()> {
        // Truck shapes are always measured on their triangulation
        let truck_shape = self.get_shape(shape.id())?;
        for mesh in &truck_shape.meshes {
            for p in mesh.positions() {
                bbox.add_point(DVec3::new(p.x, p.y, p.z));
            }
        }
        Ok(())
    }

    fn volume_properties(&self, shape: &ShapeHandle<'_>) -> CadResult<MassProperties> {
        let truck_shape = self.get_shape(shape.id())?;
        Ok(MassProperties::new(enclosed_volume(
            truck_shape.meshes.iter().map(signed_volume),
        )))
    }

    fn explore(
        &self,
        shape: &ShapeHandle<'_>,
        kind: ShapeKind,
    ) -> CadResult<Box<dyn Explorer + '_>> {
        let truck_shape = self.get_shape(shape.id())?;
        let len = match kind {
            ShapeKind::Face => truck_shape.faces,
            ShapeKind::Edge => truck_shape.edges,
        };
        Ok(Box::new(CountingExplorer::new(len)))
    }

    fn release(&self, shape: ShapeId) {
        self.shapes.lock().remove(&shape);
    }

    fn live_shapes(&self) -> usize {
        self.shapes.lock().len()
    }
}

/// Total volume of separate shells
///
/// Shell orientation in the file decides each sign, so shells are summed by
/// magnitude.
fn enclosed_volume(signed: impl Iterator<Item = f64>) -> f64 {
    signed.map(f64::abs).sum()
}

/// Signed volume enclosed by a closed triangulated shell (divergence theorem)
fn signed_volume(mesh: &PolygonMesh) -> f64 {
    let positions = mesh.positions();
    let point = |i: usize| {
        let p = positions[i];
        DVec3::new(p.x, p.y, p.z)
    };
    let tetra = |a: usize, b: usize, c: usize| point(a).dot(point(b).cross(point(c))) / 6.0;

    let triangles: f64 = mesh
        .tri_faces()
        .iter()
        .map(|f| tetra(f[0].pos, f[1].pos, f[2].pos))
        .sum();

    // Quad faces are split along their first diagonal
    let quads: f64 = mesh
        .quad_faces()
        .iter()
        .map(|q| tetra(q[0].pos, q[1].pos, q[2].pos) + tetra(q[0].pos, q[2].pos, q[3].pos))
        .sum();

    triangles + quads
}
