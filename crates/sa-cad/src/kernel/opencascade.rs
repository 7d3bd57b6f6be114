//! OpenCASCADE CAD Kernel Backend
//!
//! Provides bindings to the OpenCASCADE geometry kernel via opencascade-sys.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use glam::DVec3;
use parking_lot::Mutex;

use super::{
    BoundingBox, CadError, CadKernel, CadResult, Explorer, MassProperties, ProgressRange,
    ProgressSupport, ReadStatus, ShapeHandle, ShapeId, ShapeKind, StepReader,
};

// Re-export OpenCASCADE types
use opencascade_sys::ffi;

/// Linear tolerance for volume integration
const VOLUME_TOLERANCE: f64 = 1e-6;

/// OpenCASCADE-based CAD kernel
pub struct OpenCascadeKernel {
    /// Storage for shape data (keyed by ID)
    shapes: Mutex<HashMap<ShapeId, Arc<OccShape>>>,
}

/// Wrapper for an OpenCASCADE shape
struct OccShape {
    shape: cxx::UniquePtr<ffi::TopoDS_Shape>,
}

impl OpenCascadeKernel {
    /// Create a new OpenCASCADE kernel
    pub fn new() -> Self {
        Self {
            shapes: Mutex::new(HashMap::new()),
        }
    }

    /// Store a shape and return its ID
    fn store_shape(&self, shape: cxx::UniquePtr<ffi::TopoDS_Shape>) -> ShapeId {
        let id = ShapeId::new();
        self.shapes.lock().insert(id, Arc::new(OccShape { shape }));
        id
    }

    /// Get a stored shape by ID
    fn get_shape(&self, id: ShapeId) -> CadResult<Arc<OccShape>> {
        self.shapes
            .lock()
            .get(&id)
            .cloned()
            .ok_or(CadError::ShapeNotFound(id))
    }
}

impl Default for OpenCascadeKernel {
    fn default() -> Self {
        Self::new()
    }
}

/// STEP reader wrapping `STEPControl_Reader`
struct OccStepReader<'k> {
    kernel: &'k OpenCascadeKernel,
    reader: cxx::UniquePtr<ffi::STEPControl_Reader>,
    transferred: usize,
}

impl StepReader for OccStepReader<'_> {
    fn read_file(&mut self, path: &Path) -> CadResult<ReadStatus> {
        let path_str = path.to_string_lossy().to_string();

        let status = ffi::read_step(self.reader.pin_mut(), path_str);
        Ok(match status {
            ffi::IFSelect_ReturnStatus::IFSelect_RetVoid => ReadStatus::Void,
            ffi::IFSelect_ReturnStatus::IFSelect_RetDone => ReadStatus::Done,
            ffi::IFSelect_ReturnStatus::IFSelect_RetError => ReadStatus::Error,
            ffi::IFSelect_ReturnStatus::IFSelect_RetFail => ReadStatus::Fail,
            _ => ReadStatus::Stop,
        })
    }

    fn transfer_roots(&mut self, _progress: Option<&ProgressRange>) -> CadResult<usize> {
        // This build's TransferRoots always takes a range
        let progress = ffi::Message_ProgressRange_ctor();
        let num_roots = self.reader.pin_mut().TransferRoots(&progress);
        self.transferred = num_roots.max(0) as usize;
        Ok(self.transferred)
    }

    fn one_shape(&mut self) -> CadResult<ShapeId> {
        if self.transferred == 0 {
            return Err(CadError::StepImport(
                "No valid shapes found in STEP file".into(),
            ));
        }

        // Get the combined shape
        let compound_shape = ffi::one_shape(&self.reader);
        Ok(self.kernel.store_shape(compound_shape))
    }
}

/// Explorer wrapping `TopExp_Explorer`
///
/// Holds the shape so it outlives the C++ cursor.
struct OccExplorer {
    _shape: Arc<OccShape>,
    explorer: cxx::UniquePtr<ffi::TopExp_Explorer>,
}

impl Explorer for OccExplorer {
    fn more(&self) -> bool {
        ffi::TopExp_Explorer_More(&self.explorer)
    }

    fn advance(&mut self) {
        ffi::TopExp_Explorer_Next(&mut self.explorer);
    }
}

impl CadKernel for OpenCascadeKernel {
    fn name(&self) -> &str {
        "opencascade"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn progress_support(&self) -> ProgressSupport {
        ProgressSupport::Required
    }

    fn step_reader(&self) -> CadResult<Box<dyn StepReader + '_>> {
        Ok(Box::new(OccStepReader {
            kernel: self,
            reader: ffi::STEPControl_Reader_ctor(),
            transferred: 0,
        }))
    }

    fn add_to_box(
        &self,
        shape: &ShapeHandle<'_>,
        bbox: &mut BoundingBox,
        use_triangulation: bool,
    ) -> CadResult<()> {
        let occ_shape = self.get_shape(shape.id())?;

        let mut bnd = ffi::Bnd_Box_ctor();
        ffi::BRepBndLib_Add(&occ_shape.shape, bnd.pin_mut(), use_triangulation);
        if ffi::Bnd_Box_IsVoid(&bnd) {
            return Ok(());
        }

        let min = ffi::Bnd_Box_CornerMin(&bnd);
        let max = ffi::Bnd_Box_CornerMax(&bnd);
        bbox.merge(&BoundingBox::new(
            DVec3::new(ffi::gp_Pnt_X(&min), ffi::gp_Pnt_Y(&min), ffi::gp_Pnt_Z(&min)),
            DVec3::new(ffi::gp_Pnt_X(&max), ffi::gp_Pnt_Y(&max), ffi::gp_Pnt_Z(&max)),
        ));
        Ok(())
    }

    fn volume_properties(&self, shape: &ShapeHandle<'_>) -> CadResult<MassProperties> {
        let occ_shape = self.get_shape(shape.id())?;

        let mut props = ffi::GProp_GProps_ctor();
        ffi::BRepGProp_VolumeProperties(&occ_shape.shape, &mut props, VOLUME_TOLERANCE);
        Ok(MassProperties::new(ffi::GProp_GProps_Mass(&props)))
    }

    fn explore(
        &self,
        shape: &ShapeHandle<'_>,
        kind: ShapeKind,
    ) -> CadResult<Box<dyn Explorer + '_>> {
        let occ_shape = self.get_shape(shape.id())?;

        let shape_enum = match kind {
            ShapeKind::Face => ffi::TopAbs_ShapeEnum::TopAbs_FACE,
            ShapeKind::Edge => ffi::TopAbs_ShapeEnum::TopAbs_EDGE,
        };
        let explorer = ffi::TopExp_Explorer_ctor(&occ_shape.shape, shape_enum);

        Ok(Box::new(OccExplorer {
            _shape: occ_shape,
            explorer,
        }))
    }

    fn release(&self, shape: ShapeId) {
        self.shapes.lock().remove(&shape);
    }

    fn live_shapes(&self) -> usize {
        self.shapes.lock().len()
    }
}
