//! Fixture kernel for tests
//!
//! Reads a tiny STEP-shaped format in which every solid is an axis-aligned
//! block:
//!
//! ```text
//! ISO-10303-21;
//! HEADER;
//! ENDSEC;
//! DATA;
//! #1 = FIXTURE_BLOCK((0.0, 0.0, 0.0), (10.0, 20.0, 5.0));
//! ENDSEC;
//! END-ISO-10303-21;
//! ```
//!
//! Marker entities change what mass properties do:
//! `FIXTURE_VOLUME_FAILURE` returns an error, `FIXTURE_VOLUME_PANIC` panics,
//! `FIXTURE_NEGATIVE_VOLUME` and `FIXTURE_NAN_VOLUME` report a bad mass.
//!
//! Each block has 6 faces and 24 edge uses (12 edges, each shared by two
//! faces).

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use glam::DVec3;
use parking_lot::Mutex;

use super::{
    BoundingBox, CadError, CadKernel, CadResult, CountingExplorer, Explorer, MassProperties,
    ProgressRange, ProgressSupport, ReadStatus, ShapeHandle, ShapeId, ShapeKind, StepReader,
};

/// Write a fixture STEP file holding one block from the origin to `size`
pub fn block_step(size: [f64; 3]) -> String {
    blocks_step(&[([0.0; 3], size)], &[])
}

/// Write a fixture STEP file holding the given `(min, max)` blocks and
/// extra marker entities
pub fn blocks_step(blocks: &[([f64; 3], [f64; 3])], markers: &[&str]) -> String {
    let mut data = String::new();
    let mut id = 1;
    for (min, max) in blocks {
        data.push_str(&format!(
            "#{} = FIXTURE_BLOCK(({:?}, {:?}, {:?}), ({:?}, {:?}, {:?}));\n",
            id, min[0], min[1], min[2], max[0], max[1], max[2]
        ));
        id += 1;
    }
    for marker in markers {
        data.push_str(&format!("#{} = {}();\n", id, marker));
        id += 1;
    }

    format!(
        "ISO-10303-21;\nHEADER;\nFILE_NAME('fixture.step');\nENDSEC;\nDATA;\n{}ENDSEC;\nEND-ISO-10303-21;\n",
        data
    )
}

#[derive(Debug, Clone, Default)]
struct FixtureShape {
    blocks: Vec<BoundingBox>,
    volume_failure: bool,
    volume_panic: bool,
    negative_volume: bool,
    nan_volume: bool,
}

/// Kernel reading the fixture block format
#[derive(Debug, Default)]
pub struct FixtureKernel {
    shapes: Mutex<HashMap<ShapeId, FixtureShape>>,
    progress_support: ProgressSupport,
    reads: AtomicUsize,
}

impl FixtureKernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emulate a build with the given progress-range signature
    pub fn with_progress_support(mut self, progress_support: ProgressSupport) -> Self {
        self.progress_support = progress_support;
        self
    }

    /// Number of files handed to a reader so far
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn get_shape(&self, id: ShapeId) -> CadResult<FixtureShape> {
        self.shapes
            .lock()
            .get(&id)
            .cloned()
            .ok_or(CadError::ShapeNotFound(id))
    }
}

struct FixtureReader<'k> {
    kernel: &'k FixtureKernel,
    parsed: Option<FixtureShape>,
    transferred: Option<FixtureShape>,
}

impl StepReader for FixtureReader<'_> {
    fn read_file(&mut self, path: &Path) -> CadResult<ReadStatus> {
        self.kernel.reads.fetch_add(1, Ordering::SeqCst);

        let bytes = std::fs::read(path).map_err(|e| CadError::FileIo(e.to_string()))?;
        let Ok(text) = String::from_utf8(bytes) else {
            return Ok(ReadStatus::Error);
        };
        if !text.trim_start().starts_with("ISO-10303-21;") {
            return Ok(ReadStatus::Error);
        }
        let Some((_, data)) = text.split_once("DATA;") else {
            return Ok(ReadStatus::Void);
        };

        let mut shape = FixtureShape::default();
        for entity in data.split(';') {
            if entity.contains("FIXTURE_VOLUME_FAILURE") {
                shape.volume_failure = true;
            } else if entity.contains("FIXTURE_VOLUME_PANIC") {
                shape.volume_panic = true;
            } else if entity.contains("FIXTURE_NEGATIVE_VOLUME") {
                shape.negative_volume = true;
            } else if entity.contains("FIXTURE_NAN_VOLUME") {
                shape.nan_volume = true;
            } else if let Some((_, args)) = entity.split_once("FIXTURE_BLOCK") {
                match parse_block(args) {
                    Some(block) => shape.blocks.push(block),
                    None => return Ok(ReadStatus::Error),
                }
            }
        }

        self.parsed = Some(shape);
        Ok(ReadStatus::Done)
    }

    fn transfer_roots(&mut self, progress: Option<&ProgressRange>) -> CadResult<usize> {
        match (self.kernel.progress_support, progress) {
            (ProgressSupport::Required, None) => {
                return Err(CadError::OperationFailed(
                    "TransferRoots requires a progress range".into(),
                ));
            }
            (ProgressSupport::Rejected, Some(_)) => {
                return Err(CadError::OperationFailed(
                    "TransferRoots takes no progress range".into(),
                ));
            }
            _ => {}
        }

        let shape = self
            .parsed
            .take()
            .ok_or_else(|| CadError::StepImport("No STEP file has been read".into()))?;
        let roots = shape.blocks.len();
        self.transferred = Some(shape);
        Ok(roots)
    }

    fn one_shape(&mut self) -> CadResult<ShapeId> {
        let shape = self
            .transferred
            .take()
            .filter(|shape| !shape.blocks.is_empty())
            .ok_or_else(|| CadError::StepImport("No valid shapes found in STEP file".into()))?;

        let id = ShapeId::new();
        self.kernel.shapes.lock().insert(id, shape);
        Ok(id)
    }
}

/// Parse `((x, y, z), (x, y, z))` into a block
fn parse_block(args: &str) -> Option<BoundingBox> {
    let values: Vec<f64> = args
        .split(|c: char| c == '(' || c == ')' || c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    let [x0, y0, z0, x1, y1, z1] = values.as_slice() else {
        return None;
    };
    Some(BoundingBox::new(
        DVec3::new(*x0, *y0, *z0),
        DVec3::new(*x1, *y1, *z1),
    ))
}

impl CadKernel for FixtureKernel {
    fn name(&self) -> &str {
        "fixture"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn progress_support(&self) -> ProgressSupport {
        self.progress_support
    }

    fn step_reader(&self) -> CadResult<Box<dyn StepReader + '_>> {
        Ok(Box::new(FixtureReader {
            kernel: self,
            parsed: None,
            transferred: None,
        }))
    }

    fn add_to_box(
        &self,
        shape: &ShapeHandle<'_>,
        bbox: &mut BoundingBox,
        _use_triangulation: bool,
    ) -> CadResult<()> {
        for block in &self.get_shape(shape.id())?.blocks {
            bbox.merge(block);
        }
        Ok(())
    }

    fn volume_properties(&self, shape: &ShapeHandle<'_>) -> CadResult<MassProperties> {
        let fixture = self.get_shape(shape.id())?;
        if fixture.volume_failure {
            return Err(CadError::MassProperties("fixture volume failure".into()));
        }
        if fixture.volume_panic {
            panic!("fixture volume panic");
        }
        if fixture.nan_volume {
            return Ok(MassProperties::new(f64::NAN));
        }
        let volume: f64 = fixture.blocks.iter().map(BoundingBox::volume).sum();
        Ok(MassProperties::new(if fixture.negative_volume {
            -volume
        } else {
            volume
        }))
    }

    fn explore(
        &self,
        shape: &ShapeHandle<'_>,
        kind: ShapeKind,
    ) -> CadResult<Box<dyn Explorer + '_>> {
        let blocks = self.get_shape(shape.id())?.blocks.len();
        let per_block = match kind {
            ShapeKind::Face => 6,
            ShapeKind::Edge => 24,
        };
        Ok(Box::new(CountingExplorer::new(blocks * per_block)))
    }

    fn release(&self, shape: ShapeId) {
        self.shapes.lock().remove(&shape);
    }

    fn live_shapes(&self) -> usize {
        self.shapes.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(kernel: &FixtureKernel, contents: &str) -> (ReadStatus, Option<ShapeId>) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixture.step");
        std::fs::write(&path, contents).unwrap();

        let mut reader = kernel.step_reader().unwrap();
        let status = reader.read_file(&path).unwrap();
        if !status.is_done() {
            return (status, None);
        }
        reader.transfer_roots(Some(&ProgressRange::new())).unwrap();
        (status, reader.one_shape().ok())
    }

    #[test]
    fn test_block_round_trip() {
        let kernel = FixtureKernel::new();
        let (status, id) = read(&kernel, &block_step([10.0, 20.0, 5.0]));
        assert_eq!(status, ReadStatus::Done);

        let shape = ShapeHandle::new(&kernel, id.unwrap());
        let mut bbox = BoundingBox::empty();
        kernel.add_to_box(&shape, &mut bbox, true).unwrap();
        assert_eq!(bbox.extents(), [10.0, 20.0, 5.0]);
        assert_eq!(kernel.volume_properties(&shape).unwrap().mass(), 1000.0);
    }

    #[test]
    fn test_rejects_non_step_text() {
        let kernel = FixtureKernel::new();
        let (status, _) = read(&kernel, "solid cube\nendsolid cube\n");
        assert_eq!(status, ReadStatus::Error);
        assert_eq!(kernel.reads(), 1);
    }

    #[test]
    fn test_no_blocks_yields_no_shape() {
        let kernel = FixtureKernel::new();
        let (status, id) = read(&kernel, &blocks_step(&[], &[]));
        assert_eq!(status, ReadStatus::Done);
        assert!(id.is_none());
    }

    #[test]
    fn test_progress_signature_is_enforced() {
        let kernel = FixtureKernel::new().with_progress_support(ProgressSupport::Rejected);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixture.step");
        std::fs::write(&path, block_step([1.0, 1.0, 1.0])).unwrap();

        let mut reader = kernel.step_reader().unwrap();
        reader.read_file(&path).unwrap();
        assert!(reader.transfer_roots(Some(&ProgressRange::new())).is_err());
    }

    #[test]
    fn test_parse_block() {
        let block = parse_block("((1.0, 2.0, 3.0), (4.0, 5.0, 6.5))").unwrap();
        assert_eq!(block.get(), [1.0, 2.0, 3.0, 4.0, 5.0, 6.5]);
        assert!(parse_block("((1.0, 2.0), (4.0, 5.0))").is_none());
        assert!(parse_block("((a, b, c), (d, e, f))").is_none());
    }
}
