//! STEP loading through a per-request scratch file

use std::io::Write;
use std::path::Path;

use sa_cad::{CadKernel, ProgressRange, ShapeHandle};
use tempfile::NamedTempFile;

use crate::error::{AnalysisError, PipelineResult};
use crate::input::RawFileBytes;

/// Write `bytes` to a uniquely named scratch file
///
/// The file is removed when the returned value is dropped.
fn write_scratch(bytes: &RawFileBytes, dir: Option<&Path>) -> PipelineResult<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("sa-").suffix(".step");
    let mut file = match dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    }
    .map_err(|e| AnalysisError::analysis(format!("Failed to create scratch file: {}", e)))?;

    file.write_all(bytes.as_slice())
        .and_then(|_| file.flush())
        .map_err(|e| AnalysisError::analysis(format!("Failed to write scratch file: {}", e)))?;
    Ok(file)
}

/// Load STEP bytes into a kernel shape
///
/// `scratch_dir` overrides the system temp directory.
pub fn load_step<'k>(
    kernel: &'k dyn CadKernel,
    bytes: &RawFileBytes,
    scratch_dir: Option<&Path>,
) -> PipelineResult<ShapeHandle<'k>> {
    if bytes.is_empty() {
        return Err(AnalysisError::input("STEP file is empty"));
    }
    if !kernel.is_available() {
        return Err(AnalysisError::BackendUnavailable(format!(
            "kernel '{}' is not available",
            kernel.name()
        )));
    }

    let scratch = write_scratch(bytes, scratch_dir)?;
    tracing::debug!(
        "Reading {} bytes from {}",
        bytes.len(),
        scratch.path().display()
    );

    let mut reader = kernel.step_reader()?;
    let status = reader.read_file(scratch.path())?;
    if !status.is_done() {
        return Err(AnalysisError::Parse(format!(
            "STEP reader finished with status {:?}",
            status
        )));
    }

    let progress = ProgressRange::new();
    let progress = kernel
        .progress_support()
        .wants_progress()
        .then_some(&progress);
    let roots = reader.transfer_roots(progress)?;
    if roots == 0 {
        return Err(AnalysisError::Parse(
            "STEP file contains no transferable shapes".into(),
        ));
    }

    let id = reader.one_shape()?;
    tracing::debug!("Transferred {} root(s) into shape {}", roots, id);
    Ok(ShapeHandle::new(kernel, id))
}
