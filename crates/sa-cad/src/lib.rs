//! Geometry Kernel Abstraction for STEP Analysis
//!
//! This crate provides:
//! - The [`CadKernel`] capability trait (STEP reading, bounding boxes,
//!   mass properties, topology exploration)
//! - Backends for OpenCASCADE and Truck, chosen by Cargo features
//! - Startup-time resolution of the backend to use
//! - Scoped shape handles that release kernel storage on drop

pub mod kernel;

// Re-exports for convenience
pub use kernel::{
    BoundingBox, CadError, CadKernel, CadResult, CountingExplorer, Explorer, KernelFlavor,
    KernelPreference, MassProperties, NullKernel, ProgressRange, ProgressSupport, ReadStatus,
    ShapeHandle, ShapeId, ShapeKind, StepReader, resolve_kernel,
};
