//! Geometry kernel abstraction
//!
//! One [`CadKernel`] trait, implemented by each backend selected through
//! Cargo features, plus the resolver that picks one at startup.

mod resolve;
mod traits;

#[cfg(any(test, feature = "test-utils"))]
pub mod fixture;
#[cfg(feature = "opencascade")]
mod opencascade;
#[cfg(feature = "truck")]
mod truck;

pub use resolve::{KernelFlavor, KernelPreference, resolve_kernel};
pub use traits::*;

#[cfg(feature = "opencascade")]
pub use opencascade::OpenCascadeKernel;
#[cfg(feature = "truck")]
pub use truck::TruckKernel;
