//! Kernel binding resolution
//!
//! Backends are compiled in through Cargo features. At startup the resolver
//! probes them in a fixed order and hands out the first available one.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{CadError, CadKernel, CadResult};

/// A geometry kernel backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelFlavor {
    OpenCascade,
    Truck,
}

impl KernelFlavor {
    /// Order in which backends are probed
    pub const PROBE_ORDER: [KernelFlavor; 2] = [KernelFlavor::OpenCascade, KernelFlavor::Truck];

    /// Get flavor name
    pub fn name(self) -> &'static str {
        match self {
            KernelFlavor::OpenCascade => "opencascade",
            KernelFlavor::Truck => "truck",
        }
    }

    /// Construct the backend, if it was compiled in
    fn instantiate(self) -> Option<Arc<dyn CadKernel>> {
        match self {
            #[cfg(feature = "opencascade")]
            KernelFlavor::OpenCascade => {
                // Native initialization must not take the process down
                std::panic::catch_unwind(super::OpenCascadeKernel::new)
                    .ok()
                    .map(|kernel| Arc::new(kernel) as Arc<dyn CadKernel>)
            }
            #[cfg(feature = "truck")]
            KernelFlavor::Truck => Some(Arc::new(super::TruckKernel::new())),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }
}

impl fmt::Display for KernelFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for KernelFlavor {
    type Err = CadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "opencascade" | "occ" | "ocp" => Ok(KernelFlavor::OpenCascade),
            "truck" => Ok(KernelFlavor::Truck),
            other => Err(CadError::KernelNotAvailable(format!(
                "unknown kernel '{}'",
                other
            ))),
        }
    }
}

/// Which backends the resolver may pick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KernelPreference {
    /// First available backend in probe order
    #[default]
    Auto,
    /// Only the named backend
    Only(KernelFlavor),
}

impl KernelPreference {
    /// Backends to probe, in order
    pub fn candidates(self) -> Vec<KernelFlavor> {
        match self {
            KernelPreference::Auto => KernelFlavor::PROBE_ORDER.to_vec(),
            KernelPreference::Only(flavor) => vec![flavor],
        }
    }
}

impl FromStr for KernelPreference {
    type Err = CadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("auto") {
            return Ok(KernelPreference::Auto);
        }
        s.parse().map(KernelPreference::Only)
    }
}

/// Resolve a kernel backend
///
/// Returns [`CadError::KernelNotAvailable`] when no candidate is compiled in
/// and available.
pub fn resolve_kernel(preference: KernelPreference) -> CadResult<Arc<dyn CadKernel>> {
    let mut attempts = Vec::new();

    for flavor in preference.candidates() {
        let Some(kernel) = flavor.instantiate() else {
            tracing::debug!("Kernel '{}' is not compiled in", flavor);
            attempts.push(format!("{}: not compiled in", flavor));
            continue;
        };

        if !kernel.is_available() {
            tracing::debug!("Kernel '{}' reports itself unavailable", flavor);
            attempts.push(format!("{}: unavailable", flavor));
            continue;
        }

        tracing::info!("Using '{}' geometry kernel", kernel.name());
        return Ok(kernel);
    }

    Err(CadError::KernelNotAvailable(if attempts.is_empty() {
        "no kernel candidates".to_string()
    } else {
        attempts.join(", ")
    }))
}
