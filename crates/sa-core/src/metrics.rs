//! Derived metrics: sorted dimensions, weight and size class

use serde::{Deserialize, Serialize};

use crate::analyzer::GeometryReport;
use crate::materials::{MaterialDensityTable, resolve_density};

/// Parts whose largest dimension is below this are tiny (mm)
pub const TINY_LIMIT_MM: f64 = 1.0;

/// Parts whose largest dimension is below this are small (mm)
pub const SMALL_LIMIT_MM: f64 = 100.0;

/// Size tag derived from the largest dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeClass {
    Tiny,
    Small,
    Large,
}

impl SizeClass {
    pub fn classify(largest_mm: f64) -> Self {
        if largest_mm < TINY_LIMIT_MM {
            SizeClass::Tiny
        } else if largest_mm < SMALL_LIMIT_MM {
            SizeClass::Small
        } else {
            SizeClass::Large
        }
    }
}

/// Material options for one request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterialSpec {
    pub material: Option<String>,
    pub density_kg_m3: Option<f64>,
}

impl MaterialSpec {
    pub fn new(material: Option<String>, density_kg_m3: Option<f64>) -> Self {
        Self {
            material,
            density_kg_m3,
        }
    }
}

/// Analysis result as returned to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub length_mm: f64,
    pub width_mm: f64,
    pub height_mm: f64,
    pub volume_m3: f64,
    pub weight_kg: f64,
    pub material: String,
    pub density_kg_m3: f64,
    pub face_count: usize,
    pub edge_count: usize,
    pub backend: String,
    pub size_class: SizeClass,
    /// Volume and weight come from the bounding-box estimate
    pub approximate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl AnalysisResult {
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Sort extents so that length >= width >= height
pub fn sort_dimensions(mut extents: [f64; 3]) -> [f64; 3] {
    extents.sort_by(|a, b| b.total_cmp(a));
    extents
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// Turn raw measurements into a client result
pub fn derive_metrics(
    report: &GeometryReport,
    spec: &MaterialSpec,
    table: &MaterialDensityTable,
    backend: &str,
) -> AnalysisResult {
    let [length, width, height] = sort_dimensions(report.extents_mm).map(|mm| round_to(mm, 3));
    let density = resolve_density(table, spec.material.as_deref(), spec.density_kg_m3);
    let volume_m3 = report.volume_m3();
    let weight_kg = volume_m3 * density.kg_m3;

    AnalysisResult {
        length_mm: length,
        width_mm: width,
        height_mm: height,
        volume_m3: round_to(volume_m3, 9),
        weight_kg: round_to(weight_kg, 3),
        material: density.material,
        density_kg_m3: density.kg_m3,
        face_count: report.face_count,
        edge_count: report.edge_count,
        backend: backend.to_string(),
        // Rounded length, as reported
        size_class: SizeClass::classify(length),
        approximate: report.approximate,
        source: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn report(extents_mm: [f64; 3], volume_mm3: f64) -> GeometryReport {
        GeometryReport {
            extents_mm,
            volume_mm3,
            approximate: false,
            face_count: 6,
            edge_count: 24,
        }
    }

    #[test]
    fn test_classification_boundaries() {
        assert_eq!(SizeClass::classify(0.0), SizeClass::Tiny);
        assert_eq!(SizeClass::classify(0.999), SizeClass::Tiny);
        assert_eq!(SizeClass::classify(1.0), SizeClass::Small);
        assert_eq!(SizeClass::classify(99.999), SizeClass::Small);
        assert_eq!(SizeClass::classify(100.0), SizeClass::Large);
        assert_eq!(SizeClass::classify(2500.0), SizeClass::Large);
    }

    #[test]
    fn test_classification_uses_reported_length() {
        for (largest, length, class) in [
            (99.9996, 100.0, SizeClass::Large),
            (99.9994, 99.999, SizeClass::Small),
            (0.9996, 1.0, SizeClass::Small),
            (0.9994, 0.999, SizeClass::Tiny),
        ] {
            let result = derive_metrics(
                &report([largest, 0.5, 0.5], 1.0),
                &MaterialSpec::default(),
                MaterialDensityTable::standard(),
                "fixture",
            );
            assert_eq!(result.length_mm, length, "{largest}");
            assert_eq!(result.size_class, class, "{largest}");
        }
    }

    #[test]
    fn test_sort_dimensions() {
        assert_eq!(sort_dimensions([5.0, 40.0, 10.0]), [40.0, 10.0, 5.0]);
        assert_eq!(sort_dimensions([1.0, 1.0, 2.0]), [2.0, 1.0, 1.0]);
    }

    #[test]
    fn test_weight_from_volume_and_density() {
        // 100 x 50 x 20 mm steel block
        let result = derive_metrics(
            &report([20.0, 100.0, 50.0], 100_000.0),
            &MaterialSpec::default(),
            MaterialDensityTable::standard(),
            "fixture",
        );

        assert_eq!(
            [result.length_mm, result.width_mm, result.height_mm],
            [100.0, 50.0, 20.0]
        );
        assert_relative_eq!(result.volume_m3, 1e-4);
        assert_relative_eq!(result.weight_kg, 0.785);
        assert_eq!(result.material, "steel");
        assert_eq!(result.size_class, SizeClass::Large);
        assert_eq!(result.backend, "fixture");
    }

    #[test]
    fn test_density_override() {
        let spec = MaterialSpec::new(Some("aluminum".into()), Some(1000.0));
        let result = derive_metrics(
            &report([10.0, 10.0, 10.0], 1000.0),
            &spec,
            MaterialDensityTable::standard(),
            "fixture",
        );
        assert_eq!(result.density_kg_m3, 1000.0);
        assert_relative_eq!(result.weight_kg, 0.001);
    }

    #[test]
    fn test_rounding() {
        let result = derive_metrics(
            &report([12.34567, 1.00049, 0.5], 1234.5678),
            &MaterialSpec::default(),
            MaterialDensityTable::standard(),
            "fixture",
        );
        assert_eq!(result.length_mm, 12.346);
        assert_eq!(result.width_mm, 1.0);
        assert_eq!(result.height_mm, 0.5);
        assert_eq!(result.volume_m3, 0.000001235);
        assert_eq!(result.weight_kg, 0.01);
    }

    #[test]
    fn test_serialized_shape() {
        let result = derive_metrics(
            &report([0.5, 0.5, 0.5], 0.125),
            &MaterialSpec::default(),
            MaterialDensityTable::standard(),
            "fixture",
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["size_class"], "tiny");
        assert_eq!(json["approximate"], false);
        assert!(json.get("source").is_none());

        let json = serde_json::to_value(result.with_source("http://host/a.step")).unwrap();
        assert_eq!(json["source"], "http://host/a.step");
    }
}
