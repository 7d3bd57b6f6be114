//! Material density lookup

/// Material assumed when a request names none
pub const DEFAULT_MATERIAL: &str = "steel";

/// Density of common materials (kg/m^3)
pub mod density {
    pub const STEEL: f64 = 7850.0;
    pub const STAINLESS_STEEL: f64 = 8000.0;
    pub const CAST_IRON: f64 = 7200.0;
    pub const ALUMINUM: f64 = 2700.0;
    pub const TITANIUM: f64 = 4500.0;
    pub const COPPER: f64 = 8960.0;
    pub const BRASS: f64 = 8500.0;
    pub const BRONZE: f64 = 8800.0;
    pub const ZINC: f64 = 7140.0;
    pub const MAGNESIUM: f64 = 1740.0;
    pub const NICKEL: f64 = 8900.0;
    pub const LEAD: f64 = 11340.0;
    pub const PLASTIC_ABS: f64 = 1050.0;
    pub const PLASTIC_PLA: f64 = 1240.0;
    pub const PLASTIC_PETG: f64 = 1270.0;
    pub const NYLON: f64 = 1150.0;
    pub const POM: f64 = 1410.0;
    pub const POLYCARBONATE: f64 = 1200.0;
    pub const HDPE: f64 = 950.0;
    pub const WOOD: f64 = 700.0;
    pub const GLASS: f64 = 2500.0;
}

/// Density used when a material is unknown
pub const DEFAULT_DENSITY: f64 = density::STEEL;

const STANDARD_ENTRIES: &[(&str, f64)] = &[
    ("steel", density::STEEL),
    ("stainless_steel", density::STAINLESS_STEEL),
    ("stainless", density::STAINLESS_STEEL),
    ("cast_iron", density::CAST_IRON),
    ("aluminum", density::ALUMINUM),
    ("aluminium", density::ALUMINUM),
    ("titanium", density::TITANIUM),
    ("copper", density::COPPER),
    ("brass", density::BRASS),
    ("bronze", density::BRONZE),
    ("zinc", density::ZINC),
    ("magnesium", density::MAGNESIUM),
    ("nickel", density::NICKEL),
    ("lead", density::LEAD),
    ("abs", density::PLASTIC_ABS),
    ("pla", density::PLASTIC_PLA),
    ("petg", density::PLASTIC_PETG),
    ("nylon", density::NYLON),
    ("pom", density::POM),
    ("polycarbonate", density::POLYCARBONATE),
    ("hdpe", density::HDPE),
    ("wood", density::WOOD),
    ("glass", density::GLASS),
];

static STANDARD: MaterialDensityTable = MaterialDensityTable {
    entries: STANDARD_ENTRIES,
};

/// Fixed mapping from material name to density
///
/// Names are matched case-insensitively; spaces and dashes match
/// underscores, so `"Stainless Steel"` finds `stainless_steel`.
#[derive(Debug)]
pub struct MaterialDensityTable {
    entries: &'static [(&'static str, f64)],
}

impl MaterialDensityTable {
    /// The built-in table
    pub fn standard() -> &'static MaterialDensityTable {
        &STANDARD
    }

    /// Look up a material's density
    pub fn lookup(&self, material: &str) -> Option<f64> {
        let key = normalize(material);
        self.entries
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, density)| *density)
    }

    /// Known material names
    pub fn materials(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(name, _)| *name)
    }
}

fn normalize(material: &str) -> String {
    material
        .trim()
        .to_lowercase()
        .replace([' ', '-'], "_")
}

/// Where a resolved density came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DensitySource {
    Override,
    Table,
    Default,
}

/// Density chosen for a request
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDensity {
    pub material: String,
    pub kg_m3: f64,
    pub source: DensitySource,
}

/// Resolve the density for a request
///
/// A finite, positive override wins. Otherwise the material is looked up in
/// `table`, falling back to [`DEFAULT_DENSITY`].
pub fn resolve_density(
    table: &MaterialDensityTable,
    material: Option<&str>,
    override_kg_m3: Option<f64>,
) -> ResolvedDensity {
    let material = material
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(DEFAULT_MATERIAL)
        .to_lowercase();

    if let Some(kg_m3) = override_kg_m3.filter(|d| d.is_finite() && *d > 0.0) {
        return ResolvedDensity {
            material,
            kg_m3,
            source: DensitySource::Override,
        };
    }

    match table.lookup(&material) {
        Some(kg_m3) => ResolvedDensity {
            material,
            kg_m3,
            source: DensitySource::Table,
        },
        None => {
            tracing::debug!("Unknown material '{}', using default density", material);
            ResolvedDensity {
                material,
                kg_m3: DEFAULT_DENSITY,
                source: DensitySource::Default,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let table = MaterialDensityTable::standard();
        assert_eq!(table.lookup("Aluminum"), Some(2700.0));
        assert_eq!(table.lookup("ALUMINIUM"), Some(2700.0));
        assert_eq!(table.lookup(" Stainless Steel "), Some(8000.0));
        assert_eq!(table.lookup("cast-iron"), Some(7200.0));
        assert_eq!(table.lookup("unobtanium"), None);
    }

    #[test]
    fn test_override_takes_precedence() {
        let table = MaterialDensityTable::standard();
        let resolved = resolve_density(table, Some("aluminum"), Some(1000.0));
        assert_eq!(resolved.kg_m3, 1000.0);
        assert_eq!(resolved.source, DensitySource::Override);
        assert_eq!(resolved.material, "aluminum");
    }

    #[test]
    fn test_non_positive_override_falls_back_to_table() {
        let table = MaterialDensityTable::standard();
        for bad in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            let resolved = resolve_density(table, Some("titanium"), Some(bad));
            assert_eq!(resolved.kg_m3, 4500.0);
            assert_eq!(resolved.source, DensitySource::Table);
        }
    }

    #[test]
    fn test_unknown_material_uses_default() {
        let table = MaterialDensityTable::standard();
        let resolved = resolve_density(table, Some("Unobtanium"), None);
        assert_eq!(resolved.kg_m3, DEFAULT_DENSITY);
        assert_eq!(resolved.source, DensitySource::Default);
        assert_eq!(resolved.material, "unobtanium");
    }

    #[test]
    fn test_missing_material_is_steel() {
        let table = MaterialDensityTable::standard();
        for material in [None, Some(""), Some("   ")] {
            let resolved = resolve_density(table, material, None);
            assert_eq!(resolved.material, "steel");
            assert_eq!(resolved.kg_m3, 7850.0);
            assert_eq!(resolved.source, DensitySource::Table);
        }
    }

    #[test]
    fn test_every_entry_is_positive() {
        let table = MaterialDensityTable::standard();
        for name in table.materials() {
            assert!(table.lookup(name).is_some_and(|d| d > 0.0), "{name}");
        }
    }
}
