//! Built-in spec catalogue for the "Resultados Planta" workbook.
//!
//! Column positions are zero-based and count from column A. They follow the
//! layout the laboratory uses on each sheet and change only when the workbook
//! template changes.
use super::{BatchExtractionSpec, ExtractionSpec, SpecCatalog, SpecError};

const SOLIDS: &str = "Sólidas";
const LIQUIDS: &str = "Líquidas";

const EVERY_8H: &[&str] = &["08:00", "16:00", "24:00"];
const EVERY_6H: &[&str] = &["06:00", "12:00", "18:00", "24:00"];
const EVERY_4H: &[&str] = &["04:00", "08:00", "12:00", "16:00", "20:00", "24:00"];
const EVERY_12H: &[&str] = &["12:00", "24:00"];
const EVERY_2H: &[&str] = &[
    "02:00", "04:00", "06:00", "08:00", "10:00", "12:00", "14:00", "16:00", "18:00", "20:00",
    "22:00", "24:00",
];

fn with_date(values: impl IntoIterator<Item = usize>) -> Vec<usize> {
    std::iter::once(0).chain(values).collect()
}

fn series_specs() -> Vec<ExtractionSpec> {
    let tanks = "Sólidas Saída TQ02, TQ05 e TQ06";
    let tank_liquids = "Líquidas Saída TQ1 TQ2 TQ6 TQ7";

    vec![
        // Solids
        ExtractionSpec::new(SOLIDS, with_date([30, 35, 40]), 50.0, "LIX_Au_S", Some(EVERY_8H), SOLIDS),
        ExtractionSpec::new(SOLIDS, with_date([45, 59]), 50.0, "LIX_Au_S", Some(EVERY_12H), SOLIDS),
        ExtractionSpec::new(SOLIDS, with_date([27, 32, 37, 42]), 50.0, "LIX_Au_S", Some(EVERY_6H), SOLIDS),
        ExtractionSpec::new(SOLIDS, with_date([47, 49, 51, 53, 55, 57]), 50.0, "LIX_Au_S", Some(EVERY_4H), SOLIDS),
        ExtractionSpec::new(SOLIDS, with_date([31, 36, 41]), 200.0, "LIX_PX", Some(EVERY_8H), SOLIDS),
        ExtractionSpec::new(SOLIDS, with_date([46, 61]), 200.0, "LIX_PX", Some(EVERY_12H), SOLIDS),
        ExtractionSpec::new(SOLIDS, with_date([48, 50, 52, 54, 56, 58]), 200.0, "LIX_PX", Some(EVERY_4H), SOLIDS),
        ExtractionSpec::new(SOLIDS, with_date([76, 77, 78]), 50.0, "REJ_Au_S", Some(EVERY_8H), SOLIDS),
        ExtractionSpec::new(SOLIDS, with_date([72, 74]), 50.0, "REJ_Au_S", Some(EVERY_12H), SOLIDS),
        ExtractionSpec::new(tanks, with_date([7, 8, 9]), 50.0, "TQ2_Au_S", Some(EVERY_8H), SOLIDS),
        ExtractionSpec::new(tanks, with_date([14, 15, 16]), 50.0, "TQ5_Au_S", Some(EVERY_8H), SOLIDS),
        ExtractionSpec::new(tanks, with_date([21, 22, 23]), 50.0, "TQ6_Au_S", Some(EVERY_8H), SOLIDS),
        ExtractionSpec::new("Carvão TQ Produção", with_date([8]), 50.0, "TQ2_Au_S", Some(&["12:00"]), SOLIDS),
        // Liquids
        ExtractionSpec::new("Água de Processo", with_date(15..=20), 0.6, "BAR_Au_L", Some(EVERY_4H), LIQUIDS),
        ExtractionSpec::new(LIQUIDS, with_date([38, 39, 40]), 50.0, "LIX_Au_L", Some(EVERY_8H), LIQUIDS),
        ExtractionSpec::new(tank_liquids, with_date(7..31), 5.0, "TQ01_Au_L", None, LIQUIDS),
        ExtractionSpec::new(tank_liquids, with_date([32, 33, 34]), 1.5, "TQ02_Au_L", Some(EVERY_8H), LIQUIDS),
        ExtractionSpec::new(tank_liquids, with_date([51, 52, 53]), 50.0, "TQ06_Au_L", Some(EVERY_8H), LIQUIDS),
        ExtractionSpec::new(tank_liquids, with_date(82..94), 50.0, "TQ07_Au_L", Some(EVERY_2H), LIQUIDS),
        ExtractionSpec::new(LIQUIDS, with_date([101, 102, 103]), 0.8, "REJ_Au_L", Some(EVERY_8H), LIQUIDS),
    ]
}

fn batch_specs() -> Vec<BatchExtractionSpec> {
    let cell = "Cuba Principal";
    let acacia = "Acacia";
    let elution = "Eluição - Carvão";

    vec![
        BatchExtractionSpec::new(cell, [1, 4, 3, 5], 500.0, "CUBA_Entrada_Au", cell),
        BatchExtractionSpec::new(cell, [1, 4, 3, 6], 500.0, "CUBA_Entrada_NaOH", cell),
        BatchExtractionSpec::new(cell, [1, 4, 3, 7], 500.0, "CUBA_Entrada_CN", cell),
        BatchExtractionSpec::new(cell, [9, 12, 11, 13], 500.0, "CUBA_Saida_Au", cell),
        BatchExtractionSpec::new(cell, [9, 12, 11, 51], 500.0, "CUBA_Saida_NaOH", cell),
        BatchExtractionSpec::new(cell, [9, 12, 11, 52], 500.0, "CUBA_Saida_CN", cell),
        BatchExtractionSpec::new(acacia, [1, 4, 2, 5], 5000.0, "ACA_Rica", acacia),
        BatchExtractionSpec::new(acacia, [1, 4, 2, 11], 5000.0, "ACA_Pobre", acacia),
        BatchExtractionSpec::new(acacia, [1, 4, 2, 7], 5000.0, "ACA_CN", acacia),
        BatchExtractionSpec::new(elution, [2, 1, 3, 4], 5000.0, "ELU_Rica", "Eluição"),
        BatchExtractionSpec::new(elution, [6, 1, 7, 8], 5000.0, "ELU_Pobre", "Eluição"),
        BatchExtractionSpec::new(elution, [6, 1, 7, 11], 5000.0, "ELU_ATV", "Eluição"),
    ]
}

/// The production catalogue, validated.
pub fn plant_catalog() -> Result<SpecCatalog, SpecError> {
    SpecCatalog::new(series_specs(), batch_specs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plant_catalog_is_valid() {
        let catalog = plant_catalog().expect("built-in catalogue should validate");
        assert_eq!(catalog.series().len(), 20);
        assert_eq!(catalog.batch().len(), 12);
    }

    #[test]
    fn test_hourly_tank_spec_uses_default_labels() {
        let catalog = plant_catalog().unwrap();
        let tq01 = catalog
            .series()
            .iter()
            .find(|s| s.source_tag == "TQ01_Au_L")
            .unwrap();
        assert!(tq01.timestamp_labels.is_none());
        assert_eq!(tq01.column_positions.len(), 25);
        assert_eq!(tq01.labels().last().map(String::as_str), Some("24:00"));
    }

    #[test]
    fn test_catalog_preserves_declaration_order() {
        let catalog = plant_catalog().unwrap();
        let tags: Vec<&str> = catalog
            .batch()
            .iter()
            .map(|b| b.source_tag.as_str())
            .collect();
        assert_eq!(tags.first(), Some(&"CUBA_Entrada_Au"));
        assert_eq!(tags.last(), Some(&"ELU_ATV"));
    }
}
