//! Fixed reference data: the 2025 national immunisation calendar and the
//! 12 Moroccan regions (2024 population, estimated annual births).

use tracing::info;

use crate::db::Database;

/// (period_label, vaccine_name, vaccine_group, offset_days after birth)
pub const MOROCCO_SCHEDULE: &[(&str, &str, &str, i64)] = &[
    ("Naissance", "HB1", "Hépatite B (HB)", 0),
    ("Naissance", "BCG", "BCG (Tuberculose)", 0),
    ("Naissance", "VPO-0", "Poliomyélite Orale (VPO)", 0),
    ("8 sem (~2 mois)", "VPO-1", "Poliomyélite Orale (VPO)", 56),
    ("8 sem (~2 mois)", "Penta-1", "Pentavalent (DTC-Hib-HB)", 56),
    ("8 sem (~2 mois)", "Rota-1", "Rotavirus", 56),
    ("10 sem (~2½ mois)", "PCV-1", "Pneumocoque (PCV)", 70),
    ("12 sem (~3 mois)", "VPO-2", "Poliomyélite Orale (VPO)", 84),
    ("12 sem (~3 mois)", "Penta-2", "Pentavalent (DTC-Hib-HB)", 84),
    ("12 sem (~3 mois)", "Rota-2", "Rotavirus", 84),
    ("16 sem (~4 mois)", "VPO-3", "Poliomyélite Orale (VPO)", 112),
    ("16 sem (~4 mois)", "Penta-3", "Pentavalent (DTC-Hib-HB)", 112),
    ("16 sem (~4 mois)", "Rota-3", "Rotavirus", 112),
    ("16 sem (~4 mois)", "VPI-1", "Poliomyélite Injectable (VPI)", 112),
    ("18 sem (~4½ mois)", "PCV-2", "Pneumocoque (PCV)", 126),
    ("6 mois", "PCV-3", "Pneumocoque (PCV)", 180),
    ("9 mois", "VPI-2", "Poliomyélite Injectable (VPI)", 270),
    ("9 mois", "RR-1", "Rougeole-Rubéole (RR)", 270),
    ("12 mois", "PCV-4", "Pneumocoque (PCV)", 365),
    ("18 mois", "VPO-4", "Poliomyélite Orale (VPO)", 548),
    ("18 mois", "RR-2", "Rougeole-Rubéole (RR)", 548),
    ("5 ans", "VPO-5", "Poliomyélite Orale (VPO)", 1825),
    ("5 ans", "DTC-1", "DTC (Rappel)", 1825),
    ("11 ans", "DTC-2", "DTC (Rappel)", 4015),
    ("11 ans", "HPV", "Papillomavirus (HPV)", 4015),
];

/// (name, population_2024, estimated_annual_births)
pub const MOROCCO_REGIONS: &[(&str, i64, i64)] = &[
    ("Tanger-Tétouan-Al Hoceima", 4_030_222, 67_300),
    ("L'Oriental", 2_294_665, 38_300),
    ("Fès-Meknès", 4_467_911, 74_400),
    ("Rabat-Salé-Kénitra", 5_132_639, 85_700),
    ("Béni Mellal-Khénifra", 2_525_801, 42_200),
    ("Casablanca-Settat", 7_688_967, 128_400),
    ("Marrakech-Safi", 4_892_393, 81_700),
    ("Drâa-Tafilalet", 1_655_623, 27_700),
    ("Souss-Massa", 3_020_431, 50_400),
    ("Guelmim-Oued Noun", 448_685, 7_500),
    ("Laâyoune-Sakia El Hamra", 451_028, 7_500),
    ("Dakhla-Oued Ed-Dahab", 219_965, 3_700),
];

/// Seed regions, vaccine templates and zeroed stock rows into an empty
/// store. Tables that already hold data are left untouched.
/// Returns (regions, templates, stock rows) inserted.
pub fn seed_reference(db: &Database) -> (usize, usize, usize) {
    let mut regions = 0;
    if db.region_count() == 0 {
        for (name, population, births) in MOROCCO_REGIONS {
            db.add_region(name, *population, *births);
            regions += 1;
        }
    }

    let mut templates = 0;
    if db.template_count() == 0 {
        for (period_label, vaccine_name, vaccine_group, offset_days) in MOROCCO_SCHEDULE {
            db.add_vaccine_template(period_label, vaccine_name, vaccine_group, *offset_days);
            templates += 1;
        }
    }

    let mut stock_rows = 0;
    for vaccine_name in db.distinct_vaccines() {
        stock_rows += db.ensure_stock_row(&vaccine_name);
    }

    if regions + templates + stock_rows > 0 {
        info!("Seeded reference data: {} regions, {} templates, {} stock rows", regions, templates, stock_rows);
    }

    (regions, templates, stock_rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_reference_counts() {
        let db = Database::new();
        let (regions, templates, stock_rows) = seed_reference(&db);
        assert_eq!(regions, 12);
        assert_eq!(templates, 25);
        // One stock row per distinct vaccine name.
        assert_eq!(stock_rows, db.distinct_vaccines().len());
        assert!(db.vaccine_exists("Penta-1"));
        assert_eq!(db.stock("BCG"), Some(0));
    }

    #[test]
    fn test_seed_reference_is_idempotent() {
        let db = Database::new();
        seed_reference(&db);
        let (regions, templates, stock_rows) = seed_reference(&db);
        assert_eq!((regions, templates, stock_rows), (0, 0, 0));
        assert_eq!(db.region_count(), 12);
        assert_eq!(db.template_count(), 25);
    }

    #[test]
    fn test_birth_doses_have_zero_offset() {
        let birth_doses: Vec<_> = MOROCCO_SCHEDULE
            .iter()
            .filter(|(_, _, _, offset)| *offset == 0)
            .collect();
        assert_eq!(birth_doses.len(), 3);
    }
}
