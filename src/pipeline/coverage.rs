//! Coverage and supply aggregation over the regional reference data.
//!
//! Coverage compares vaccinated counts against registered children per
//! region; supply projects vaccine need from estimated annual births and
//! compares it with the national stock pool.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::db::Database;

/// National immunisation target used for both the coverage color scale
/// and the projected-need estimate.
pub const TARGET_COVERAGE: f64 = 0.95;
/// Coverage at or above this but below target renders yellow.
pub const YELLOW_THRESHOLD: f64 = 0.85;
/// Safety margin applied on top of the projected need.
pub const BUFFER_FACTOR: f64 = 1.10;

/// Traffic-light classification of a region's coverage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverageColor {
    Green,
    Yellow,
    Red,
}

impl CoverageColor {
    pub fn from_rate(rate: f64) -> Self {
        if rate >= TARGET_COVERAGE {
            Self::Green
        } else if rate >= YELLOW_THRESHOLD {
            Self::Yellow
        } else {
            Self::Red
        }
    }
}

/// Coverage figures for one region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionCoverage {
    pub region_id: i64,
    pub region_name: String,
    pub registered_children: i64,
    pub vaccinated: i64,
    /// Vaccinated / registered, rounded to 4 decimals. Zero when no
    /// children are registered.
    pub coverage_rate: f64,
    pub color: CoverageColor,
    /// True when the region has no registered children at all; the rate
    /// is then meaningless rather than genuinely zero.
    pub no_data: bool,
}

/// A full coverage report, also the snapshot payload persisted to the
/// cache table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageReport {
    pub vaccine_name: String,
    pub regions: Vec<RegionCoverage>,
}

/// Parameters for a coverage computation.
#[derive(Debug, Clone, Default)]
pub struct CoverageQuery {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    /// Serve the latest cached snapshot when one exists. Date filters
    /// force a fresh computation since snapshots are unfiltered.
    pub use_cache: bool,
    /// Recompute and overwrite the cache even when a snapshot exists.
    pub refresh: bool,
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Compute (or serve from cache) the per-region coverage of one vaccine.
/// A vaccine outside the schedule yields an empty report, never a snapshot.
pub fn coverage(db: &Database, vaccine_name: &str, query: &CoverageQuery) -> CoverageReport {
    if !db.vaccine_exists(vaccine_name) {
        debug!("Unknown vaccine '{vaccine_name}', returning empty coverage");
        return CoverageReport { vaccine_name: vaccine_name.to_string(), regions: Vec::new() };
    }

    let filtered = query.date_from.is_some() || query.date_to.is_some();

    if query.use_cache && !query.refresh && !filtered {
        if let Some(payload) = db.latest_coverage_snapshot(vaccine_name) {
            match serde_json::from_str::<CoverageReport>(&payload) {
                Ok(report) => {
                    debug!("Serving cached coverage snapshot for {vaccine_name}");
                    return report;
                }
                Err(e) => warn!("Discarding unreadable coverage snapshot for {vaccine_name}: {e}"),
            }
        }
    }

    let regions = db
        .regions()
        .into_iter()
        .map(|region| {
            let registered = db.registered_children(region.id);
            let vaccinated =
                db.vaccinated_count(region.id, vaccine_name, query.date_from, query.date_to);
            let no_data = registered == 0;
            let rate = if no_data {
                0.0
            } else {
                round4(vaccinated as f64 / registered as f64)
            };
            RegionCoverage {
                region_id: region.id,
                region_name: region.name,
                registered_children: registered,
                vaccinated,
                coverage_rate: rate,
                color: CoverageColor::from_rate(rate),
                no_data,
            }
        })
        .collect();

    let report = CoverageReport { vaccine_name: vaccine_name.to_string(), regions };

    // Date-filtered reports are ad hoc and never cached.
    if !filtered {
        match serde_json::to_string(&report) {
            Ok(payload) => db.cache_coverage_snapshot(vaccine_name, &payload),
            Err(e) => warn!("Failed to serialize coverage snapshot: {e}"),
        }
    }

    report
}

/// Recompute and cache coverage for every vaccine in the schedule.
/// Invoked by the nightly refresh.
pub fn refresh_all(db: &Database) -> usize {
    let vaccines = db.distinct_vaccines();
    for vaccine in &vaccines {
        coverage(db, vaccine, &CoverageQuery { refresh: true, ..Default::default() });
    }
    info!("Coverage cache refreshed for {} vaccine(s)", vaccines.len());
    vaccines.len()
}

/// Projected need for one region. Stock is one national pool, so the
/// status label reflects the national outcome, not a per-region split.
#[derive(Debug, Clone, Serialize)]
pub struct RegionSupply {
    pub region_id: i64,
    pub region_name: String,
    pub estimated_annual_births: i64,
    /// ceil(births * target coverage)
    pub projected_need: i64,
    /// ceil(projected_need * buffer factor)
    pub recommended_allocation: i64,
    pub shortage_or_surplus: SupplyStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SupplyStatus {
    Shortage,
    Surplus,
    Balanced,
}

/// National roll-up against the stock pool. At most one of
/// shortage/surplus is non-zero.
#[derive(Debug, Clone, Serialize)]
pub struct NationalSupply {
    pub current_stock: i64,
    pub total_projected_need: i64,
    pub total_recommended: i64,
    pub shortage: i64,
    pub surplus: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SupplyReport {
    pub vaccine_name: String,
    pub regions: Vec<RegionSupply>,
    pub national: NationalSupply,
    /// Set when no stock row exists for the vaccine; the national balance
    /// then assumes zero stock.
    pub data_quality_warning: Option<String>,
}

/// Project per-region vaccine need and compare with the national stock.
/// Stock is tracked at the national level only, so shortage/surplus is a
/// single national figure.
pub fn supply(db: &Database, vaccine_name: &str) -> SupplyReport {
    if !db.vaccine_exists(vaccine_name) {
        debug!("Unknown vaccine '{vaccine_name}', returning empty supply report");
        return SupplyReport {
            vaccine_name: vaccine_name.to_string(),
            regions: Vec::new(),
            national: NationalSupply {
                current_stock: 0,
                total_projected_need: 0,
                total_recommended: 0,
                shortage: 0,
                surplus: 0,
            },
            data_quality_warning: Some(format!("unknown vaccine '{vaccine_name}'")),
        };
    }

    let mut regions: Vec<RegionSupply> = db
        .regions()
        .into_iter()
        .map(|region| {
            let projected_need =
                (region.estimated_annual_births as f64 * TARGET_COVERAGE).ceil() as i64;
            let recommended_allocation = (projected_need as f64 * BUFFER_FACTOR).ceil() as i64;
            RegionSupply {
                region_id: region.id,
                region_name: region.name,
                estimated_annual_births: region.estimated_annual_births,
                projected_need,
                recommended_allocation,
                shortage_or_surplus: SupplyStatus::Balanced,
            }
        })
        .collect();

    let total_projected_need: i64 = regions.iter().map(|r| r.projected_need).sum();
    let total_recommended: i64 = regions.iter().map(|r| r.recommended_allocation).sum();

    let stock = db.stock(vaccine_name);
    let data_quality_warning = if stock.is_none() {
        Some(format!("no stock record for '{vaccine_name}', assuming zero"))
    } else {
        None
    };
    let current_stock = stock.unwrap_or(0);

    let shortage = (total_projected_need - current_stock).max(0);
    let surplus = (current_stock - total_projected_need).max(0);
    let status = if shortage > 0 {
        SupplyStatus::Shortage
    } else if surplus > 0 {
        SupplyStatus::Surplus
    } else {
        SupplyStatus::Balanced
    };
    for region in &mut regions {
        region.shortage_or_surplus = status;
    }

    SupplyReport {
        vaccine_name: vaccine_name.to_string(),
        regions,
        national: NationalSupply {
            current_stock,
            total_projected_need,
            total_recommended,
            shortage,
            surplus,
        },
        data_quality_warning,
    }
}
