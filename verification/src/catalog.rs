//! Small-body catalog selection for the resonance fit.
//!
//! Rows come from an external orbital-element query (designation, e, a,
//! aphelion Q, observation count).  Selection keeps distant, well-observed
//! objects: Q ≥ 80 AU and at least 15 observations used in the orbit
//! solution.  When the catalog omits Q it is computed as a(1 + e).
//!
//! The ±2 AU "resonance window" around multiples of the 22.14 AU step is the
//! same criterion as fitting to `resonance_lattice()` with an absolute
//! tolerance of `RESONANCE_WINDOW_AU`.

use std::collections::HashSet;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::circular::PhaseSample;
use crate::error::{Result, VerificationError};
use crate::lattice::{LinearLattice, ObservedRecord, Tolerance};

/// Spacing of the aphelion resonance lattice (AU).
pub const RESONANCE_STEP_AU: f64 = 22.14;

/// Half-width of the resonance window around each node (AU).
pub const RESONANCE_WINDOW_AU: f64 = 2.0;

/// One catalog row.  Missing columns are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrbitalRecord {
    pub designation: String,
    pub eccentricity: Option<f64>,
    pub semi_major_axis: Option<f64>,
    pub aphelion: Option<f64>,
    pub observations_used: Option<u32>,
}

impl OrbitalRecord {
    /// Reported aphelion, else a(1 + e).  `None` without enough elements.
    pub fn aphelion_distance(&self) -> Option<f64> {
        self.aphelion.or_else(|| {
            let (e, a) = (self.eccentricity?, self.semi_major_axis?);
            Some(a * (1.0 + e))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionCriteria {
    pub min_aphelion: f64,
    pub min_observations: u32,
}

impl Default for SelectionCriteria {
    fn default() -> Self {
        Self {
            min_aphelion: 80.0,
            min_observations: 15,
        }
    }
}

/// Filter catalog rows into fitter observations keyed by designation.
///
/// Rows without both e and a are skipped, as are rows whose aphelion is not
/// finite.  Duplicate designations keep the first occurrence.
pub fn select_observations(
    records: &[OrbitalRecord],
    criteria: &SelectionCriteria,
) -> Vec<ObservedRecord<String>> {
    let mut seen = HashSet::new();
    let mut selected = Vec::new();
    let mut incomplete = 0usize;

    for record in records {
        if record.eccentricity.is_none() || record.semi_major_axis.is_none() {
            incomplete += 1;
            continue;
        }
        let Some(q) = record.aphelion_distance().filter(|q| q.is_finite()) else {
            incomplete += 1;
            continue;
        };
        let n_obs = record.observations_used.unwrap_or(0);
        if q < criteria.min_aphelion || n_obs < criteria.min_observations {
            continue;
        }
        if !seen.insert(record.designation.as_str()) {
            continue;
        }
        selected.push(ObservedRecord::new(q, record.designation.clone()));
    }

    debug!(
        rows = records.len(),
        incomplete,
        selected = selected.len(),
        min_aphelion = criteria.min_aphelion,
        min_observations = criteria.min_observations,
        "catalog selection"
    );
    selected
}

/// Q(n) = 22.14 · n
pub fn resonance_lattice() -> LinearLattice {
    LinearLattice::new(0.0, RESONANCE_STEP_AU)
}

/// The ±2 AU resonance window as a fitter tolerance.
pub fn resonance_window() -> Tolerance {
    Tolerance::Absolute(RESONANCE_WINDOW_AU)
}

/// Smallest node range from 0 whose top node lies at or beyond the farthest
/// observation.
pub fn covering_nodes<M>(observations: &[ObservedRecord<M>], step: f64) -> Result<RangeInclusive<u32>> {
    if !step.is_finite() || step <= 0.0 {
        return Err(VerificationError::invalid(format!(
            "lattice step must be positive, got {step}"
        )));
    }
    let farthest = observations.iter().map(|o| o.distance).fold(0.0f64, f64::max);
    if !farthest.is_finite() {
        return Err(VerificationError::NonFinite("observed distance"));
    }
    let top = (farthest / step).ceil();
    if top > f64::from(u32::MAX) {
        return Err(VerificationError::invalid("observations exceed the lattice index range"));
    }
    Ok(0..=top as u32)
}

/// Phase of each distance within the lattice step, for the Rayleigh test.
pub fn lattice_phases<M>(observations: &[ObservedRecord<M>], step: f64) -> Result<Vec<PhaseSample>> {
    observations
        .iter()
        .map(|o| PhaseSample::from_period(o.distance, step))
        .collect()
}
