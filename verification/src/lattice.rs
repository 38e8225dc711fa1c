//! Resonance-node fitting: observed distances against a quantised lattice.
//!
//! A lattice rule generates predicted distances Q(n) for node indices n.
//! Each observation is assigned the node whose prediction is closest in
//! absolute terms; on an exact tie the lower index wins.  The fit reports the
//! signed residual (observed − predicted) per observation plus aggregate
//! quality: mean absolute residual and the share of observations inside a
//! tolerance, e.g. 1.1 % relative error or a ±2 AU window.
//!
//! An empty observation set is a legitimate input.  It yields a `FitResult`
//! with no fits and no aggregate; asking it for a summary returns
//! `EmptyObservationSet` instead of a zero that looks like a perfect fit.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, VerificationError};

/// Default relative tolerance for a "match" (1.1 %).
pub const DEFAULT_RELATIVE_TOLERANCE: f64 = 0.011;

/// Deterministic rule generating the predicted distance of node `index`.
pub trait LatticeRule {
    fn predict(&self, index: u32) -> f64;
}

/// Q(n) = base + step · n
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearLattice {
    pub base: f64,
    pub step: f64,
}

impl LinearLattice {
    pub fn new(base: f64, step: f64) -> Self {
        Self { base, step }
    }
}

impl LatticeRule for LinearLattice {
    fn predict(&self, index: u32) -> f64 {
        self.base + self.step * f64::from(index)
    }
}

impl<F> LatticeRule for F
where
    F: Fn(u32) -> f64,
{
    fn predict(&self, index: u32) -> f64 {
        self(index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatticeNode {
    pub index: u32,
    pub predicted: f64,
}

/// A measured distance with caller-owned metadata the fitter never inspects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedRecord<M> {
    pub distance: f64,
    pub metadata: M,
}

impl<M> ObservedRecord<M> {
    pub fn new(distance: f64, metadata: M) -> Self {
        Self { distance, metadata }
    }
}

/// When a residual counts as a match.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Tolerance {
    /// |residual| ≤ width (same units as the distances).
    Absolute(f64),
    /// |residual| ≤ fraction · |predicted|.
    Relative(f64),
}

impl Default for Tolerance {
    fn default() -> Self {
        Tolerance::Relative(DEFAULT_RELATIVE_TOLERANCE)
    }
}

impl Tolerance {
    fn validate(&self) -> Result<()> {
        let (Tolerance::Absolute(v) | Tolerance::Relative(v)) = *self;
        if v.is_finite() && v >= 0.0 {
            Ok(())
        } else {
            Err(VerificationError::invalid(format!(
                "tolerance must be finite and non-negative, got {self:?}"
            )))
        }
    }

    pub fn admits(&self, residual: f64, predicted: f64) -> bool {
        match *self {
            Tolerance::Absolute(width) => residual.abs() <= width,
            Tolerance::Relative(fraction) => residual.abs() <= fraction * predicted.abs(),
        }
    }
}

/// Nearest-node assignment for one observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeFit {
    /// Position of the observation in the input slice.
    pub observation: usize,
    pub observed: f64,
    pub node: LatticeNode,
    /// observed − predicted
    pub residual: f64,
    /// |residual| / |predicted|; +∞ for a non-zero residual on a zero node.
    pub relative_residual: f64,
    pub within_tolerance: bool,
}

/// Aggregate fit quality over a non-empty observation set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitSummary {
    pub observations: usize,
    pub mean_absolute_residual: f64,
    /// Mean over the finite relative residuals; `None` if there are none.
    pub mean_relative_residual: Option<f64>,
    /// Fits on a zero-valued node with a non-zero residual, left out of
    /// `mean_relative_residual`.
    pub relative_undefined: usize,
    pub within_tolerance: usize,
    pub fraction_within: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub fits: Vec<NodeFit>,
    pub nodes_considered: usize,
    pub tolerance: Tolerance,
    /// `None` exactly when there were no observations.
    pub aggregate: Option<FitSummary>,
}

impl FitResult {
    pub fn is_empty(&self) -> bool {
        self.fits.is_empty()
    }

    pub fn observations(&self) -> usize {
        self.fits.len()
    }

    pub fn summary(&self) -> Result<&FitSummary> {
        self.aggregate.as_ref().ok_or(VerificationError::EmptyObservationSet)
    }

    /// Share of observations within tolerance, as a percentage.
    pub fn percent_within(&self) -> Result<f64> {
        self.summary().map(|s| s.fraction_within * 100.0)
    }

    /// Observation count per assigned node index.
    pub fn node_occupancy(&self) -> BTreeMap<u32, usize> {
        let mut occupancy = BTreeMap::new();
        for fit in &self.fits {
            *occupancy.entry(fit.node.index).or_insert(0) += 1;
        }
        occupancy
    }
}

fn node<L: LatticeRule + ?Sized>(rule: &L, index: u32) -> LatticeNode {
    LatticeNode {
        index,
        predicted: rule.predict(index),
    }
}

/// Closest node in a non-empty range; the earlier node keeps a tie.
fn nearest_node<L>(rule: &L, nodes: &RangeInclusive<u32>, observed: f64) -> LatticeNode
where
    L: LatticeRule + ?Sized,
{
    let first = node(rule, *nodes.start());
    nodes.clone().skip(1).map(|i| node(rule, i)).fold(first, |best, candidate| {
        if (observed - candidate.predicted).abs() < (observed - best.predicted).abs() {
            candidate
        } else {
            best
        }
    })
}

fn relative(residual: f64, predicted: f64) -> f64 {
    if residual == 0.0 {
        0.0
    } else {
        residual.abs() / predicted.abs()
    }
}

/// Fit every observation to its nearest node among `nodes`.
pub fn fit<M, L>(
    observations: &[ObservedRecord<M>],
    rule: &L,
    nodes: RangeInclusive<u32>,
    tolerance: Tolerance,
) -> Result<FitResult>
where
    L: LatticeRule + ?Sized,
{
    tolerance.validate()?;
    if nodes.is_empty() {
        return Err(VerificationError::invalid(format!(
            "node range {}..={} is empty",
            nodes.start(),
            nodes.end()
        )));
    }
    if observations.iter().any(|o| !o.distance.is_finite()) {
        return Err(VerificationError::NonFinite("observed distance"));
    }

    if nodes.clone().any(|i| !rule.predict(i).is_finite()) {
        return Err(VerificationError::NonFinite("lattice prediction"));
    }
    let nodes_considered = (*nodes.end() - *nodes.start()) as usize + 1;

    let fits: Vec<NodeFit> = observations
        .iter()
        .enumerate()
        .map(|(i, obs)| {
            let node = nearest_node(rule, &nodes, obs.distance);
            let residual = obs.distance - node.predicted;
            NodeFit {
                observation: i,
                observed: obs.distance,
                node,
                residual,
                relative_residual: relative(residual, node.predicted),
                within_tolerance: tolerance.admits(residual, node.predicted),
            }
        })
        .collect();

    let aggregate = (!fits.is_empty()).then(|| {
        let n = fits.len() as f64;
        let within = fits.iter().filter(|f| f.within_tolerance).count();
        let finite: Vec<f64> = fits
            .iter()
            .map(|f| f.relative_residual)
            .filter(|r| r.is_finite())
            .collect();
        FitSummary {
            observations: fits.len(),
            mean_absolute_residual: fits.iter().map(|f| f.residual.abs()).sum::<f64>() / n,
            mean_relative_residual: (!finite.is_empty())
                .then(|| finite.iter().sum::<f64>() / finite.len() as f64),
            relative_undefined: fits.len() - finite.len(),
            within_tolerance: within,
            fraction_within: within as f64 / n,
        }
    });

    debug!(
        observations = fits.len(),
        nodes = nodes_considered,
        within = aggregate.map(|a| a.within_tolerance),
        "lattice fit"
    );

    Ok(FitResult {
        fits,
        nodes_considered,
        tolerance,
        aggregate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const STEP_AU: f64 = 22.14;

    fn records(distances: &[f64]) -> Vec<ObservedRecord<&'static str>> {
        distances.iter().map(|&d| ObservedRecord::new(d, "obj")).collect()
    }

    // ── Nearest node ─────────────────────────────────────────────────────────

    #[test]
    fn exact_node_value_has_zero_residual() {
        let lattice = LinearLattice::new(30.0, STEP_AU);
        let target = lattice.predict(7);
        let res = fit(&records(&[target]), &lattice, 0..=30, Tolerance::default()).unwrap();

        let f = res.fits[0];
        assert_eq!(f.node.index, 7);
        assert_eq!(f.residual, 0.0);
        assert_eq!(f.relative_residual, 0.0);
        assert!(f.within_tolerance);
    }

    /// 438.1 AU against Q(n) = 22.14·n: node 20 (442.8 AU), |Δ| = 4.7 AU ≈ 1.06 %.
    #[test]
    fn distant_object_scenario() {
        println!("\n══ Resonance fit: 438.1 AU ══════════════════════════════════════════");
        let lattice = LinearLattice::new(0.0, STEP_AU);
        let res = fit(&records(&[438.1]), &lattice, 0..=40, Tolerance::default()).unwrap();
        let f = res.fits[0];

        println!("  node n = {}, Q(n) = {:.2} AU", f.node.index, f.node.predicted);
        println!("  residual = {:+.3} AU ({:.3} %)", f.residual, f.relative_residual * 100.0);

        assert_eq!(f.node.index, 20);
        assert!((f.node.predicted - 442.8).abs() < 1e-9);
        assert!((f.residual + 4.7).abs() < 1e-9);
        assert!(f.relative_residual < 0.011);
        assert!(f.within_tolerance);
        assert_eq!(res.percent_within().unwrap(), 100.0);
        assert_eq!(res.nodes_considered, 41);
    }

    #[test]
    fn ties_go_to_the_lowest_index() {
        let lattice = LinearLattice::new(0.0, 10.0);
        let res = fit(&records(&[15.0, 25.0]), &lattice, 0..=5, Tolerance::Absolute(1.0)).unwrap();
        assert_eq!(res.fits[0].node.index, 1);
        assert_eq!(res.fits[1].node.index, 2);
        assert_eq!(res.fits[0].residual, 5.0);
    }

    /// The chosen residual is the minimum over every node in range.
    #[test]
    fn nearest_residual_is_minimal() {
        let lattice = |n: u32| 30.0 * 1.35f64.powi(n as i32);
        let mut rng = StdRng::seed_from_u64(77);
        let distances: Vec<f64> = (0..500).map(|_| rng.gen_range(10.0..2_000.0)).collect();

        let res = fit(&records(&distances), &lattice, 0..=15, Tolerance::default()).unwrap();
        for f in &res.fits {
            for n in 0..=15u32 {
                assert!(
                    f.residual.abs() <= (f.observed - lattice(n)).abs(),
                    "observation {} assigned node {} but node {} is closer",
                    f.observed, f.node.index, n
                );
            }
        }
    }

    #[test]
    fn observations_outside_the_range_snap_to_the_edge_nodes() {
        let lattice = LinearLattice::new(0.0, STEP_AU);
        let res = fit(&records(&[5.0, 900.0]), &lattice, 3..=6, Tolerance::Absolute(2.0)).unwrap();
        assert_eq!(res.fits[0].node.index, 3);
        assert_eq!(res.fits[1].node.index, 6);
        assert!(res.fits[0].residual < 0.0);
        assert!(res.fits[1].residual > 0.0);
        assert_eq!(res.summary().unwrap().within_tolerance, 0);
    }

    // ── Aggregate ────────────────────────────────────────────────────────────

    #[test]
    fn aggregate_statistics() {
        let lattice = LinearLattice::new(0.0, 100.0);
        // residuals: +1, −3, +20, 0
        let res = fit(
            &records(&[101.0, 197.0, 320.0, 400.0]),
            &lattice,
            0..=10,
            Tolerance::Relative(0.02),
        )
        .unwrap();
        let s = res.summary().unwrap();

        assert_eq!(s.observations, 4);
        assert!((s.mean_absolute_residual - 6.0).abs() < 1e-12);
        assert_eq!(s.within_tolerance, 3);
        assert_eq!(s.fraction_within, 0.75);
        assert_eq!(res.percent_within().unwrap(), 75.0);

        let occupancy = res.node_occupancy();
        assert_eq!(occupancy.get(&1), Some(&1));
        assert_eq!(occupancy.get(&4), Some(&1));
        assert_eq!(occupancy.len(), 4);
    }

    #[test]
    fn empty_observation_set_is_flagged_not_zeroed() {
        let res = fit::<(), _>(&[], &LinearLattice::new(0.0, STEP_AU), 0..=10, Tolerance::default()).unwrap();
        assert!(res.is_empty());
        assert_eq!(res.aggregate, None);
        assert_eq!(res.summary().unwrap_err(), VerificationError::EmptyObservationSet);
        assert_eq!(res.percent_within().unwrap_err(), VerificationError::EmptyObservationSet);
        assert_eq!(res.nodes_considered, 11);
    }

    // ── Input contract ───────────────────────────────────────────────────────

    #[test]
    fn invalid_inputs() {
        let lattice = LinearLattice::new(0.0, STEP_AU);
        #[allow(clippy::reversed_empty_ranges)]
        let empty_range = 5..=4;
        assert!(matches!(
            fit(&records(&[1.0]), &lattice, empty_range, Tolerance::default()),
            Err(VerificationError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            fit(&records(&[1.0]), &lattice, 0..=3, Tolerance::Relative(-0.1)),
            Err(VerificationError::InvalidConfiguration(_))
        ));
        assert_eq!(
            fit(&records(&[f64::NAN]), &lattice, 0..=3, Tolerance::default()).unwrap_err(),
            VerificationError::NonFinite("observed distance")
        );
        let broken = |n: u32| if n == 2 { f64::NAN } else { n as f64 };
        assert_eq!(
            fit(&records(&[1.0]), &broken, 0..=3, Tolerance::default()).unwrap_err(),
            VerificationError::NonFinite("lattice prediction")
        );
    }

    #[test]
    fn zero_prediction_relative_residual() {
        let lattice = LinearLattice::new(0.0, 10.0);
        let res = fit(&records(&[0.0, 1.0]), &lattice, 0..=2, Tolerance::Relative(0.5)).unwrap();
        assert_eq!(res.fits[0].relative_residual, 0.0);
        assert!(res.fits[0].within_tolerance);
        assert_eq!(res.fits[1].relative_residual, f64::INFINITY);
        assert!(!res.fits[1].within_tolerance);
    }

    /// A zero-valued node with a non-zero residual has no relative error;
    /// it is counted apart instead of dragging the mean to infinity.
    #[test]
    fn undefined_relative_residual_is_excluded_from_the_mean() {
        let lattice = LinearLattice::new(0.0, 10.0);
        let res = fit(&records(&[1.0, 20.0, 31.0]), &lattice, 0..=3, Tolerance::Absolute(2.0)).unwrap();
        let s = res.summary().unwrap();

        println!("\n══ Relative residual with a zero node ═══════════════════════════════");
        for f in &res.fits {
            println!("  obs {:>5.1}  node {}  rel {:>8.4}", f.observed, f.node.index, f.relative_residual);
        }
        println!("  mean rel = {:?}, undefined = {}", s.mean_relative_residual, s.relative_undefined);

        assert_eq!(res.fits[0].relative_residual, f64::INFINITY);
        assert_eq!(s.relative_undefined, 1);
        let mean = s.mean_relative_residual.expect("two finite relative residuals");
        assert!(mean.is_finite());
        assert!((mean - (0.0 + 1.0 / 30.0) / 2.0).abs() < 1e-12, "mean rel = {mean}");
        assert_eq!(s.within_tolerance, 3);
        assert!((s.mean_absolute_residual - 2.0 / 3.0).abs() < 1e-12);

        let only_zero_node = fit(&records(&[1.0]), &lattice, 0..=3, Tolerance::Absolute(2.0)).unwrap();
        let s = only_zero_node.summary().unwrap();
        assert_eq!(s.mean_relative_residual, None);
        assert_eq!(s.relative_undefined, 1);
    }

    /// Nodes are generated on demand, so a wide range costs time, not memory.
    #[test]
    fn wide_node_range_is_scanned_without_materialising_it() {
        let lattice = LinearLattice::new(0.0, 0.5);
        let res = fit(&records(&[1_234_567.3]), &lattice, 1_000_000..=3_000_000, Tolerance::default()).unwrap();

        assert_eq!(res.nodes_considered, 2_000_001);
        assert_eq!(res.fits[0].node.index, 2_469_135);
        assert!((res.fits[0].residual - (-0.2)).abs() < 1e-6);

        let single = fit(&records(&[5.0]), &lattice, 7..=7, Tolerance::default()).unwrap();
        assert_eq!(single.nodes_considered, 1);
        assert_eq!(single.fits[0].node.index, 7);
    }
}
