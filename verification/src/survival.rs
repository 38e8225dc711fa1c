//! Survival-rate aggregation and chaos-vs-filtered regime comparison.
//!
//! Trial outcomes reduce through [`SurvivalTally`], a plain counting monoid:
//! merging partial tallies in any grouping or order gives the same totals, so
//! outcomes may be reduced per worker and combined afterwards.
//!
//! The headline result is the comparison of the control regime ("Chaos
//! Mode", η = 0) against the filtered regime ("EnGeΛ Mode", η > 0) on the
//! same random streams.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, VerificationError};
use crate::trial::{resolve_seed, run_trials_parallel, TrialConfig, TrialOutcome};

/// Which regime a report describes, derived from η.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Regime {
    Chaos,
    Filtered { eta: f64 },
}

impl Regime {
    pub fn from_eta(eta: f64) -> Self {
        if eta == 0.0 {
            Regime::Chaos
        } else {
            Regime::Filtered { eta }
        }
    }

    pub fn eta(&self) -> f64 {
        match self {
            Regime::Chaos => 0.0,
            Regime::Filtered { eta } => *eta,
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Regime::Chaos => write!(f, "Chaos Mode"),
            Regime::Filtered { eta } => write!(f, "EnGeΛ Mode (η = {eta:.3})"),
        }
    }
}

/// Associative counting reduction over trial outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurvivalTally {
    pub survivors: usize,
    pub total: usize,
    /// Sum of `steps_survived` over all trials.
    pub steps: u64,
}

impl SurvivalTally {
    pub fn record(mut self, outcome: &TrialOutcome) -> Self {
        self.total += 1;
        self.survivors += usize::from(outcome.survived);
        self.steps += u64::from(outcome.steps_survived);
        self
    }

    pub fn merge(self, other: Self) -> Self {
        Self {
            survivors: self.survivors + other.survivors,
            total: self.total + other.total,
            steps: self.steps + other.steps,
        }
    }

    pub fn from_outcomes(outcomes: &[TrialOutcome]) -> Self {
        outcomes.iter().fold(Self::default(), Self::record)
    }

    /// Finish the reduction.  An empty tally has no defined rate.
    pub fn into_report(self, regime: Regime) -> Result<SurvivalReport> {
        if self.total == 0 {
            return Err(VerificationError::insufficient("survival rate", 1, 0));
        }
        let n = self.total as f64;
        let rate = self.survivors as f64 / n;
        Ok(SurvivalReport {
            regime,
            trials: self.total,
            survivors: self.survivors,
            rate,
            mean_steps_survived: self.steps as f64 / n,
            standard_error: (rate * (1.0 - rate) / n).sqrt(),
        })
    }
}

/// Survival statistics for one completed batch of trials.
///
/// `rate = survivors / trials`, always in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurvivalReport {
    pub regime: Regime,
    pub trials: usize,
    pub survivors: usize,
    pub rate: f64,
    pub mean_steps_survived: f64,
    /// Binomial standard error √(p(1−p)/n).
    pub standard_error: f64,
}

impl SurvivalReport {
    pub fn percent(&self) -> f64 {
        self.rate * 100.0
    }
}

/// Reduce a completed set of outcomes to a report.
///
/// Fails with `InsufficientData` on an empty set rather than inventing a rate.
pub fn aggregate(outcomes: &[TrialOutcome], regime: Regime) -> Result<SurvivalReport> {
    let report = SurvivalTally::from_outcomes(outcomes).into_report(regime)?;
    debug!(regime = %report.regime, rate = report.rate, trials = report.trials, "aggregated");
    Ok(report)
}

/// Control vs filtered survival.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeComparison {
    pub control: SurvivalReport,
    pub filtered: SurvivalReport,
    /// filtered.rate − control.rate
    pub absolute_difference: f64,
    /// absolute_difference / control.rate; `None` when the control rate is 0.
    pub relative_difference: Option<f64>,
}

impl RegimeComparison {
    /// Two-proportion z score of the difference (unpooled).
    /// `None` when both rates are degenerate (0 or 1).
    pub fn z_score(&self) -> Option<f64> {
        let se = self.control.standard_error.hypot(self.filtered.standard_error);
        (se > 0.0).then(|| self.absolute_difference / se)
    }
}

pub fn compare(control: &SurvivalReport, filtered: &SurvivalReport) -> RegimeComparison {
    let absolute_difference = filtered.rate - control.rate;
    let relative_difference = (control.rate > 0.0).then(|| absolute_difference / control.rate);
    RegimeComparison {
        control: *control,
        filtered: *filtered,
        absolute_difference,
        relative_difference,
    }
}

/// Run one regime in parallel and aggregate it.
pub fn run_regime(config: &TrialConfig, seed: Option<u64>) -> Result<SurvivalReport> {
    let outcomes = run_trials_parallel(config, seed)?;
    aggregate(&outcomes, Regime::from_eta(config.eta))
}

/// Run `config` at η = 0 and at `filtered_eta` on the same seed and compare.
pub fn compare_regimes(config: &TrialConfig, filtered_eta: f64, seed: Option<u64>) -> Result<RegimeComparison> {
    let control_cfg = config.with_eta(0.0);
    let filtered_cfg = config.with_eta(filtered_eta);
    control_cfg.validate()?;
    filtered_cfg.validate()?;

    let seed = resolve_seed(seed);
    let control = run_regime(&control_cfg, Some(seed))?;
    let filtered = run_regime(&filtered_cfg, Some(seed))?;
    let comparison = compare(&control, &filtered);

    info!(
        control = control.rate,
        filtered = filtered.rate,
        difference = comparison.absolute_difference,
        "regime comparison complete"
    );
    Ok(comparison)
}

/// Survival as a function of η: one report per value, all on the same seed.
pub fn sweep_eta(base: &TrialConfig, etas: &[f64], seed: u64) -> Result<Vec<SurvivalReport>> {
    if etas.is_empty() {
        return Err(VerificationError::insufficient("η sweep", 1, 0));
    }
    let configs: Vec<TrialConfig> = etas.iter().map(|&eta| base.with_eta(eta)).collect();
    for cfg in &configs {
        cfg.validate()?;
    }
    configs.iter().map(|cfg| run_regime(cfg, Some(seed))).collect()
}
