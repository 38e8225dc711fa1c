//! Monte Carlo survival trials for the information-decay process.
//!
//! ## Model
//!
//! A trial follows one information carrier for up to `max_steps` discrete
//! replication steps.  At every step:
//!
//!   1. draw u ~ U[0, 1); a mutation occurs when u < `error_probability`
//!   2. a mutation adds `noise_amplitude · |Z| · (1 − η)` to the cumulative
//!      error, Z ~ N(0, 1)
//!   3. the carrier decays the first time cumulative error exceeds
//!      [`CATASTROPHE_THRESHOLD`] (Eigen's error-catastrophe limit)
//!
//! η = 0 is the chaotic control regime (no damping).  η > 0 is the filtered
//! regime: the coherence field damps every perturbation by (1 − η).  Both
//! regimes run through the same trial function; η is the only switch.
//!
//! ## Random streams
//!
//! The draws at each step never depend on η.  Under [`run_trials_parallel`]
//! trial `i` owns the stream `StdRng::seed_from_u64(splitmix(seed, i))`, so
//! two regimes run on the same seed see identical mutation sequences and the
//! filtered cumulative error is exactly (1 − η) × the control's, trial by
//! trial.  The same property makes the output independent of the rayon
//! thread count.
//!
//! ## Calibration
//!
//! With the default parameters (p = 0.2, 50 steps, amplitude 1.0) the
//! threshold of 1.92 puts the control regime at ≈ 0.5 % survival and the
//! golden regime (η ≈ 0.618) at ≈ 15.9 %, i.e. one standard deviation below
//! the damped error mean.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, VerificationError};

/// Cumulative error above which a carrier is lost.
pub const CATASTROPHE_THRESHOLD: f64 = 1.92;

/// Golden coherence factor η = 1/φ.
pub const GOLDEN_ETA: f64 = 0.618_033_988_749_894_9;

/// Parameters for one batch of trials.  Immutable once a run starts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrialConfig {
    /// Number of independent trials.
    pub trials: usize,
    /// Scale of a single mutation's magnitude.
    pub noise_amplitude: f64,
    /// Per-step probability that a mutation occurs.
    pub error_probability: f64,
    /// Coherence factor η ∈ [0, 1]; 0 = chaotic control.
    pub eta: f64,
    /// Step budget per trial.
    pub max_steps: u32,
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            trials: 10_000,
            noise_amplitude: 1.0,
            error_probability: 0.2,
            eta: 0.0,
            max_steps: 50,
        }
    }
}

impl TrialConfig {
    pub fn with_trials(mut self, trials: usize) -> Self {
        self.trials = trials;
        self
    }

    pub fn with_noise_amplitude(mut self, noise_amplitude: f64) -> Self {
        self.noise_amplitude = noise_amplitude;
        self
    }

    pub fn with_error_probability(mut self, error_probability: f64) -> Self {
        self.error_probability = error_probability;
        self
    }

    pub fn with_eta(mut self, eta: f64) -> Self {
        self.eta = eta;
        self
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Multiplier applied to every perturbation: 1 − η.
    pub fn damping(&self) -> f64 {
        1.0 - self.eta
    }

    /// Reject configurations no trial should run with.
    pub fn validate(&self) -> Result<()> {
        if self.trials == 0 {
            return Err(VerificationError::invalid("trial count must be positive"));
        }
        if self.max_steps == 0 {
            return Err(VerificationError::invalid("max_steps must be positive"));
        }
        if !self.noise_amplitude.is_finite() || self.noise_amplitude < 0.0 {
            return Err(VerificationError::invalid(format!(
                "noise amplitude must be finite and non-negative, got {}",
                self.noise_amplitude
            )));
        }
        check_unit("error probability", self.error_probability)?;
        check_unit("coherence factor η", self.eta)?;
        Ok(())
    }
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(VerificationError::invalid(format!(
            "{name} must lie in [0, 1], got {value}"
        )))
    }
}

/// Result of a single trial.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrialOutcome {
    pub survived: bool,
    /// Steps completed before the catastrophe step (`max_steps` for survivors).
    pub steps_survived: u32,
    /// Cumulative error when the trial ended.
    pub accumulated_error: f64,
}

/// One trial.  `config` must already be validated.
fn simulate_trial<R: Rng + ?Sized>(config: &TrialConfig, rng: &mut R) -> TrialOutcome {
    let damping = config.damping();
    let mut accumulated = 0.0f64;

    for step in 0..config.max_steps {
        if rng.gen::<f64>() < config.error_probability {
            let z: f64 = rng.sample(StandardNormal);
            accumulated += config.noise_amplitude * z.abs() * damping;
            if accumulated > CATASTROPHE_THRESHOLD {
                return TrialOutcome {
                    survived: false,
                    steps_survived: step,
                    accumulated_error: accumulated,
                };
            }
        }
    }

    TrialOutcome {
        survived: true,
        steps_survived: config.max_steps,
        accumulated_error: accumulated,
    }
}

/// Run all trials sequentially, drawing from the injected random source.
///
/// Reproducible whenever `rng` is seeded; trials consume the stream in order.
pub fn run_trials<R: Rng + ?Sized>(config: &TrialConfig, rng: &mut R) -> Result<Vec<TrialOutcome>> {
    config.validate()?;
    info!(trials = config.trials, eta = config.eta, "running trials (sequential)");

    let outcomes: Vec<TrialOutcome> = (0..config.trials)
        .map(|_| simulate_trial(config, &mut *rng))
        .collect();

    debug!(
        survivors = outcomes.iter().filter(|o| o.survived).count(),
        "sequential run complete"
    );
    Ok(outcomes)
}

/// Run all trials across the rayon pool, one isolated stream per trial.
///
/// Outcomes come back in trial order and are bit-identical for a given seed
/// regardless of thread count.  With `seed = None` a fresh seed is drawn and
/// logged so the run can be replayed.
pub fn run_trials_parallel(config: &TrialConfig, seed: Option<u64>) -> Result<Vec<TrialOutcome>> {
    config.validate()?;
    let seed = resolve_seed(seed);
    info!(trials = config.trials, eta = config.eta, seed, "running trials (parallel)");

    let outcomes: Vec<TrialOutcome> = (0..config.trials)
        .into_par_iter()
        .map(|i| {
            let mut rng = StdRng::seed_from_u64(stream_seed(seed, i as u64));
            simulate_trial(config, &mut rng)
        })
        .collect();

    debug!(
        survivors = outcomes.iter().filter(|o| o.survived).count(),
        "parallel run complete"
    );
    Ok(outcomes)
}

/// Use the caller's seed, or draw one from thread entropy and log it.
pub(crate) fn resolve_seed(seed: Option<u64>) -> u64 {
    match seed {
        Some(seed) => seed,
        None => {
            let seed: u64 = rand::thread_rng().gen();
            info!(seed, "no seed supplied, drew a fresh one");
            seed
        }
    }
}

/// SplitMix64 output `index` of the sequence started at `seed`.
fn stream_seed(seed: u64, index: u64) -> u64 {
    let mut z = seed.wrapping_add(index.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
