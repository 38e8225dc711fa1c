//! Statistical verification suite for the EnGeΛ coherence-filter claims.
//!
//! Each module checks one quantitative claim with a reproducible numerical
//! experiment, so a claim is either backed by a number or visibly fails.
//!
//! # Modules
//!
//! - [`trial`]     — Monte Carlo error-accumulation trials (chaos vs η-filtered)
//! - [`survival`]  — survival-rate aggregation, regime comparison, η sweep
//! - [`circular`]  — Rayleigh test for phase clustering + fixed-window count
//! - [`lattice`]   — nearest-node fit of observed distances to a resonance lattice
//! - [`catalog`]   — small-body catalog selection feeding the lattice fit
//! - [`spectrum`]  — FFT harmonic peaks matched against known geophysical cycles
//! - [`error`]     — shared error type
//!
//! # Running tests
//!
//! ```bash
//! cd verification && cargo test -- --nocapture
//! ```
//!
//! The end-to-end demo prints every table in one pass:
//!
//! ```bash
//! cd verification && cargo run --example engel_pipeline --release
//! ```
//!
//! Logs go through `tracing`; install a subscriber (e.g. `tracing-subscriber`
//! with `RUST_LOG=engel_verification=debug`) to see seeds and per-run counts.

pub mod catalog;
pub mod circular;
pub mod error;
pub mod lattice;
pub mod spectrum;
pub mod survival;
pub mod trial;

pub use circular::{rayleigh_test, CircularStatResult, ClusteringWindow, PhaseSample};
pub use error::{Result, VerificationError};
pub use lattice::{fit, FitResult, LatticeRule, LinearLattice, ObservedRecord, Tolerance};
pub use survival::{aggregate, compare, Regime, RegimeComparison, SurvivalReport};
pub use trial::{run_trials, run_trials_parallel, TrialConfig, TrialOutcome};
