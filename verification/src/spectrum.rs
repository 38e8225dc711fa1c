//! Harmonic content of a uniformly sampled series.
//!
//! One-sided magnitude spectrum via forward FFT, local-maximum peak picking
//! relative to the strongest bin, and nearest-match lookup of each peak
//! period against a table of known geophysical cycles.
//!
//! Bin k (1 ≤ k < N/2) has frequency k / (N·dt) and period N·dt / k.  The DC
//! bin is excluded: it has no period.

use num_complex::Complex;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, VerificationError};

type Cx = Complex<f64>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectralBin {
    pub frequency: f64,
    pub period: f64,
    pub magnitude: f64,
}

/// A named cycle with its period (years).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReferencePeriod {
    pub name: &'static str,
    pub period: f64,
}

/// Inner-core wobble, PTA monopole, lunar nodal, Hale and ENSO cycles.
pub const GEOPHYSICAL_CYCLES: [ReferencePeriod; 5] = [
    ReferencePeriod { name: "ICW", period: 8.5 },
    ReferencePeriod { name: "PTA", period: 8.0 },
    ReferencePeriod { name: "nodal", period: 18.6 },
    ReferencePeriod { name: "Hale", period: 22.14 },
    ReferencePeriod { name: "ENSO", period: 2.7 },
];

/// Sum of unit-phase sines Σ Aᵢ sin(2π t / Tᵢ), sampled at t = k·dt.
pub fn harmonic_signal(components: &[(f64, f64)], dt: f64, samples: usize) -> Vec<f64> {
    (0..samples)
        .map(|k| {
            let t = k as f64 * dt;
            components
                .iter()
                .map(|&(period, amplitude)| amplitude * (std::f64::consts::TAU * t / period).sin())
                .sum()
        })
        .collect()
}

/// |FFT| over bins 1..N/2.
pub fn power_spectrum(signal: &[f64], dt: f64) -> Result<Vec<SpectralBin>> {
    let n = signal.len();
    if n < 4 {
        return Err(VerificationError::insufficient("power spectrum", 4, n));
    }
    if !dt.is_finite() || dt <= 0.0 {
        return Err(VerificationError::invalid(format!(
            "sample spacing must be positive, got {dt}"
        )));
    }
    if signal.iter().any(|x| !x.is_finite()) {
        return Err(VerificationError::NonFinite("signal sample"));
    }

    let mut planner = FftPlanner::<f64>::new();
    let fwd = planner.plan_fft_forward(n);
    let mut buf: Vec<Cx> = signal.iter().map(|&x| Cx::new(x, 0.0)).collect();
    fwd.process(&mut buf);

    let span = n as f64 * dt;
    let bins: Vec<SpectralBin> = buf
        .iter()
        .enumerate()
        .take(n / 2)
        .skip(1)
        .map(|(k, c)| SpectralBin {
            frequency: k as f64 / span,
            period: span / k as f64,
            magnitude: c.norm(),
        })
        .collect();

    debug!(samples = n, dt, bins = bins.len(), "power spectrum");
    Ok(bins)
}

/// Interior local maxima at or above `min_relative_height` × the strongest
/// bin, strongest first.
pub fn find_peaks(spectrum: &[SpectralBin], min_relative_height: f64) -> Result<Vec<SpectralBin>> {
    if !min_relative_height.is_finite() || !(0.0..=1.0).contains(&min_relative_height) {
        return Err(VerificationError::invalid(format!(
            "relative peak height must lie in [0, 1], got {min_relative_height}"
        )));
    }
    let max = spectrum.iter().map(|b| b.magnitude).fold(0.0f64, f64::max);
    let floor = max * min_relative_height;

    let mut peaks: Vec<SpectralBin> = spectrum
        .windows(3)
        .filter(|w| w[1].magnitude > w[0].magnitude && w[1].magnitude > w[2].magnitude)
        .map(|w| w[1])
        .filter(|b| b.magnitude > 0.0 && b.magnitude >= floor)
        .collect();
    peaks.sort_by(|a, b| b.magnitude.total_cmp(&a.magnitude));
    Ok(peaks)
}

/// Reference cycle closest in period, with the absolute period gap.
pub fn match_reference<'a>(
    period: f64,
    references: &'a [ReferencePeriod],
) -> Option<(&'a ReferencePeriod, f64)> {
    references
        .iter()
        .map(|r| (r, (period - r.period).abs()))
        .min_by(|a, b| a.1.total_cmp(&b.1))
}
