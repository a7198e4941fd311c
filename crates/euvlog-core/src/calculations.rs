use serde::{Deserialize, Serialize};

use crate::error::{LogError, Result};

/// A sample counts as "on" only when strictly above this threshold. One
/// constant for every positivity test, so exact zeros with rounding noise are
/// treated as off everywhere.
pub const POSITIVITY_EPSILON: f64 = 1e-10;

/// Adjacent samples at least this many seconds apart are never integrated
/// together.
pub const GAP_THRESHOLD_SECS: f64 = 2.0;

/// Energy delivered per laser pulse, in joules (500 µJ).
pub const DEFAULT_ENERGY_PER_PULSE_J: f64 = 5e-4;

// ── Segment ───────────────────────────────────────────────────────────────────

/// A maximal run of samples where both signals are on and the sampling never
/// stalls. `start` and `end` are inclusive sample indices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
    /// `t[end] - t[start]`, in seconds.
    pub duration_secs: f64,
    /// Number of samples covered (`end - start + 1`).
    pub sample_count: usize,
    /// Arithmetic mean of power over the covered samples.
    pub mean_power: f64,
    /// Trapezoidal integral of power over the segment.
    pub energy: f64,
}

/// Result of [`SegmentIntegrator::compute_total_energy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyIntegral {
    pub total_energy: f64,
    pub shot_count: f64,
    pub segments: Vec<Segment>,
}

impl EnergyIntegral {
    /// Total seconds covered by all segments.
    pub fn integrated_time_secs(&self) -> f64 {
        self.segments.iter().map(|s| s.duration_secs).sum()
    }

    /// Total samples covered by all segments.
    pub fn integrated_points(&self) -> usize {
        self.segments.iter().map(|s| s.sample_count).sum()
    }
}

// ── SegmentIntegrator ─────────────────────────────────────────────────────────

/// Segment-based energy integration over an index-aligned power signal and
/// an indicator signal.
#[derive(Debug, Clone, Copy)]
pub struct SegmentIntegrator {
    gap_threshold_secs: f64,
}

impl Default for SegmentIntegrator {
    fn default() -> Self {
        Self {
            gap_threshold_secs: GAP_THRESHOLD_SECS,
        }
    }
}

impl SegmentIntegrator {
    pub fn new(gap_threshold_secs: f64) -> Self {
        Self { gap_threshold_secs }
    }

    pub fn gap_threshold_secs(&self) -> f64 {
        self.gap_threshold_secs
    }

    /// Integrate `power` over `t` within contiguous segments and convert the
    /// total to a shot count.
    ///
    /// Null power/indicator entries count as `0.0` for the validity test and
    /// are never dropped, so alignment with `t` is preserved.
    ///
    /// # Errors
    /// [`LogError::LengthMismatch`] when the three inputs differ in length,
    /// and [`LogError::NonPositiveEnergyPerPulse`] when `energy_per_pulse` is
    /// not strictly positive. Both indicate a bug at the call site.
    pub fn compute_total_energy(
        &self,
        t: &[f64],
        power: &[Option<f64>],
        indicator: &[Option<f64>],
        energy_per_pulse: f64,
    ) -> Result<EnergyIntegral> {
        if t.len() != power.len() || t.len() != indicator.len() {
            return Err(LogError::LengthMismatch {
                t: t.len(),
                power: power.len(),
                indicator: indicator.len(),
            });
        }
        if energy_per_pulse.is_nan() || energy_per_pulse <= 0.0 {
            return Err(LogError::NonPositiveEnergyPerPulse(energy_per_pulse));
        }

        let p: Vec<f64> = power.iter().map(|v| v.unwrap_or(0.0)).collect();
        let valid: Vec<bool> = p
            .iter()
            .zip(indicator)
            .map(|(&pw, ind)| pw > POSITIVITY_EPSILON && ind.unwrap_or(0.0) > POSITIVITY_EPSILON)
            .collect();

        let n = t.len();
        let mut segments = Vec::new();
        let mut run_start: Option<usize> = None;

        for i in 0..n.saturating_sub(1) {
            let contiguous = t[i + 1] - t[i] < self.gap_threshold_secs;
            let pair_ok = valid[i] && valid[i + 1] && contiguous;

            match (pair_ok, run_start) {
                (true, None) => run_start = Some(i),
                (false, Some(start)) => {
                    segments.push(build_segment(t, &p, start, i));
                    run_start = None;
                }
                _ => {}
            }
        }
        if let Some(start) = run_start {
            segments.push(build_segment(t, &p, start, n - 1));
        }

        let total_energy: f64 = segments.iter().map(|s| s.energy).sum();

        Ok(EnergyIntegral {
            total_energy,
            shot_count: total_energy / energy_per_pulse,
            segments,
        })
    }
}

/// Shorthand for [`SegmentIntegrator::compute_total_energy`] with the default
/// gap threshold.
pub fn compute_total_energy(
    t: &[f64],
    power: &[Option<f64>],
    indicator: &[Option<f64>],
    energy_per_pulse: f64,
) -> Result<EnergyIntegral> {
    SegmentIntegrator::default().compute_total_energy(t, power, indicator, energy_per_pulse)
}

/// Summarise samples `start..=end`, integrating pairwise by the trapezoid rule.
fn build_segment(t: &[f64], p: &[f64], start: usize, end: usize) -> Segment {
    let energy = (start..end)
        .map(|i| 0.5 * (p[i] + p[i + 1]) * (t[i + 1] - t[i]))
        .sum();
    let sample_count = end - start + 1;
    let mean_power = p[start..=end].iter().sum::<f64>() / sample_count as f64;

    Segment {
        start,
        end,
        duration_secs: t[end] - t[start],
        sample_count,
        mean_power,
        energy,
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
