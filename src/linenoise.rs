//! Detection and removal of powerline harmonic contamination.
//!
//! Mains noise shows up as narrow spikes at the base line frequency and its
//! integer multiples. Left in place they dominate the aperiodic fit, so
//! before log-transforming the spectrum we find local maxima near expected
//! harmonic frequencies and patch the contaminated span by interpolation.
use log::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The relative tolerance for matching a detected maximum to an expected
/// harmonic frequency.
pub const HARMONIC_MATCH_RTOL: f64 = 5e-2;

/// A detected powerline harmonic and the frequency span interpolated away
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NoisePeak {
    /// The frequency of the detected local maximum
    pub freq: f64,
    /// The `[low, high]` frequency span replaced by interpolation
    pub range: (f64, f64),
}

impl NoisePeak {
    /// Half of the interpolated span's width
    pub fn half_width(&self) -> f64 {
        (self.range.1 - self.range.0) / 2.0
    }
}

/// Enumerate the expected harmonic frequencies of `base` up to the top of
/// the frequency axis.
pub fn harmonic_frequencies(f_max: f64, base: f64) -> Vec<f64> {
    let max_harmonic = (f_max / base).floor() as usize;
    (1..=max_harmonic).map(|i| base * i as f64).collect()
}

/// Indices of strict-or-flat local maxima in `values`
fn local_maxima(values: &[f64]) -> Vec<usize> {
    let n = values.len();
    let mut indices = Vec::new();
    for i in 1..n.saturating_sub(1) {
        if values[i] >= values[i - 1] && values[i] >= values[i + 1] {
            indices.push(i);
        }
    }
    indices
}

/// Topographic prominence of the local maximum at `idx`: the drop from the
/// peak to the higher of the two valley floors separating it from taller
/// terrain (or the signal edge).
fn peak_prominence(values: &[f64], idx: usize) -> f64 {
    let peak = values[idx];

    let mut left_base = peak;
    let mut i = idx;
    while i > 0 {
        i -= 1;
        if values[i] > peak {
            break;
        }
        left_base = left_base.min(values[i]);
    }

    let mut right_base = peak;
    let mut i = idx;
    while i + 1 < values.len() {
        i += 1;
        if values[i] > peak {
            break;
        }
        right_base = right_base.min(values[i]);
    }

    peak - left_base.max(right_base)
}

/// The full width, in samples, of the peak at `idx` measured where the
/// signal crosses `peak - prominence * rel_height`, with the crossing
/// positions found by linear interpolation.
fn peak_width_samples(values: &[f64], idx: usize, rel_height: f64) -> f64 {
    let prominence = peak_prominence(values, idx);
    let height = values[idx] - prominence * rel_height;
    let n = values.len();

    let mut i = idx;
    while i > 0 && values[i - 1] >= height {
        i -= 1;
    }
    let left = if i > 0 {
        // crossing position between samples, by linear interpolation
        (i - 1) as f64 + (height - values[i - 1]) / (values[i] - values[i - 1])
    } else {
        i as f64
    };

    let mut j = idx;
    while j + 1 < n && values[j + 1] >= height {
        j += 1;
    }
    let right = if j + 1 < n {
        j as f64 + (values[j] - height) / (values[j] - values[j + 1])
    } else {
        j as f64
    };

    right - left
}

/// Detect local maxima of the base-10 logged spectrum whose prominence
/// clears `prominence` and whose frequency lies within 5% of an expected
/// harmonic of `base`.
///
/// The contaminated span around each detection is estimated from the peak's
/// width at 50% relative height on the linear spectrum, extended a full
/// width to either side of the maximum.
pub fn detect_harmonic_peaks(
    freqs: &[f64],
    power: &[f64],
    base: f64,
    prominence: f64,
) -> Vec<NoisePeak> {
    if freqs.is_empty() {
        return Vec::new();
    }
    let harmonics = harmonic_frequencies(freqs[freqs.len() - 1], base);
    if harmonics.is_empty() {
        return Vec::new();
    }

    let log_power: Vec<f64> = power.iter().map(|p| p.log10()).collect();
    let n = freqs.len() - 1;

    let mut found = Vec::new();
    for idx in local_maxima(&log_power) {
        if peak_prominence(&log_power, idx) < prominence {
            continue;
        }
        let freq = freqs[idx];
        let near_harmonic = harmonics
            .iter()
            .any(|h| (freq - h).abs() <= HARMONIC_MATCH_RTOL * h);
        if !near_harmonic {
            continue;
        }

        let width = peak_width_samples(power, idx, 0.5);
        let lo = freqs[(idx as f64 - width).max(0.0) as usize];
        let hi = freqs[((idx as f64 + width) as usize).min(n)];
        debug!("Detected harmonic peak at {freq:.2} Hz, interpolating [{lo:.2}, {hi:.2}]");
        found.push(NoisePeak {
            freq,
            range: (lo, hi),
        });
    }
    found
}

/// Replace the power samples falling inside `range` by interpolating,
/// linearly in log-log space, between the samples flanking the range.
pub fn interpolate_range(freqs: &[f64], power: &mut [f64], range: (f64, f64)) {
    let n = freqs.len();
    let Some(start) = freqs.iter().position(|f| *f >= range.0) else {
        return;
    };
    let end = freqs.iter().rposition(|f| *f <= range.1).unwrap_or(start);
    if start > end {
        return;
    }

    let lo_i = start.saturating_sub(1);
    let hi_i = (end + 1).min(n - 1);
    if lo_i == hi_i {
        return;
    }

    let x0 = freqs[lo_i].log10();
    let x1 = freqs[hi_i].log10();
    let y0 = power[lo_i].log10();
    let y1 = power[hi_i].log10();
    let slope = (y1 - y0) / (x1 - x0);

    for i in start..=end.min(n - 1) {
        let y = y0 + slope * (freqs[i].log10() - x0);
        power[i] = 10f64.powf(y);
    }
}

/// Detect and interpolate away every accepted powerline harmonic, returning
/// the records of what was removed. A spectrum with no accepted harmonics is
/// returned unmodified with an empty record list.
pub fn suppress_powerline(
    freqs: &[f64],
    power: &mut [f64],
    base: f64,
    prominence: f64,
) -> Vec<NoisePeak> {
    let peaks = detect_harmonic_peaks(freqs, power, base, prominence);
    for peak in &peaks {
        interpolate_range(freqs, power, peak.range);
    }
    peaks
}
