//! Validation and preparation of raw spectra ahead of fitting.
//!
//! Input frequency and power arrays arrive in linear scale. Conditioning
//! trims the requested range, drops a zero first frequency, verifies even
//! spacing, interpolates away powerline harmonics, and log-transforms the
//! power values, failing loudly on anything the fit cannot tolerate.
use log::warn;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::arrayops::isclose;
use crate::error::SpecParamError;
use crate::linenoise::{suppress_powerline, NoisePeak};

/// Knobs controlling what conditioning does and how strict it is
#[derive(Debug, Clone)]
pub struct ConditionOptions {
    /// Restrict the spectrum to `[low, high]` inclusive before anything else
    pub freq_range: Option<(f64, f64)>,
    /// The base powerline frequency, or `None` to disable suppression
    pub linenoise: Option<f64>,
    /// The prominence threshold for harmonic detection
    pub prominence: f64,
    /// Whether to fail on unevenly spaced frequency values
    pub check_freqs: bool,
    /// Whether to fail on NaN/Inf power values after logging
    pub check_data: bool,
}

impl Default for ConditionOptions {
    fn default() -> Self {
        Self {
            freq_range: None,
            linenoise: Some(60.0),
            prominence: 0.5,
            check_freqs: true,
            check_data: true,
        }
    }
}

/// A spectrum ready for model fitting
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConditionedSpectrum {
    /// Frequency values, linear scale, strictly positive
    pub freqs: Vec<f64>,
    /// Power values in log10 scale
    pub log_power: Vec<f64>,
    /// The realized `[min, max]` of the frequency axis
    pub freq_range: (f64, f64),
    /// The spacing between consecutive frequency samples
    pub freq_res: f64,
    /// The powerline harmonics that were interpolated away
    pub noise_peaks: Vec<NoisePeak>,
}

impl ConditionedSpectrum {
    pub fn len(&self) -> usize {
        self.freqs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.freqs.is_empty()
    }
}

/// Validate and prepare a raw `(frequency, power)` pair.
///
/// Each step is a hard precondition for the next; the first violated
/// contract aborts conditioning with a [`SpecParamError::Data`].
pub fn condition_spectrum(
    freqs: &[f64],
    power: &[f64],
    options: &ConditionOptions,
) -> Result<ConditionedSpectrum, SpecParamError> {
    if freqs.len() != power.len() {
        return Err(SpecParamError::Data(format!(
            "the input frequencies ({}) and power values ({}) are not consistent sizes",
            freqs.len(),
            power.len()
        )));
    }
    if freqs.is_empty() {
        return Err(SpecParamError::Data("the input arrays are empty".into()));
    }

    let (mut freqs, mut power) = match options.freq_range {
        Some((low, high)) => trim_spectrum(freqs, power, low, high),
        None => (freqs.to_vec(), power.to_vec()),
    };

    // The aperiodic model is undefined at zero frequency
    if freqs.first() == Some(&0.0) {
        warn!("Skipping frequency == 0, as this causes a problem with fitting");
        freqs.remove(0);
        power.remove(0);
    }

    if freqs.len() < 3 {
        return Err(SpecParamError::Data(format!(
            "too few samples remain after trimming ({})",
            freqs.len()
        )));
    }

    let freq_res = freqs[1] - freqs[0];
    if options.check_freqs {
        let uneven = freqs
            .windows(2)
            .any(|w| !isclose(w[1] - w[0], freq_res));
        if uneven {
            return Err(SpecParamError::Data(
                "the input frequency values are not evenly spaced; the model expects \
                 equidistant frequency values in linear scale"
                    .into(),
            ));
        }
    }

    let noise_peaks = match options.linenoise {
        Some(base) => suppress_powerline(&freqs, &mut power, base, options.prominence),
        None => Vec::new(),
    };

    let log_power: Vec<f64> = power.iter().map(|p| p.log10()).collect();
    if options.check_data && log_power.iter().any(|v| !v.is_finite()) {
        return Err(SpecParamError::Data(
            "the input power values, after logging, contain NaNs or Infs; one reason this \
             can happen is if inputs are already logged, but they should be in linear scale"
                .into(),
        ));
    }

    let freq_range = (freqs[0], freqs[freqs.len() - 1]);
    Ok(ConditionedSpectrum {
        freqs,
        log_power,
        freq_range,
        freq_res,
        noise_peaks,
    })
}

/// Extract the samples with frequency in `[low, high]` inclusive
pub fn trim_spectrum(
    freqs: &[f64],
    power: &[f64],
    low: f64,
    high: f64,
) -> (Vec<f64>, Vec<f64>) {
    freqs
        .iter()
        .zip(power.iter())
        .filter(|(f, _)| **f >= low && **f <= high)
        .map(|(f, p)| (*f, *p))
        .unzip()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::arrayops::linspace;

    fn powerlaw(freqs: &[f64]) -> Vec<f64> {
        freqs.iter().map(|f| 10.0 / f.max(1e-9)).collect()
    }

    #[test]
    fn test_basic_conditioning() {
        let freqs = linspace(0.5, 50.0, 100);
        let power = powerlaw(&freqs);
        let spectrum = condition_spectrum(&freqs, &power, &ConditionOptions::default()).unwrap();
        assert_eq!(spectrum.len(), 100);
        assert!((spectrum.freq_range.0 - 0.5).abs() < 1e-9);
        assert!((spectrum.freq_range.1 - 50.0).abs() < 1e-9);
        assert!(spectrum.freq_res > 0.0);
        // power came back logged
        assert!((spectrum.log_power[0] - (10.0f64 / 0.5).log10()).abs() < 1e-9);
    }

    #[test]
    fn test_length_mismatch_is_a_data_error() {
        let err = condition_spectrum(&[1.0, 2.0], &[1.0], &ConditionOptions::default());
        assert!(matches!(err, Err(SpecParamError::Data(_))));
    }

    #[test]
    fn test_range_restriction() {
        let freqs = linspace(1.0, 100.0, 100);
        let power = powerlaw(&freqs);
        let options = ConditionOptions {
            freq_range: Some((10.0, 50.0)),
            ..Default::default()
        };
        let spectrum = condition_spectrum(&freqs, &power, &options).unwrap();
        assert!(spectrum.freqs.iter().all(|f| *f >= 10.0 && *f <= 50.0));
        assert!(spectrum.freq_range.0 >= 10.0 && spectrum.freq_range.1 <= 50.0);
    }

    #[test]
    fn test_zero_frequency_is_dropped() {
        let freqs = linspace(0.0, 50.0, 101);
        let power = powerlaw(&freqs);
        let spectrum = condition_spectrum(&freqs, &power, &ConditionOptions::default()).unwrap();
        assert!(spectrum.freqs[0] > 0.0);
        assert_eq!(spectrum.len(), 100);
    }

    #[test]
    fn test_uneven_spacing_is_a_data_error() {
        let freqs = vec![1.0, 2.0, 3.0, 5.0, 6.0];
        let power = powerlaw(&freqs);
        let err = condition_spectrum(&freqs, &power, &ConditionOptions::default());
        assert!(matches!(err, Err(SpecParamError::Data(_))));

        // with checking disabled the same input conditions fine
        let options = ConditionOptions {
            check_freqs: false,
            ..Default::default()
        };
        assert!(condition_spectrum(&freqs, &power, &options).is_ok());
    }

    #[test]
    fn test_already_logged_input_is_a_data_error() {
        let freqs: Vec<f64> = linspace(1.0, 50.0, 100);
        // logging a negative value produces NaN, which the check catches
        let power: Vec<f64> = freqs.iter().map(|f| -f.log10()).collect();
        let err = condition_spectrum(&freqs, &power, &ConditionOptions::default());
        assert!(matches!(err, Err(SpecParamError::Data(_))));
    }

    #[test]
    fn test_harmonic_suppression_is_recorded() {
        let freqs = linspace(1.0, 150.0, 299);
        let power: Vec<f64> = freqs
            .iter()
            .map(|f| 10.0 / f + 80.0 / f * (-0.5 * ((f - 60.0) / 0.5_f64).powi(2)).exp())
            .collect();
        let spectrum = condition_spectrum(&freqs, &power, &ConditionOptions::default()).unwrap();
        assert_eq!(spectrum.noise_peaks.len(), 1);
        assert!((spectrum.noise_peaks[0].freq - 60.0).abs() < 1.0);
    }

    #[test]
    fn test_disabled_linenoise_records_nothing() {
        let freqs = linspace(1.0, 150.0, 299);
        let power = powerlaw(&freqs);
        let options = ConditionOptions {
            linenoise: None,
            ..Default::default()
        };
        let spectrum = condition_spectrum(&freqs, &power, &options).unwrap();
        assert!(spectrum.noise_peaks.is_empty());
    }
}
