//! Flat extraction of a fitted model into an order-stable parameter record.
//!
//! The record layout is a pure function of the configuration (aperiodic
//! mode, band count, expected harmonic count), never of what the fit found,
//! so records from many spectra can be stacked into a table column-wise.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::aperiodic::AperiodicParams;
use crate::error::SpecParamError;
use crate::linenoise::{harmonic_frequencies, NoisePeak, HARMONIC_MATCH_RTOL};
use crate::model::{ParamSpectra, PeakParams};
use crate::peaks::GaussianParams;

/// Everything a fitted model reports, in one flat-serializable value.
///
/// Aperiodic parameters come first, then the raw Gaussian parameters in
/// band order, then one frequency slot and one half-width slot per
/// *expected* powerline harmonic (NaN where no harmonic was detected),
/// then the descriptive peak parameters in band order, then r-squared and
/// the configured error metric.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ModelRecord {
    pub aperiodic: AperiodicParams,
    pub gaussians: Vec<GaussianParams>,
    /// Detected harmonic frequency per expected harmonic, NaN when absent
    pub noise_freqs: Vec<f64>,
    /// Interpolation half-width per expected harmonic, NaN when absent
    pub noise_half_widths: Vec<f64>,
    pub peaks: Vec<PeakParams>,
    pub r_squared: f64,
    pub error: f64,
}

impl ModelRecord {
    /// Extract the record from a fitted model.
    ///
    /// Fails with a no-model error unless the model's last fit succeeded.
    pub fn from_model(model: &ParamSpectra) -> Result<Self, SpecParamError> {
        let spectrum = model.spectrum()?;
        let expected = match model.config().linenoise {
            Some(base) => harmonic_frequencies(spectrum.freq_range.1, base),
            None => Vec::new(),
        };
        let (noise_freqs, noise_half_widths) =
            assign_harmonic_slots(&expected, &spectrum.noise_peaks);

        Ok(Self {
            aperiodic: model.aperiodic_params()?,
            gaussians: model.gaussian_params()?.to_vec(),
            noise_freqs,
            noise_half_widths,
            peaks: model.peak_params()?.to_vec(),
            r_squared: model.r_squared()?,
            error: model.error()?,
        })
    }

    /// Flatten into the stable value order
    pub fn to_vec(&self) -> Vec<f64> {
        let mut out = self.aperiodic.to_vec();
        for g in &self.gaussians {
            out.extend([g.amplitude, g.mean, g.sigma]);
        }
        out.extend(&self.noise_freqs);
        out.extend(&self.noise_half_widths);
        for p in &self.peaks {
            out.extend([p.cf, p.pw, p.bw]);
        }
        out.extend([self.r_squared, self.error]);
        out
    }

    /// Column names matching [`ModelRecord::to_vec`] position for position
    pub fn labels(&self) -> Vec<String> {
        let mut out: Vec<String> = match self.aperiodic {
            AperiodicParams::Fixed { .. } => vec!["offset".into(), "exponent".into()],
            AperiodicParams::Knee { .. } => {
                vec!["offset".into(), "knee".into(), "exponent".into()]
            }
        };
        for i in 0..self.gaussians.len() {
            out.extend([format!("amp{i}"), format!("mean{i}"), format!("std{i}")]);
        }
        for i in 0..self.noise_freqs.len() {
            out.push(format!("noise{i}"));
        }
        for i in 0..self.noise_half_widths.len() {
            out.push(format!("noisewidth{i}"));
        }
        for i in 0..self.peaks.len() {
            out.extend([format!("cf{i}"), format!("pw{i}"), format!("bw{i}")]);
        }
        out.extend(["rsq".into(), "error".into()]);
        out
    }

    pub fn len(&self) -> usize {
        self.aperiodic.to_vec().len()
            + 3 * self.gaussians.len()
            + 2 * self.noise_freqs.len()
            + 3 * self.peaks.len()
            + 2
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Assign each detected noise peak to its nearest expected harmonic slot
fn assign_harmonic_slots(
    expected: &[f64],
    detected: &[NoisePeak],
) -> (Vec<f64>, Vec<f64>) {
    let mut freqs = vec![f64::NAN; expected.len()];
    let mut half_widths = vec![f64::NAN; expected.len()];
    for (slot, harmonic) in expected.iter().enumerate() {
        let hit = detected
            .iter()
            .find(|p| (p.freq - harmonic).abs() <= HARMONIC_MATCH_RTOL * harmonic);
        if let Some(peak) = hit {
            freqs[slot] = peak.freq;
            half_widths[slot] = peak.half_width();
        }
    }
    (freqs, half_widths)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::arrayops::linspace;
    use crate::bands::BandScheme;
    use crate::model::ModelConfig;

    fn spectrum_with_line_noise(spike: bool) -> (Vec<f64>, Vec<f64>) {
        let freqs: Vec<f64> = linspace(0.5, 100.0, 400);
        let power = freqs
            .iter()
            .map(|f| {
                let aperiodic = 10f64.powf(1.0 - 1.2 * f.log10());
                let alpha = 0.6 * (-0.5 * ((f.ln() - 10f64.ln()) / 0.1).powi(2)).exp();
                let noise = if spike {
                    1.2 * (-0.5 * ((f - 60.0) / 0.3).powi(2)).exp()
                } else {
                    0.0
                };
                aperiodic * 10f64.powf(alpha + noise)
            })
            .collect();
        (freqs, power)
    }

    fn fitted_model(spike: bool) -> ParamSpectra {
        let config = ModelConfig::new()
            .scheme(BandScheme::from(vec![(4.0, 8.0), (8.0, 13.0)]))
            .freq_range(0.5, 100.0)
            .aperiodic_mode(crate::aperiodic::AperiodicMode::Fixed);
        let (freqs, power) = spectrum_with_line_noise(spike);
        let mut model = ParamSpectra::new(config);
        model.add_data(&freqs, &power).unwrap();
        let outcome = model.fit().unwrap();
        assert!(outcome.is_fitted(), "{outcome:?}");
        model
    }

    #[test]
    fn test_record_requires_a_fitted_model() {
        let config = ModelConfig::new();
        let model = ParamSpectra::new(config);
        assert!(matches!(
            ModelRecord::from_model(&model),
            Err(SpecParamError::NoData)
        ));
    }

    #[test]
    fn test_record_layout_is_stable() {
        let record = ModelRecord::from_model(&fitted_model(false)).unwrap();
        let values = record.to_vec();
        let labels = record.labels();
        assert_eq!(values.len(), labels.len());
        assert_eq!(values.len(), record.len());

        // fixed mode, 2 bands, 1 expected harmonic below 100 Hz
        assert_eq!(record.len(), 2 + 3 * 2 + 2 * 1 + 3 * 2 + 2);
        assert_eq!(labels[0], "offset");
        assert_eq!(labels[1], "exponent");
        assert_eq!(labels.last().unwrap(), "error");
    }

    #[test]
    fn test_unmatched_harmonic_slots_are_nan() {
        let record = ModelRecord::from_model(&fitted_model(false)).unwrap();
        assert_eq!(record.noise_freqs.len(), 1);
        assert!(record.noise_freqs[0].is_nan());
        assert!(record.noise_half_widths[0].is_nan());
    }

    #[test]
    fn test_detected_harmonic_fills_its_slot() {
        let record = ModelRecord::from_model(&fitted_model(true)).unwrap();
        assert_eq!(record.noise_freqs.len(), 1);
        assert!((record.noise_freqs[0] - 60.0).abs() < 1.5, "{record:?}");
        assert!(record.noise_half_widths[0] > 0.0);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_record_serialization() {
        // the spiked spectrum fills the harmonic slots, keeping the record
        // free of NaN values that JSON cannot carry
        let record = ModelRecord::from_model(&fitted_model(true)).unwrap();
        let text = serde_json::to_string(&record).unwrap();
        let duplicate: ModelRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(record.gaussians, duplicate.gaussians);
        assert_eq!(record.peaks, duplicate.peaks);
        assert_eq!(record.r_squared, duplicate.r_squared);
    }

    #[test]
    fn test_slot_assignment_skips_far_peaks() {
        let expected = [60.0, 120.0];
        let detected = [NoisePeak {
            freq: 119.0,
            range: (117.0, 121.0),
        }];
        let (freqs, widths) = assign_harmonic_slots(&expected, &detected);
        assert!(freqs[0].is_nan());
        assert!((freqs[1] - 119.0).abs() < 1e-9);
        assert!((widths[1] - 2.0).abs() < 1e-9);
    }
}
