//! The periodic component: one Gaussian per pre-specified band, fit jointly
//! against the flattened (aperiodic-removed) spectrum.
//!
//! The joint objective evaluates the *sum* of the per-band Gaussians over
//! the entire spectrum, so a band can absorb spillover from its neighbors,
//! while each Gaussian's mean and width are projected back into its own
//! band's bounds after every solver step.
use log::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::bands::Band;
use crate::error::{FitErrorKind, SpecParamError};
use crate::solver::{fit_model, CurveModel, FitConfig};

/// Which frequency axis the peak fit runs against.
///
/// The choice changes the meaning of every fitted mean and width, so it is
/// threaded explicitly through fitting, curve evaluation, and the
/// derived-parameter conversions rather than inferred.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FreqDomain {
    /// Fit against frequency as given
    Linear,
    /// Fit against the natural logarithm of frequency
    #[default]
    NaturalLog,
}

impl FreqDomain {
    /// Map a linear frequency into this domain
    pub fn transform(&self, freq: f64) -> f64 {
        match self {
            Self::Linear => freq,
            Self::NaturalLog => freq.ln(),
        }
    }

    /// Map a coordinate in this domain back to linear frequency
    pub fn invert(&self, x: f64) -> f64 {
        match self {
            Self::Linear => x,
            Self::NaturalLog => x.exp(),
        }
    }

    pub fn transform_band(&self, band: &Band) -> Band {
        match self {
            Self::Linear => *band,
            Self::NaturalLog => band.to_natural_log(),
        }
    }
}

/// Compute the gaussian standard deviation, given the full-width half-max
pub fn gauss_std_from_fwhm(fwhm: f64) -> f64 {
    fwhm / (2.0 * (2.0 * 2f64.ln()).sqrt())
}

/// Parameters of one fitted Gaussian, expressed in the frequency domain the
/// fit ran in
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GaussianParams {
    pub amplitude: f64,
    pub mean: f64,
    pub sigma: f64,
}

impl GaussianParams {
    pub fn new(amplitude: f64, mean: f64, sigma: f64) -> Self {
        Self {
            amplitude,
            mean,
            sigma,
        }
    }

    pub fn density(&self, x: f64) -> f64 {
        self.amplitude * (-0.5 * (x - self.mean).powi(2) / self.sigma.powi(2)).exp()
    }
}

/// A Gaussian anchored to the band that constrains it
#[derive(Debug, Clone, Copy)]
struct BandGaussian {
    params: GaussianParams,
    band: Band,
    sigma_bound: f64,
}

impl BandGaussian {
    /// Initial parameters for a band: the tallest in-band sample as
    /// amplitude, the mean in-band frequency as mean, and the deviation
    /// implied by treating half the band width as a full-width-half-max.
    fn guess(xs: &[f64], ys: &[f64], band: Band) -> Self {
        let mut amplitude = f64::NEG_INFINITY;
        let mut freq_sum = 0.0;
        let mut count = 0usize;
        for (x, y) in xs.iter().zip(ys.iter()) {
            if band.contains(*x) {
                amplitude = amplitude.max(*y);
                freq_sum += x;
                count += 1;
            }
        }
        let (amplitude, mean) = if count > 0 {
            (amplitude, freq_sum / count as f64)
        } else {
            // no samples landed in the band, start from an empty peak at
            // its midpoint
            (0.0, (band.low + band.high) / 2.0)
        };
        Self {
            params: GaussianParams::new(amplitude, mean, gauss_std_from_fwhm(band.width() / 2.0)),
            band,
            sigma_bound: gauss_std_from_fwhm(band.width()),
        }
    }

    fn project(&mut self) {
        // the band is half-open at the top, so a mean pushed past the high
        // edge lands strictly below it and cannot collide with the next
        // band's low edge
        self.params.mean = self
            .params
            .mean
            .clamp(self.band.low, self.band.high.next_down());
        let sigma_min = self.sigma_bound * 1e-3;
        self.params.sigma = self.params.sigma.clamp(sigma_min, self.sigma_bound);
    }
}

/// The joint sum-of-Gaussians model over every retained band
#[derive(Debug, Clone)]
struct BandGaussianModel {
    components: Vec<BandGaussian>,
}

impl CurveModel for BandGaussianModel {
    fn density(&self, x: f64) -> f64 {
        self.components.iter().map(|c| c.params.density(x)).sum()
    }

    fn gradient(&self, xs: &[f64], ys: &[f64]) -> Self {
        let n = xs.len() as f64;
        let mut gradient = self.clone();
        for component in gradient.components.iter_mut() {
            component.params = GaussianParams::default();
        }

        for (x, y) in xs.iter().zip(ys.iter()) {
            let r = self.density(*x) - y;
            for (component, out) in self.components.iter().zip(gradient.components.iter_mut()) {
                let GaussianParams {
                    amplitude,
                    mean,
                    sigma,
                } = component.params;
                let delta = x - mean;
                let shape = (-0.5 * delta.powi(2) / sigma.powi(2)).exp();
                out.params.amplitude += 2.0 * r * shape / n;
                out.params.mean += 2.0 * r * amplitude * shape * delta / sigma.powi(2) / n;
                out.params.sigma += 2.0 * r * amplitude * shape * delta.powi(2) / sigma.powi(3) / n;
            }
        }
        gradient
    }

    fn gradient_update(&mut self, gradient: &Self, step: f64) {
        for (component, grad) in self.components.iter_mut().zip(gradient.components.iter()) {
            component.params.amplitude -= grad.params.amplitude * step;
            component.params.mean -= grad.params.mean * step;
            component.params.sigma -= grad.params.sigma * step;
        }
    }

    fn project(&mut self) {
        for component in self.components.iter_mut() {
            component.project();
        }
    }
}

/// Evaluate a sum of Gaussians over `xs`.
///
/// `xs` and the Gaussian means must share a frequency domain; when fitting
/// ran in natural-log space, pass logged coordinates.
pub fn sum_of_gaussians(xs: &[f64], params: &[GaussianParams]) -> Vec<f64> {
    xs.iter()
        .map(|x| params.iter().map(|p| p.density(*x)).sum())
        .collect()
}

/// Fit one Gaussian per band, jointly, against the flattened spectrum.
///
/// `freqs` are linear frequencies; they and the band edges are transformed
/// into `domain` before fitting, and the returned parameters are expressed
/// in that domain.
pub fn constrained_gaussian_fit(
    freqs: &[f64],
    flat_spectrum: &[f64],
    bands: &[Band],
    domain: FreqDomain,
    config: &FitConfig,
) -> Result<Vec<GaussianParams>, SpecParamError> {
    let xs: Vec<f64> = freqs.iter().map(|f| domain.transform(*f)).collect();

    let components: Vec<BandGaussian> = bands
        .iter()
        .map(|band| BandGaussian::guess(&xs, flat_spectrum, domain.transform_band(band)))
        .collect();
    let mut model = BandGaussianModel { components };

    let result = fit_model(&mut model, &xs, flat_spectrum, config);
    if !result.success {
        return Err(SpecParamError::fit("peak fit", FitErrorKind::NoParameters));
    }
    debug!(
        "peak fit over {} bands settled at loss {:0.6} after {} iterations",
        bands.len(),
        result.loss,
        result.iterations
    );

    Ok(model.components.into_iter().map(|c| c.params).collect())
}
