//! The fit orchestrator: a stateful model object that conditions a power
//! spectrum, fits its aperiodic background and band-constrained peaks, and
//! exposes the resulting parameters.
//!
//! The lifecycle is explicit. A [`ParamSpectra`] starts with no data,
//! becomes data-attached through [`ParamSpectra::add_data`], and then moves
//! to either a fitted or a failed state when [`ParamSpectra::fit`] runs.
//! Fit failures are contained as a [`FitOutcome::Failed`] value rather than
//! an error, so batch callers can keep going; enabling debug mode on the
//! [`ModelConfig`] turns containment off.
use log::{debug, warn};

#[cfg(feature = "parallelism")]
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::aperiodic::{
    robust_ap_fit, simple_ap_fit, AperiodicFitSettings, AperiodicMode, AperiodicParams,
};
use crate::arrayops::nearest;
use crate::bands::{Band, BandScheme};
use crate::conditioner::{condition_spectrum, ConditionOptions, ConditionedSpectrum};
use crate::error::{FitErrorKind, SpecParamError};
use crate::linenoise::NoisePeak;
use crate::metrics::{r_squared, ErrorMetric};
use crate::peaks::{constrained_gaussian_fit, sum_of_gaussians, FreqDomain, GaussianParams};
use crate::solver::FitConfig;

/// The complete, immutable configuration of a spectral parameterization
/// model.
///
/// Built once with chained setters and then handed to
/// [`ParamSpectra::new`], which resolves the band scheme into its retained
/// interval list. Nothing here changes after construction, so two models
/// built from the same configuration always fit the same way.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// How the peak-constraining bands are produced
    pub scheme: BandScheme,
    /// How many bands the generated schemes produce
    pub max_n_peaks: usize,
    /// The low edge of the fitting range in Hz
    pub l_freq: f64,
    /// The high edge of the fitting range in Hz
    pub h_freq: f64,
    /// How many log-spaced sub-bands to split every band into
    pub n_division: usize,
    /// The frequency axis the peak fit runs in
    pub freq_domain: FreqDomain,
    /// The functional form of the aperiodic component
    pub aperiodic_mode: AperiodicMode,
    /// The powerline base frequency, or `None` to skip suppression
    pub linenoise: Option<f64>,
    /// The prominence threshold for powerline harmonic detection
    pub prominence: f64,
    /// Override for the aperiodic offset initial guess
    pub offset_guess: Option<f64>,
    /// Override for the aperiodic knee initial guess; defaults to the
    /// width of the fitting range
    pub knee_guess: Option<f64>,
    /// Override for the aperiodic exponent initial guess
    pub exponent_guess: Option<f64>,
    /// Percentile (0-100 scale) of flattened power retained by the robust
    /// aperiodic refit
    pub percentile_thresh: f64,
    /// Solver budget and tolerances for the aperiodic fits
    pub aperiodic_fit: FitConfig,
    /// Solver budget and tolerances for the joint peak fit
    pub peak_fit: FitConfig,
    /// The scalar goodness-of-fit metric to report
    pub error_metric: ErrorMetric,
    /// Whether to fail on unevenly spaced frequency values
    pub check_freqs: bool,
    /// Whether to fail on non-finite power values
    pub check_data: bool,
    /// When set, fit errors propagate instead of being contained
    pub debug: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            scheme: BandScheme::default(),
            max_n_peaks: 6,
            l_freq: 0.3,
            h_freq: 250.0,
            n_division: 1,
            freq_domain: FreqDomain::default(),
            aperiodic_mode: AperiodicMode::default(),
            linenoise: Some(60.0),
            prominence: 0.5,
            offset_guess: None,
            knee_guess: None,
            exponent_guess: None,
            percentile_thresh: 0.025,
            aperiodic_fit: FitConfig::default().max_iter(5_000).convergence(1e-5),
            peak_fit: FitConfig::default().max_iter(10_000).convergence(1e-8),
            error_metric: ErrorMetric::default(),
            check_freqs: true,
            check_data: true,
            debug: false,
        }
    }
}

impl ModelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// How the peak-constraining bands are produced
    pub fn scheme(mut self, scheme: BandScheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// How many bands the generated schemes produce
    pub fn max_n_peaks(mut self, max_n_peaks: usize) -> Self {
        self.max_n_peaks = max_n_peaks;
        self
    }

    /// The `[low, high]` fitting range in Hz
    pub fn freq_range(mut self, l_freq: f64, h_freq: f64) -> Self {
        self.l_freq = l_freq;
        self.h_freq = h_freq;
        self
    }

    /// How many log-spaced sub-bands to split every band into
    pub fn n_division(mut self, n_division: usize) -> Self {
        self.n_division = n_division;
        self
    }

    /// The frequency axis the peak fit runs in
    pub fn freq_domain(mut self, freq_domain: FreqDomain) -> Self {
        self.freq_domain = freq_domain;
        self
    }

    /// The functional form of the aperiodic component
    pub fn aperiodic_mode(mut self, aperiodic_mode: AperiodicMode) -> Self {
        self.aperiodic_mode = aperiodic_mode;
        self
    }

    /// The powerline base frequency, or `None` to skip suppression
    pub fn linenoise(mut self, linenoise: Option<f64>) -> Self {
        self.linenoise = linenoise;
        self
    }

    /// The prominence threshold for powerline harmonic detection
    pub fn prominence(mut self, prominence: f64) -> Self {
        self.prominence = prominence;
        self
    }

    /// The scalar goodness-of-fit metric to report
    pub fn error_metric(mut self, error_metric: ErrorMetric) -> Self {
        self.error_metric = error_metric;
        self
    }

    /// Percentile (0-100 scale) of flattened power retained by the robust
    /// aperiodic refit
    pub fn percentile_thresh(mut self, percentile_thresh: f64) -> Self {
        self.percentile_thresh = percentile_thresh;
        self
    }

    /// Solver budget and tolerances for the aperiodic fits
    pub fn aperiodic_fit(mut self, aperiodic_fit: FitConfig) -> Self {
        self.aperiodic_fit = aperiodic_fit;
        self
    }

    /// Solver budget and tolerances for the joint peak fit
    pub fn peak_fit(mut self, peak_fit: FitConfig) -> Self {
        self.peak_fit = peak_fit;
        self
    }

    /// Whether to fail on unevenly spaced frequency values
    pub fn check_freqs(mut self, check_freqs: bool) -> Self {
        self.check_freqs = check_freqs;
        self
    }

    /// Whether to fail on non-finite power values
    pub fn check_data(mut self, check_data: bool) -> Self {
        self.check_data = check_data;
        self
    }

    /// When set, fit errors propagate instead of being contained
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// The ordered band list this configuration fixes
    pub fn retained_bands(&self) -> Vec<Band> {
        self.scheme
            .retained_bands(self.max_n_peaks, self.l_freq, self.h_freq, self.n_division)
    }

    fn condition_options(&self) -> ConditionOptions {
        ConditionOptions {
            freq_range: Some((self.l_freq, self.h_freq)),
            linenoise: self.linenoise,
            prominence: self.prominence,
            check_freqs: self.check_freqs,
            check_data: self.check_data,
        }
    }

    fn aperiodic_settings(&self) -> AperiodicFitSettings {
        AperiodicFitSettings {
            offset_guess: self.offset_guess,
            knee_guess: self.knee_guess.unwrap_or(self.h_freq - self.l_freq),
            exponent_guess: self.exponent_guess,
            percentile_thresh: self.percentile_thresh,
            fit: self.aperiodic_fit.clone(),
        }
    }
}

/// Where a model is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FitState {
    /// No spectrum has been attached yet
    #[default]
    NoData,
    /// A spectrum is attached but not yet fit
    DataAttached,
    /// The last fit succeeded and results are available
    Fitted,
    /// The last fit failed; no results are available
    Failed,
}

/// Descriptive parameters of one fitted peak
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PeakParams {
    /// Center frequency in linear Hz
    pub cf: f64,
    /// Power over the aperiodic component at the center frequency
    pub pw: f64,
    /// Two-sided bandwidth in linear Hz
    pub bw: f64,
}

/// What a fit call produced.
///
/// A `Failed` outcome is a contained solver failure, not a caller error;
/// the model is left in [`FitState::Failed`] with its results cleared.
#[derive(Debug, Clone)]
pub enum FitOutcome {
    Fitted {
        r_squared: f64,
        error: f64,
        n_peaks: usize,
    },
    Failed(SpecParamError),
}

impl FitOutcome {
    pub fn is_fitted(&self) -> bool {
        matches!(self, Self::Fitted { .. })
    }
}

#[derive(Debug, Clone)]
struct FitResults {
    aperiodic: AperiodicParams,
    gaussians: Vec<GaussianParams>,
    peaks: Vec<PeakParams>,
    aperiodic_curve: Vec<f64>,
    peak_curve: Vec<f64>,
    full_model: Vec<f64>,
    r_squared: f64,
    error: f64,
}

/// A single-spectrum parameterization model.
///
/// Owns its configuration, the resolved band list, the conditioned
/// spectrum, and the fit results. Instances are independent; fitting many
/// spectra concurrently means one instance per spectrum.
#[derive(Debug, Clone)]
pub struct ParamSpectra {
    config: ModelConfig,
    bands: Vec<Band>,
    state: FitState,
    spectrum: Option<ConditionedSpectrum>,
    results: Option<FitResults>,
}

impl ParamSpectra {
    pub fn new(config: ModelConfig) -> Self {
        let bands = config.retained_bands();
        Self {
            config,
            bands,
            state: FitState::NoData,
            spectrum: None,
            results: None,
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// The ordered band list fixed at construction
    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn state(&self) -> FitState {
        self.state
    }

    pub fn has_data(&self) -> bool {
        self.spectrum.is_some()
    }

    pub fn has_model(&self) -> bool {
        self.state == FitState::Fitted
    }

    /// Attach a raw `(frequency, power)` pair, conditioning it and
    /// invalidating any previous fit results.
    pub fn add_data(&mut self, freqs: &[f64], power: &[f64]) -> Result<(), SpecParamError> {
        self.attach(freqs, power, true)
    }

    /// Re-attach data without clearing existing results.
    ///
    /// Only meaningful when the new data is identical to what the current
    /// results were fit against, for forcing a bit-identical re-derivation.
    pub fn readd_data(&mut self, freqs: &[f64], power: &[f64]) -> Result<(), SpecParamError> {
        self.attach(freqs, power, false)
    }

    fn attach(
        &mut self,
        freqs: &[f64],
        power: &[f64],
        clear_results: bool,
    ) -> Result<(), SpecParamError> {
        let spectrum = condition_spectrum(freqs, power, &self.config.condition_options())?;
        self.spectrum = Some(spectrum);
        if clear_results || self.results.is_none() {
            self.results = None;
            self.state = FitState::DataAttached;
        }
        Ok(())
    }

    /// The conditioned spectrum, if data is attached
    pub fn spectrum(&self) -> Result<&ConditionedSpectrum, SpecParamError> {
        self.spectrum.as_ref().ok_or(SpecParamError::NoData)
    }

    /// The powerline harmonics suppressed during conditioning
    pub fn noise_peaks(&self) -> Result<&[NoisePeak], SpecParamError> {
        Ok(&self.spectrum()?.noise_peaks)
    }

    fn results(&self) -> Result<&FitResults, SpecParamError> {
        self.results.as_ref().ok_or(SpecParamError::NoModel)
    }

    /// The fitted aperiodic parameters
    pub fn aperiodic_params(&self) -> Result<AperiodicParams, SpecParamError> {
        Ok(self.results()?.aperiodic)
    }

    /// The aperiodic parameters as stored: the fitted values once a fit
    /// succeeds, and the all-NaN placeholder for the configured mode in
    /// every other state.
    pub fn raw_aperiodic_params(&self) -> AperiodicParams {
        match &self.results {
            Some(results) => results.aperiodic,
            None => AperiodicParams::placeholder(self.config.aperiodic_mode),
        }
    }

    /// The raw Gaussian parameters, one per band, in band order and in the
    /// configured frequency domain
    pub fn gaussian_params(&self) -> Result<&[GaussianParams], SpecParamError> {
        Ok(&self.results()?.gaussians)
    }

    /// The descriptive peak parameters, one per band, in band order
    pub fn peak_params(&self) -> Result<&[PeakParams], SpecParamError> {
        Ok(&self.results()?.peaks)
    }

    /// The full modeled spectrum in log10 power
    pub fn modeled_spectrum(&self) -> Result<&[f64], SpecParamError> {
        Ok(&self.results()?.full_model)
    }

    /// The fitted aperiodic curve in log10 power
    pub fn aperiodic_curve(&self) -> Result<&[f64], SpecParamError> {
        Ok(&self.results()?.aperiodic_curve)
    }

    /// The summed peak curve in log10 power
    pub fn peak_curve(&self) -> Result<&[f64], SpecParamError> {
        Ok(&self.results()?.peak_curve)
    }

    /// The observed spectrum with the fitted aperiodic component removed
    pub fn flattened_spectrum(&self) -> Result<Vec<f64>, SpecParamError> {
        let spectrum = self.spectrum()?;
        let results = self.results()?;
        Ok(spectrum
            .log_power
            .iter()
            .zip(results.aperiodic_curve.iter())
            .map(|(y, ap)| y - ap)
            .collect())
    }

    pub fn r_squared(&self) -> Result<f64, SpecParamError> {
        Ok(self.results()?.r_squared)
    }

    /// The configured scalar error metric of the fit
    pub fn error(&self) -> Result<f64, SpecParamError> {
        Ok(self.results()?.error)
    }

    /// Fit the attached spectrum.
    ///
    /// Solver failures come back as `Ok(FitOutcome::Failed(..))` with the
    /// model left in [`FitState::Failed`], unless debug mode is on, in
    /// which case they propagate as `Err`. Calling without attached data
    /// is always an error.
    pub fn fit(&mut self) -> Result<FitOutcome, SpecParamError> {
        if self.spectrum.is_none() {
            return Err(SpecParamError::NoData);
        }
        match self.run_fit() {
            Ok(results) => {
                let outcome = FitOutcome::Fitted {
                    r_squared: results.r_squared,
                    error: results.error,
                    n_peaks: results.peaks.len(),
                };
                self.results = Some(results);
                self.state = FitState::Fitted;
                Ok(outcome)
            }
            Err(err) if err.is_fit_error() && !self.config.debug => {
                warn!("Model fitting was unsuccessful: {err}");
                self.results = None;
                self.state = FitState::Failed;
                Ok(FitOutcome::Failed(err))
            }
            Err(err) => Err(err),
        }
    }

    fn run_fit(&self) -> Result<FitResults, SpecParamError> {
        let spectrum = self.spectrum()?;
        let freqs = &spectrum.freqs;
        let log_power = &spectrum.log_power;

        // When add-time checking is disabled, NaN/Inf power can reach this
        // point; pre-empt the solve rather than letting it grind to an
        // uninformative non-convergence
        if !self.config.check_data && log_power.iter().any(|v| !v.is_finite()) {
            return Err(SpecParamError::fit("model fit", FitErrorKind::NonFiniteData));
        }

        let ap_settings = self.config.aperiodic_settings();
        let mode = self.config.aperiodic_mode;
        let domain = self.config.freq_domain;

        let robust = robust_ap_fit(freqs, log_power, mode, &ap_settings)?;
        let robust_curve = robust.evaluate(freqs);
        let flat: Vec<f64> = log_power
            .iter()
            .zip(robust_curve.iter())
            .map(|(y, ap)| y - ap)
            .collect();

        let gaussians =
            constrained_gaussian_fit(freqs, &flat, &self.bands, domain, &self.config.peak_fit)?;
        let xs: Vec<f64> = freqs.iter().map(|f| domain.transform(*f)).collect();
        let peak_curve = sum_of_gaussians(&xs, &gaussians);

        // With the peaks subtracted out, a plain fit on the cleaned
        // spectrum beats the percentile-trimmed estimate, so it replaces
        // the robust parameters entirely.
        let peak_removed: Vec<f64> = log_power
            .iter()
            .zip(peak_curve.iter())
            .map(|(y, pk)| y - pk)
            .collect();
        let aperiodic = simple_ap_fit(freqs, &peak_removed, mode, &ap_settings)?;
        let aperiodic_curve = aperiodic.evaluate(freqs);

        let full_model: Vec<f64> = aperiodic_curve
            .iter()
            .zip(peak_curve.iter())
            .map(|(ap, pk)| ap + pk)
            .collect();

        let peaks = derive_peak_params(&gaussians, &xs, &full_model, &aperiodic_curve, domain);
        let r2 = r_squared(log_power, &full_model);
        let error = self.config.error_metric.calculate(log_power, &full_model);
        debug!(
            "fit complete: {} peaks, r^2 {r2:0.4}, {:?} {error:0.4}",
            peaks.len(),
            self.config.error_metric
        );

        Ok(FitResults {
            aperiodic,
            gaussians,
            peaks,
            aperiodic_curve,
            peak_curve,
            full_model,
            r_squared: r2,
            error,
        })
    }
}

/// Convert raw Gaussian parameters into descriptive peak parameters.
///
/// The power height reads the fitted curves at the sample nearest the
/// Gaussian mean rather than taking the amplitude directly, so overlapping
/// neighbors are reflected in the reported height. Center and bandwidth
/// are mapped back to linear frequency when the fit ran in log space.
fn derive_peak_params(
    gaussians: &[GaussianParams],
    xs: &[f64],
    full_model: &[f64],
    aperiodic_curve: &[f64],
    domain: FreqDomain,
) -> Vec<PeakParams> {
    gaussians
        .iter()
        .map(|g| {
            let idx = nearest(xs, g.mean);
            let cf = domain.invert(g.mean);
            let bw = match domain {
                FreqDomain::Linear => 2.0 * g.sigma,
                FreqDomain::NaturalLog => (g.mean + g.sigma).exp() - (g.mean - g.sigma).exp(),
            };
            let pw = full_model[idx] - aperiodic_curve[idx];
            PeakParams { cf, pw, bw }
        })
        .collect()
}

/// Fit one independent model per spectrum, serially.
///
/// Fit failures are contained per spectrum; the per-item `Result` carries
/// only data and configuration errors.
pub fn fit_each(
    config: &ModelConfig,
    spectra: &[(Vec<f64>, Vec<f64>)],
) -> Vec<Result<ParamSpectra, SpecParamError>> {
    spectra
        .iter()
        .map(|(freqs, power)| fit_one(config, freqs, power))
        .collect()
}

/// Fit one independent model per spectrum on the rayon pool.
///
/// Output order matches input order, so callers can re-associate results
/// with their originating keys by position.
#[cfg(feature = "parallelism")]
pub fn fit_each_parallel(
    config: &ModelConfig,
    spectra: &[(Vec<f64>, Vec<f64>)],
) -> Vec<Result<ParamSpectra, SpecParamError>> {
    spectra
        .par_iter()
        .map(|(freqs, power)| fit_one(config, freqs, power))
        .collect()
}

fn fit_one(
    config: &ModelConfig,
    freqs: &[f64],
    power: &[f64],
) -> Result<ParamSpectra, SpecParamError> {
    let mut model = ParamSpectra::new(config.clone());
    model.add_data(freqs, power)?;
    model.fit()?;
    Ok(model)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::arrayops::linspace;

    fn synthetic_spectrum() -> (Vec<f64>, Vec<f64>) {
        let freqs: Vec<f64> = linspace(0.5, 45.0, 180);
        let power = freqs
            .iter()
            .map(|f| {
                let aperiodic = 10f64.powf(1.0 - 1.2 * f.log10());
                let alpha = 0.6 * (-0.5 * ((f.ln() - 10f64.ln()) / 0.1).powi(2)).exp();
                aperiodic * 10f64.powf(alpha)
            })
            .collect();
        (freqs, power)
    }

    fn test_config() -> ModelConfig {
        ModelConfig::new()
            .scheme(BandScheme::from(vec![(4.0, 8.0), (8.0, 13.0)]))
            .freq_range(0.5, 45.0)
            .aperiodic_mode(AperiodicMode::Fixed)
            .linenoise(None)
    }

    #[test]
    fn test_lifecycle_states() {
        let (freqs, power) = synthetic_spectrum();
        let mut model = ParamSpectra::new(test_config());
        assert_eq!(model.state(), FitState::NoData);
        assert!(matches!(model.fit(), Err(SpecParamError::NoData)));
        assert!(matches!(
            model.peak_params(),
            Err(SpecParamError::NoModel)
        ));

        model.add_data(&freqs, &power).unwrap();
        assert_eq!(model.state(), FitState::DataAttached);
        assert!(matches!(
            model.aperiodic_params(),
            Err(SpecParamError::NoModel)
        ));

        let outcome = model.fit().unwrap();
        assert!(outcome.is_fitted(), "{outcome:?}");
        assert_eq!(model.state(), FitState::Fitted);
        assert!(model.has_model());
    }

    #[test]
    fn test_readding_data_clears_results() {
        let (freqs, power) = synthetic_spectrum();
        let mut model = ParamSpectra::new(test_config());
        model.add_data(&freqs, &power).unwrap();
        model.fit().unwrap();
        assert!(model.has_model());

        model.add_data(&freqs, &power).unwrap();
        assert_eq!(model.state(), FitState::DataAttached);
        assert!(matches!(model.r_squared(), Err(SpecParamError::NoModel)));

        // the preserving variant keeps the record for identical data
        model.fit().unwrap();
        model.readd_data(&freqs, &power).unwrap();
        assert_eq!(model.state(), FitState::Fitted);
        assert!(model.r_squared().is_ok());
    }

    #[test]
    fn test_fit_recovers_alpha_peak() {
        let (freqs, power) = synthetic_spectrum();
        let mut model = ParamSpectra::new(test_config());
        model.add_data(&freqs, &power).unwrap();
        let outcome = model.fit().unwrap();
        assert!(outcome.is_fitted(), "{outcome:?}");

        let peaks = model.peak_params().unwrap();
        assert_eq!(peaks.len(), 2);
        // the second band holds the synthetic 10 Hz alpha peak
        let alpha = &peaks[1];
        assert!((alpha.cf - 10.0).abs() < 1.0, "{alpha:?}");
        assert!(alpha.pw > 0.3, "{alpha:?}");
        assert!(alpha.bw > 0.0, "{alpha:?}");

        let ap = model.aperiodic_params().unwrap();
        assert!((ap.exponent() - 1.2).abs() < 0.15, "{ap:?}");
        assert!(model.r_squared().unwrap() > 0.95);
    }

    #[test]
    fn test_full_model_is_sum_of_components() {
        let (freqs, power) = synthetic_spectrum();
        let mut model = ParamSpectra::new(test_config());
        model.add_data(&freqs, &power).unwrap();
        model.fit().unwrap();

        let full = model.modeled_spectrum().unwrap();
        let ap = model.aperiodic_curve().unwrap();
        let pk = model.peak_curve().unwrap();
        for ((f, a), p) in full.iter().zip(ap.iter()).zip(pk.iter()) {
            assert!((f - (a + p)).abs() < 1e-12);
        }

        let flat = model.flattened_spectrum().unwrap();
        let observed = &model.spectrum().unwrap().log_power;
        for ((flat, y), a) in flat.iter().zip(observed.iter()).zip(ap.iter()) {
            assert!((flat - (y - a)).abs() < 1e-12);
        }
    }

    #[test]
    fn test_band_order_is_preserved_in_results() {
        let (freqs, power) = synthetic_spectrum();
        let mut model = ParamSpectra::new(test_config());
        model.add_data(&freqs, &power).unwrap();
        model.fit().unwrap();

        let bands = model.bands().to_vec();
        let gaussians = model.gaussian_params().unwrap();
        assert_eq!(gaussians.len(), bands.len());
        for (g, band) in gaussians.iter().zip(bands.iter()) {
            let band = model.config().freq_domain.transform_band(band);
            assert!(
                g.mean >= band.low && g.mean <= band.high,
                "{g:?} outside {band}"
            );
        }
    }

    #[test]
    fn test_unchecked_non_finite_data_preempts_the_solve() {
        let (freqs, mut power) = synthetic_spectrum();
        // a negative power sample logs to NaN, which disabled add-time
        // checking lets through
        power[10] = -1.0;
        let mut model = ParamSpectra::new(test_config().check_data(false));
        model.add_data(&freqs, &power).unwrap();

        match model.fit().unwrap() {
            FitOutcome::Failed(SpecParamError::Fit { kind, .. }) => {
                assert_eq!(kind, FitErrorKind::NonFiniteData)
            }
            outcome => panic!("expected a contained fit failure, got {outcome:?}"),
        }
        assert_eq!(model.state(), FitState::Failed);

        // debug mode propagates the same pre-check instead of containing it
        let mut model = ParamSpectra::new(test_config().check_data(false).debug(true));
        model.add_data(&freqs, &power).unwrap();
        assert!(matches!(
            model.fit(),
            Err(SpecParamError::Fit {
                kind: FitErrorKind::NonFiniteData,
                ..
            })
        ));
    }

    #[test]
    fn test_unfit_states_report_placeholder_params() {
        let (freqs, mut power) = synthetic_spectrum();
        let mut model = ParamSpectra::new(test_config().check_data(false));
        let unfit = model.raw_aperiodic_params();
        assert!(unfit.is_placeholder());
        assert_eq!(unfit.mode(), model.config().aperiodic_mode);

        model.add_data(&freqs, &power).unwrap();
        model.fit().unwrap();
        assert!(!model.raw_aperiodic_params().is_placeholder());

        // a contained failure resets the parameters to the placeholder
        power[10] = -1.0;
        model.add_data(&freqs, &power).unwrap();
        model.fit().unwrap();
        assert_eq!(model.state(), FitState::Failed);
        assert!(model.raw_aperiodic_params().is_placeholder());
    }

    #[test]
    fn test_data_errors_propagate_from_add_data() {
        let mut model = ParamSpectra::new(test_config());
        let err = model.add_data(&[1.0, 2.0, 3.0], &[1.0, 2.0]);
        assert!(matches!(err, Err(SpecParamError::Data(_))));
        assert_eq!(model.state(), FitState::NoData);
    }

    #[test]
    fn test_serial_and_parallel_batches_agree() {
        let spectra: Vec<_> = (0..4).map(|_| synthetic_spectrum()).collect();
        let config = test_config();
        let serial = fit_each(&config, &spectra);
        assert_eq!(serial.len(), 4);
        for model in &serial {
            assert!(model.as_ref().unwrap().has_model());
        }

        #[cfg(feature = "parallelism")]
        {
            let parallel = fit_each_parallel(&config, &spectra);
            for (a, b) in serial.iter().zip(parallel.iter()) {
                let a = a.as_ref().unwrap();
                let b = b.as_ref().unwrap();
                assert_eq!(a.r_squared().unwrap(), b.r_squared().unwrap());
                assert_eq!(a.peak_params().unwrap(), b.peak_params().unwrap());
            }
        }
    }
}
