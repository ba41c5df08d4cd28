//! The aperiodic component: the smooth 1/f-like background of a power
//! spectrum, modeled in log10 power as an offset minus a (possibly
//! knee-adjusted) power-law decay.
use std::f64::consts::LN_10;
use std::str::FromStr;

use log::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::arrayops::percentile;
use crate::error::{FitErrorKind, SpecParamError};
use crate::solver::{fit_model, CurveModel, FitConfig};

/// Which approach to take for fitting the aperiodic component
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AperiodicMode {
    /// A pure power law, `log10 P = offset - exponent * log10 f`
    Fixed,
    /// A power law that flattens below the knee frequency,
    /// `log10 P = offset - log10(knee + f^exponent)`
    #[default]
    Knee,
}

impl FromStr for AperiodicMode {
    type Err = SpecParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fixed" => Ok(Self::Fixed),
            "knee" => Ok(Self::Knee),
            _ => Err(SpecParamError::Configuration(format!(
                "aperiodic mode '{s}' not understood, expected 'fixed' or 'knee'"
            ))),
        }
    }
}

/// Parameters of a fitted aperiodic component.
///
/// The variant carries the mode, so internally-built values can never be
/// inconsistent; only the slice boundary ([`TryFrom`]) can still reject a
/// parameter count that maps to no known mode.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AperiodicParams {
    Fixed {
        offset: f64,
        exponent: f64,
    },
    Knee {
        offset: f64,
        knee: f64,
        exponent: f64,
    },
}

impl AperiodicParams {
    pub fn mode(&self) -> AperiodicMode {
        match self {
            Self::Fixed { .. } => AperiodicMode::Fixed,
            Self::Knee { .. } => AperiodicMode::Knee,
        }
    }

    /// The all-NaN placeholder marking the "no model" state for a mode
    pub fn placeholder(mode: AperiodicMode) -> Self {
        match mode {
            AperiodicMode::Fixed => Self::Fixed {
                offset: f64::NAN,
                exponent: f64::NAN,
            },
            AperiodicMode::Knee => Self::Knee {
                offset: f64::NAN,
                knee: f64::NAN,
                exponent: f64::NAN,
            },
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.to_vec().iter().all(|v| v.is_nan())
    }

    pub fn offset(&self) -> f64 {
        match self {
            Self::Fixed { offset, .. } | Self::Knee { offset, .. } => *offset,
        }
    }

    pub fn exponent(&self) -> f64 {
        match self {
            Self::Fixed { exponent, .. } | Self::Knee { exponent, .. } => *exponent,
        }
    }

    pub fn knee(&self) -> Option<f64> {
        match self {
            Self::Fixed { .. } => None,
            Self::Knee { knee, .. } => Some(*knee),
        }
    }

    /// As the ordered `[offset, (knee), exponent]` tuple
    pub fn to_vec(&self) -> Vec<f64> {
        match *self {
            Self::Fixed { offset, exponent } => vec![offset, exponent],
            Self::Knee {
                offset,
                knee,
                exponent,
            } => vec![offset, knee, exponent],
        }
    }

    /// Evaluate the aperiodic curve over a frequency axis, in log10 power.
    ///
    /// In knee mode, any non-positive `knee + f^exponent` is replaced by the
    /// smallest positive value the expression takes anywhere on the axis, so
    /// the output is finite even for parameter combinations that would
    /// otherwise log a non-positive number.
    pub fn evaluate(&self, freqs: &[f64]) -> Vec<f64> {
        match *self {
            Self::Fixed { offset, exponent } => freqs
                .iter()
                .map(|f| offset - exponent * f.log10())
                .collect(),
            Self::Knee {
                offset,
                knee,
                exponent,
            } => {
                let inner: Vec<f64> = freqs.iter().map(|f| knee + f.powf(exponent)).collect();
                let floor = inner
                    .iter()
                    .copied()
                    .filter(|v| *v > 0.0)
                    .fold(f64::INFINITY, f64::min);
                let floor = if floor.is_finite() {
                    floor
                } else {
                    f64::MIN_POSITIVE
                };
                inner
                    .into_iter()
                    .map(|v| offset - if v > 0.0 { v } else { floor }.log10())
                    .collect()
            }
        }
    }
}

impl TryFrom<&[f64]> for AperiodicParams {
    type Error = SpecParamError;

    fn try_from(params: &[f64]) -> Result<Self, Self::Error> {
        match *params {
            [offset, exponent] => Ok(Self::Fixed { offset, exponent }),
            [offset, knee, exponent] => Ok(Self::Knee {
                offset,
                knee,
                exponent,
            }),
            _ => Err(SpecParamError::InconsistentParameters(params.len())),
        }
    }
}

impl CurveModel for AperiodicParams {
    fn density(&self, x: f64) -> f64 {
        match *self {
            Self::Fixed { offset, exponent } => offset - exponent * x.log10(),
            Self::Knee {
                offset,
                knee,
                exponent,
            } => offset - (knee + x.powf(exponent)).log10(),
        }
    }

    fn gradient(&self, xs: &[f64], ys: &[f64]) -> Self {
        let n = xs.len() as f64;
        match *self {
            Self::Fixed { offset, exponent } => {
                let mut d_offset = 0.0;
                let mut d_exponent = 0.0;
                for (x, y) in xs.iter().zip(ys.iter()) {
                    let r = (offset - exponent * x.log10()) - y;
                    d_offset += 2.0 * r;
                    d_exponent += -2.0 * r * x.log10();
                }
                Self::Fixed {
                    offset: d_offset / n,
                    exponent: d_exponent / n,
                }
            }
            Self::Knee {
                offset,
                knee,
                exponent,
            } => {
                let mut d_offset = 0.0;
                let mut d_knee = 0.0;
                let mut d_exponent = 0.0;
                for (x, y) in xs.iter().zip(ys.iter()) {
                    let x_pow = x.powf(exponent);
                    let inner = knee + x_pow;
                    let r = (offset - inner.log10()) - y;
                    d_offset += 2.0 * r;
                    // d/dk -log10(k + x^e) = -1 / (ln10 (k + x^e))
                    d_knee += -2.0 * r / (LN_10 * inner);
                    d_exponent += -2.0 * r * x_pow * x.ln() / (LN_10 * inner);
                }
                Self::Knee {
                    offset: d_offset / n,
                    knee: d_knee / n,
                    exponent: d_exponent / n,
                }
            }
        }
    }

    fn gradient_update(&mut self, gradient: &Self, step: f64) {
        match (self, gradient) {
            (
                Self::Fixed { offset, exponent },
                Self::Fixed {
                    offset: d_offset,
                    exponent: d_exponent,
                },
            ) => {
                *offset -= d_offset * step;
                *exponent -= d_exponent * step;
            }
            (
                Self::Knee {
                    offset,
                    knee,
                    exponent,
                },
                Self::Knee {
                    offset: d_offset,
                    knee: d_knee,
                    exponent: d_exponent,
                },
            ) => {
                *offset -= d_offset * step;
                *knee -= d_knee * step;
                *exponent -= d_exponent * step;
            }
            (this, gradient) => panic!("Invalid gradient {gradient:?} for model {this:?}"),
        }
    }

    fn project(&mut self) {
        // The knee lower bound is pinned at zero, which also keeps
        // knee + f^exponent positive for the pointwise solve
        if let Self::Knee { knee, .. } = self {
            if *knee < 0.0 {
                *knee = 0.0;
            }
        }
    }
}

/// Tunables for the aperiodic fit
#[derive(Debug, Clone)]
pub struct AperiodicFitSettings {
    /// Override for the offset initial guess; defaults to the second
    /// log-power sample
    pub offset_guess: Option<f64>,
    /// Initial guess for the knee parameter, in knee mode
    pub knee_guess: f64,
    /// Override for the exponent initial guess; defaults to the absolute
    /// log-log slope between the first and last samples
    pub exponent_guess: Option<f64>,
    /// Percentile (0-100 scale) of the flattened spectrum below which
    /// points are retained for the robust refit
    pub percentile_thresh: f64,
    /// The solver budget and tolerances
    pub fit: FitConfig,
}

impl Default for AperiodicFitSettings {
    fn default() -> Self {
        Self {
            offset_guess: None,
            knee_guess: 0.0,
            exponent_guess: None,
            percentile_thresh: 0.025,
            fit: FitConfig::default(),
        }
    }
}

/// Build the initial parameter guess from the data and settings
fn initial_guess(
    freqs: &[f64],
    log_power: &[f64],
    mode: AperiodicMode,
    settings: &AperiodicFitSettings,
) -> AperiodicParams {
    let n = log_power.len();
    let offset = settings
        .offset_guess
        .unwrap_or_else(|| log_power.get(1).copied().unwrap_or(log_power[0]));
    let exponent = settings.exponent_guess.unwrap_or_else(|| {
        ((log_power[n - 1] - log_power[0]) / (freqs[n - 1].log10() - freqs[0].log10())).abs()
    });
    match mode {
        AperiodicMode::Fixed => AperiodicParams::Fixed { offset, exponent },
        AperiodicMode::Knee => AperiodicParams::Knee {
            offset,
            knee: settings.knee_guess,
            exponent,
        },
    }
}

fn run_fit(
    mut params: AperiodicParams,
    freqs: &[f64],
    log_power: &[f64],
    settings: &AperiodicFitSettings,
    stage: &'static str,
) -> Result<AperiodicParams, SpecParamError> {
    let result = fit_model(&mut params, freqs, log_power, &settings.fit);
    if !result.success {
        return Err(SpecParamError::fit(stage, FitErrorKind::NoParameters));
    }
    debug!(
        "{stage} settled at loss {:0.6} after {} iterations (converged: {})",
        result.loss, result.iterations, result.converged
    );
    Ok(params)
}

/// Fit the aperiodic component directly against the given spectrum.
///
/// This is the fast first-pass estimate: guesses are derived from the data
/// and the solve runs against every sample, peaks included.
pub fn simple_ap_fit(
    freqs: &[f64],
    log_power: &[f64],
    mode: AperiodicMode,
    settings: &AperiodicFitSettings,
) -> Result<AperiodicParams, SpecParamError> {
    let guess = initial_guess(freqs, log_power, mode, settings);
    run_fit(guess, freqs, log_power, settings, "simple aperiodic fit")
}

/// Fit the aperiodic component robustly, ignoring peak-contaminated points.
///
/// Runs a simple fit, flattens the spectrum against it, clips negative
/// residuals, and refits using only the points at or below the configured
/// residual percentile, seeded with the first fit's parameters.
pub fn robust_ap_fit(
    freqs: &[f64],
    log_power: &[f64],
    mode: AperiodicMode,
    settings: &AperiodicFitSettings,
) -> Result<AperiodicParams, SpecParamError> {
    let popt = simple_ap_fit(freqs, log_power, mode, settings)?;
    let initial_fit = popt.evaluate(freqs);

    let flatspec: Vec<f64> = log_power
        .iter()
        .zip(initial_fit.iter())
        .map(|(y, yhat)| (y - yhat).max(0.0))
        .collect();

    let thresh = percentile(&flatspec, settings.percentile_thresh);
    let mut freqs_keep = Vec::new();
    let mut power_keep = Vec::new();
    for (i, flat) in flatspec.iter().enumerate() {
        if *flat <= thresh {
            freqs_keep.push(freqs[i]);
            power_keep.push(log_power[i]);
        }
    }

    let n_params = popt.to_vec().len();
    if freqs_keep.len() < n_params {
        return Err(SpecParamError::fit(
            "robust aperiodic fit",
            FitErrorKind::IncompatibleSubsample,
        ));
    }

    run_fit(
        popt,
        &freqs_keep,
        &power_keep,
        settings,
        "robust aperiodic fit",
    )
}
