//! `specband` is a library for parameterizing neural power spectra,
//! decomposing a power spectral density into a smooth 1/f-like aperiodic
//! component and a set of band-constrained oscillatory peaks.
//!
//! The model object is [`ParamSpectra`], configured once with a
//! [`ModelConfig`] that fixes the band scheme, frequency range, aperiodic
//! mode, and solver budgets. Attach a raw `(frequency, power)` pair with
//! [`ParamSpectra::add_data`] and run [`ParamSpectra::fit`]; the fitted
//! parameters are then available individually, or all at once as a flat
//! [`ModelRecord`].
//!
//! Unlike free-form spectral parameterization, peaks here are constrained
//! to pre-specified frequency bands ([`BandScheme`]): exactly one Gaussian
//! is fit per band, jointly, with each Gaussian's center and width bounded
//! by its band. Powerline harmonics are detected and interpolated away
//! before fitting.
//!
//! # Usage
//! ```
//! use specband::{AperiodicMode, BandScheme, ModelConfig, ParamSpectra};
//!
//! // a synthetic 1/f spectrum with an alpha peak at 10 Hz
//! let freqs: Vec<f64> = (2..=200).map(|i| i as f64 * 0.25).collect();
//! let power: Vec<f64> = freqs
//!     .iter()
//!     .map(|f| {
//!         let aperiodic = 10f64.powf(1.0 - 1.2 * f.log10());
//!         let alpha = 0.6 * (-0.5 * ((f.ln() - 10f64.ln()) / 0.1).powi(2)).exp();
//!         aperiodic * 10f64.powf(alpha)
//!     })
//!     .collect();
//!
//! let config = ModelConfig::new()
//!     .scheme(BandScheme::from(vec![(4.0, 8.0), (8.0, 13.0)]))
//!     .freq_range(0.5, 50.0)
//!     .aperiodic_mode(AperiodicMode::Fixed)
//!     .linenoise(None);
//! let mut model = ParamSpectra::new(config);
//! model.add_data(&freqs, &power).unwrap();
//!
//! let outcome = model.fit().unwrap();
//! assert!(outcome.is_fitted());
//! let alpha = model.peak_params().unwrap()[1];
//! assert!((alpha.cf - 10.0).abs() < 1.0);
//! ```
pub mod aperiodic;
pub mod arrayops;
pub mod bands;
pub mod conditioner;
pub mod error;
pub mod linenoise;
pub mod metrics;
pub mod model;
pub mod output;
pub mod peaks;
pub mod solver;

pub use crate::aperiodic::{AperiodicMode, AperiodicParams};
pub use crate::bands::{Band, BandScheme};
pub use crate::conditioner::{ConditionOptions, ConditionedSpectrum};
pub use crate::error::{FitErrorKind, SpecParamError};
pub use crate::linenoise::NoisePeak;
pub use crate::metrics::ErrorMetric;
pub use crate::model::{fit_each, FitOutcome, FitState, ModelConfig, ParamSpectra, PeakParams};
pub use crate::output::ModelRecord;
pub use crate::peaks::{FreqDomain, GaussianParams};
pub use crate::solver::{CurveModel, FitConfig, ModelFitResult};

#[cfg(feature = "parallelism")]
pub use crate::model::fit_each_parallel;
