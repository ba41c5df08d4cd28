//! Goodness-of-fit measures comparing the observed log-power spectrum to
//! the full model curve.
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::SpecParamError;

/// Which scalar error measure to report after fitting
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ErrorMetric {
    /// Mean absolute error
    Mae,
    /// Mean squared error
    Mse,
    /// Root mean squared error
    Rmse,
    /// Mean absolute percentage error
    #[default]
    Mape,
}

impl ErrorMetric {
    /// Compute this metric between the observed and modeled arrays
    pub fn calculate(&self, observed: &[f64], modeled: &[f64]) -> f64 {
        let n = observed.len() as f64;
        match self {
            Self::Mae => {
                observed
                    .iter()
                    .zip(modeled.iter())
                    .map(|(y, yhat)| (y - yhat).abs())
                    .sum::<f64>()
                    / n
            }
            Self::Mse => {
                observed
                    .iter()
                    .zip(modeled.iter())
                    .map(|(y, yhat)| (y - yhat).powi(2))
                    .sum::<f64>()
                    / n
            }
            Self::Rmse => Self::Mse.calculate(observed, modeled).sqrt(),
            Self::Mape => {
                observed
                    .iter()
                    .zip(modeled.iter())
                    .map(|(y, yhat)| ((y - yhat) / y).abs())
                    .sum::<f64>()
                    / n
            }
        }
    }
}

impl FromStr for ErrorMetric {
    type Err = SpecParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MAE" => Ok(Self::Mae),
            "MSE" => Ok(Self::Mse),
            "RMSE" => Ok(Self::Rmse),
            "MAPE" => Ok(Self::Mape),
            _ => Err(SpecParamError::Configuration(format!(
                "error metric '{s}' not understood or not implemented"
            ))),
        }
    }
}

/// The squared Pearson correlation coefficient between the observed and
/// modeled arrays.
pub fn r_squared(observed: &[f64], modeled: &[f64]) -> f64 {
    let n = observed.len() as f64;
    let mean_obs = observed.iter().sum::<f64>() / n;
    let mean_mod = modeled.iter().sum::<f64>() / n;

    let mut covariance = 0.0;
    let mut var_obs = 0.0;
    let mut var_mod = 0.0;
    for (y, yhat) in observed.iter().zip(modeled.iter()) {
        let dy = y - mean_obs;
        let dyhat = yhat - mean_mod;
        covariance += dy * dyhat;
        var_obs += dy * dy;
        var_mod += dyhat * dyhat;
    }

    (covariance / (var_obs * var_mod).sqrt()).powi(2)
}
