//! The iterative least-squares machinery shared by the aperiodic and peak
//! fitters.
//!
//! Models expose an analytic gradient of their mean-squared-error loss and
//! the driver walks downhill with a backtracking step size: a step that
//! worsens the loss is retried at half the length, and an accepted step
//! grows the length back. Feasibility constraints (knee non-negativity,
//! band bounds) are enforced by projecting after every update, so bounded
//! parameters never leave their region no matter what the gradient says.
use std::fmt::Debug;

use log::trace;

/// Hyperparameters for an iterative curve fit
#[derive(Debug, Clone)]
pub struct FitConfig {
    /// The maximum number of gradient evaluations to spend on a fit
    pub max_iter: usize,
    /// The initial step length for parameter updates
    pub learning_rate: f64,
    /// The relative loss-improvement threshold at which to declare convergence
    pub convergence: f64,
}

impl FitConfig {
    /// The maximum number of gradient evaluations to spend on a fit
    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// The initial step length for parameter updates
    pub fn learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// The relative loss-improvement threshold at which to declare convergence
    pub fn convergence(mut self, convergence: f64) -> Self {
        self.convergence = convergence;
        self
    }
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            max_iter: 5_000,
            learning_rate: 0.05,
            convergence: 1e-5,
        }
    }
}

/// Describe a fitting procedure's output
#[derive(Debug, Default, Clone, Copy)]
pub struct ModelFitResult {
    /// The loss at the end of the optimization run
    pub loss: f64,
    /// The number of iterations run
    pub iterations: usize,
    /// Whether or not the model converged within the iteration budget
    pub converged: bool,
    /// Whether or not the model was able to fit *at all*
    pub success: bool,
}

impl ModelFitResult {
    pub fn new(loss: f64, iterations: usize, converged: bool, success: bool) -> Self {
        Self {
            loss,
            iterations,
            converged,
            success,
        }
    }
}

/// A parametric curve whose parameters can be estimated by iterative
/// descent against `(x, y)` sample pairs.
pub trait CurveModel: Clone + Debug {
    /// Compute the theoretical value at a specified coordinate
    fn density(&self, x: f64) -> f64;

    /// Compute the gradient of the loss function for parameter optimization
    fn gradient(&self, xs: &[f64], ys: &[f64]) -> Self;

    /// Update the parameters of the model based upon the `gradient` and a
    /// given step length
    fn gradient_update(&mut self, gradient: &Self, step: f64);

    /// Clamp the parameters back into the feasible region
    fn project(&mut self) {}

    /// Given a coordinate sequence, produce the complementary sequence of
    /// theoretical values
    fn predict(&self, xs: &[f64]) -> Vec<f64> {
        xs.iter().map(|x| self.density(*x)).collect()
    }

    /// Compute the loss function for optimization, mean-squared error
    fn loss(&self, xs: &[f64], ys: &[f64]) -> f64 {
        xs.iter()
            .zip(ys.iter())
            .map(|(x, y)| (y - self.density(*x)).powi(2))
            .sum::<f64>()
            / xs.len() as f64
    }
}

/// Fit `model` against the sample pairs `(xs, ys)` in place, returning a
/// description of how the optimization went.
pub fn fit_model<M: CurveModel>(
    model: &mut M,
    xs: &[f64],
    ys: &[f64],
    config: &FitConfig,
) -> ModelFitResult {
    let mut step = config.learning_rate;
    model.project();

    let mut loss = model.loss(xs, ys);
    if !loss.is_finite() {
        return ModelFitResult::new(loss, 0, false, false);
    }

    let mut best_loss = loss;
    let mut best_params = model.clone();
    let mut iters = 0;
    let mut converged = false;

    for it in 0..config.max_iter {
        iters = it;
        let gradient = model.gradient(xs, ys);

        // Take a trial step, backtracking while it worsens the loss
        let mut trial = model.clone();
        trial.gradient_update(&gradient, step);
        trial.project();
        let mut trial_loss = trial.loss(xs, ys);
        let mut backtracks = 0;
        while (!trial_loss.is_finite() || trial_loss > loss) && backtracks < 32 {
            step *= 0.5;
            trial = model.clone();
            trial.gradient_update(&gradient, step);
            trial.project();
            trial_loss = trial.loss(xs, ys);
            backtracks += 1;
        }

        if !trial_loss.is_finite() || trial_loss > loss {
            // No usable downhill direction remains at any step length
            trace!("{it}: no descent step found, stopping");
            converged = true;
            break;
        }

        let delta = loss - trial_loss;
        *model = trial;
        loss = trial_loss;
        trace!("{it}: Loss = {loss:0.6}: step = {step:0.3e}");

        if loss < best_loss {
            best_loss = loss;
            best_params = model.clone();
        }

        if delta / (loss + 1e-6) < config.convergence {
            trace!("{it}: Convergence = {delta}");
            converged = true;
            break;
        }

        step *= 1.25;
    }

    let success = best_loss.is_finite();
    *model = best_params;
    ModelFitResult::new(best_loss, iters, converged, success)
}

#[cfg(test)]
mod test {
    use super::*;

    /// `y = a + b x`, the simplest possible curve for exercising the driver
    #[derive(Debug, Clone, Default)]
    struct Line {
        intercept: f64,
        slope: f64,
    }

    impl CurveModel for Line {
        fn density(&self, x: f64) -> f64 {
            self.intercept + self.slope * x
        }

        fn gradient(&self, xs: &[f64], ys: &[f64]) -> Self {
            let n = xs.len() as f64;
            let mut d_intercept = 0.0;
            let mut d_slope = 0.0;
            for (x, y) in xs.iter().zip(ys.iter()) {
                let r = self.density(*x) - y;
                d_intercept += 2.0 * r;
                d_slope += 2.0 * r * x;
            }
            Self {
                intercept: d_intercept / n,
                slope: d_slope / n,
            }
        }

        fn gradient_update(&mut self, gradient: &Self, step: f64) {
            self.intercept -= gradient.intercept * step;
            self.slope -= gradient.slope * step;
        }
    }

    #[test_log::test]
    fn test_fits_a_line() {
        let xs: Vec<f64> = (0..50).map(|i| i as f64 * 0.1).collect();
        let ys: Vec<f64> = xs.iter().map(|x| 3.0 - 0.7 * x).collect();

        let mut model = Line::default();
        let result = fit_model(&mut model, &xs, &ys, &FitConfig::default().convergence(1e-12));

        assert!(result.success);
        assert!((model.intercept - 3.0).abs() < 1e-4, "{model:?}");
        assert!((model.slope + 0.7).abs() < 1e-4, "{model:?}");
    }

    #[test]
    fn test_non_finite_data_fails() {
        let xs = vec![0.0, 1.0, 2.0];
        let ys = vec![1.0, f64::NAN, 3.0];

        let mut model = Line::default();
        let result = fit_model(&mut model, &xs, &ys, &FitConfig::default());
        assert!(!result.success);
    }
}
