//! The ways model construction and fitting can fail.
use thiserror::Error;

/// Distinguish what stage of a nonlinear solve went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FitErrorKind {
    /// The solver ran out of its evaluation budget, or walked into a
    /// non-finite loss, without settling on parameters.
    #[error("no parameters found within the solver budget")]
    NoParameters,
    /// The robust refit was handed too few points to constrain the model.
    #[error("the percentile sub-sample is too small to fit against")]
    IncompatibleSubsample,
    /// NaN or Inf values were present in the data, pre-empting the solve.
    #[error("non-finite values in the data preclude fitting")]
    NonFiniteData,
}

/// All the ways spectral parameterization can fail
#[derive(Debug, Clone, Error)]
pub enum SpecParamError {
    /// Malformed, incompatible, or non-finite input data. Always propagates.
    #[error("data error: {0}")]
    Data(String),
    /// A solver failure. Contained by the orchestrator unless debug mode is on.
    #[error("fit error in {stage}: {kind}")]
    Fit {
        stage: &'static str,
        kind: FitErrorKind,
    },
    /// An unrecognized scheme, metric, or mode name. Always propagates.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A parameter tuple that maps to no known aperiodic mode.
    #[error("aperiodic parameters of length {0} are inconsistent with available modes")]
    InconsistentParameters(usize),
    /// An operation that requires attached data was called without any.
    #[error("no data available, cannot proceed")]
    NoData,
    /// An operation that requires a successful fit was called without one.
    #[error("no model has been fit")]
    NoModel,
}

impl SpecParamError {
    pub fn fit(stage: &'static str, kind: FitErrorKind) -> Self {
        Self::Fit { stage, kind }
    }

    /// Whether the orchestrator should contain this error rather than
    /// propagate it.
    pub fn is_fit_error(&self) -> bool {
        matches!(self, Self::Fit { .. })
    }
}
