use thiserror::Error;

/// Fatal error conditions raised by the core.
///
/// Recoverable degradations (no coverage, no intersection, a pipeline stage
/// returning empty, an optimization budget running out) are *not* modeled
/// here: they are folded into the relevant result type as warning strings,
/// per the core's "no silent fallbacks without a warning entry" policy.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ThermoError {
    #[error("temperature must be positive, got {0} K")]
    InvalidTemperature(f64),
    #[error("empty row list passed to {0}")]
    EmptyRowList(String),
    #[error("reversed temperature range: tmin={0} > tmax={1}")]
    ReversedRange(f64, f64),
    #[error("numeric domain error evaluating {component}: {detail}")]
    EvaluationError { component: String, detail: String },
    #[error("reaction stoichiometry has {coefficients} coefficients for {compounds} compounds")]
    StoichiometryMismatch {
        coefficients: usize,
        compounds: usize,
    },
}

/// Convenience alias, mirrors `feos_core::errors::EosResult`.
pub type ThermoResult<T> = Result<T, ThermoError>;
