//! A single immutable configuration struct threaded through every
//! component, per spec: never consult the environment or a global.

/// Default transition-enthalpy priors (kJ/mol), placeholders per the
/// spec's open question — callers may override them via [`CoreConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionPriors {
    pub melting_kj_per_mol: f64,
    pub boiling_kj_per_mol: f64,
    pub unknown_kj_per_mol: f64,
}

impl Default for TransitionPriors {
    fn default() -> Self {
        Self {
            melting_kj_per_mol: 25.0,
            boiling_kj_per_mol: 80.0,
            unknown_kj_per_mol: 10.0,
        }
    }
}

/// Score weights for [`crate::catalog::OptimizationScore`]. Must sum to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub w_r: f64,
    pub w_q: f64,
    pub w_t: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            w_r: 0.5,
            w_q: 0.3,
            w_t: 0.2,
        }
    }
}

/// Every tunable named in the spec's configuration table, with its
/// documented default.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreConfig {
    pub integration_points: usize,
    pub max_temperature: f64,
    pub gap_threshold: f64,
    pub overlap_threshold: f64,
    pub max_reliability_class: u8,
    pub require_298k_coverage: bool,
    pub gap_tolerance_k: f64,
    pub transition_tolerance_k: f64,
    pub coeffs_comparison_tolerance: f64,
    pub max_optimization_time_ms: u64,
    pub max_virtual_records: usize,
    pub min_score_improvement: f64,
    pub weights: ScoreWeights,
    pub transition_priors: TransitionPriors,
    pub max_records_per_formula: usize,
    pub max_records: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            integration_points: 400,
            max_temperature: 6000.0,
            gap_threshold: 1.0,
            overlap_threshold: 1.0,
            max_reliability_class: 3,
            require_298k_coverage: true,
            gap_tolerance_k: 1.0,
            transition_tolerance_k: 10.0,
            coeffs_comparison_tolerance: 1e-6,
            max_optimization_time_ms: 50,
            max_virtual_records: 100,
            min_score_improvement: 0.01,
            weights: ScoreWeights::default(),
            transition_priors: TransitionPriors::default(),
            max_records_per_formula: 10,
            max_records: 1,
        }
    }
}

impl CoreConfig {
    /// `δ_tr`, the "is T a transition point" tolerance used by the phase
    /// resolver (spec §4.3). Distinct name kept for readability at call
    /// sites; same field as [`Self::transition_tolerance_k`].
    pub fn transition_point_tolerance(&self) -> f64 {
        self.transition_tolerance_k
    }

    pub fn with_max_optimization_time_ms(mut self, ms: u64) -> Self {
        self.max_optimization_time_ms = ms;
        self
    }

    pub fn with_min_score_improvement(mut self, min: f64) -> Self {
        self.min_score_improvement = min;
        self
    }

    pub fn with_weights(mut self, weights: ScoreWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_transition_priors(mut self, priors: TransitionPriors) -> Self {
        self.transition_priors = priors;
        self
    }
}
