//! The Multi-Phase Calculator (spec §4.8): walks a segment chain in
//! ascending-temperature order, accumulating `H`/`S` across phase
//! transitions, plus reaction reduction and the equilibrium constant.

use crate::catalog::CatalogLike;
use crate::errors::{ThermoError, ThermoResult};
use crate::phase::Phase;
use crate::polynomial::{self, T_REF};
use crate::segment::{PhaseSegment, PhaseTransition};

/// Gas constant, J/(mol·K).
pub const GAS_CONSTANT: f64 = 8.314462618;

/// Result of evaluating one compound's segment chain at a target
/// temperature, or along a trajectory (spec §3 `MultiPhaseResult`).
#[derive(Debug, Clone, PartialEq)]
pub struct MultiPhaseResult {
    pub target_temperature: f64,
    pub enthalpy_j_per_mol: f64,
    pub entropy_j_per_mol_k: f64,
    pub gibbs_j_per_mol: f64,
    pub heat_capacity_j_per_mol_k: f64,
    pub segments: Vec<PhaseSegment>,
    pub transitions: Vec<PhaseTransition>,
    pub h_path: Vec<(f64, f64)>,
    pub s_path: Vec<(f64, f64)>,
    pub warnings: Vec<String>,
}

/// The Multi-Phase Calculator (spec §4.8).
#[derive(Default)]
pub struct MultiPhaseCalculator;

impl MultiPhaseCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Evaluates a compound's chain at one target temperature.
    ///
    /// Walks segments in `t_start` order, accumulating `H`/`S` from
    /// `h298`/`s298` (or the carried-over running total) through each
    /// segment's polynomial, and adds `ΔH_tr`/`ΔS_tr` at every declared
    /// transition that lies strictly between the start of the chain and
    /// the target.
    pub fn evaluate_at(
        &self,
        segments: &[PhaseSegment],
        transitions: &[PhaseTransition],
        target: f64,
    ) -> ThermoResult<MultiPhaseResult> {
        if segments.is_empty() {
            return Err(ThermoError::EmptyRowList("MultiPhaseCalculator::evaluate_at".into()));
        }
        let mut ordered: Vec<&PhaseSegment> = segments.iter().collect();
        ordered.sort_by(|a, b| a.t_start.total_cmp(&b.t_start));

        let mut warnings = Vec::new();
        let mut h_path = Vec::new();
        let mut s_path = Vec::new();

        let first = ordered[0];
        let row = first.active_record.as_catalog_like();
        let mut running_h = if (first.t_start - T_REF).abs() <= 1e-6 {
            row.h298()
        } else {
            polynomial::enthalpy(row, first.t_start)?
        };
        let mut running_s = if (first.t_start - T_REF).abs() <= 1e-6 {
            row.s298()
        } else {
            polynomial::entropy(row, first.t_start)?
        };

        let mut last_point = polynomial::evaluate(row, first.t_start.max(1e-9))?;
        h_path.push((first.t_start, running_h));
        s_path.push((first.t_start, running_s));

        for segment in &ordered {
            let row = segment.active_record.as_catalog_like();
            let seg_end = segment.t_end.min(target).max(segment.t_start);
            if target < segment.t_start {
                break;
            }
            let delta_h = polynomial::integrate_enthalpy(row, segment.t_start.max(1e-9), seg_end.max(1e-9))?;
            let delta_s = polynomial::integrate_entropy(row, segment.t_start.max(1e-9), seg_end.max(1e-9))?;

            running_h += delta_h;
            running_s += delta_s;
            last_point = polynomial::evaluate(row, seg_end.max(1e-9))?;
            h_path.push((seg_end, running_h));
            s_path.push((seg_end, running_s));

            if target <= segment.t_end + 1e-9 {
                break;
            }

            if let Some(transition) = transitions
                .iter()
                .find(|t| (t.temperature - segment.t_end).abs() <= 1e-6)
            {
                running_h += transition.delta_h_kj_per_mol * 1000.0;
                running_s += transition.delta_s_j_per_mol_k;
                h_path.push((transition.temperature, running_h));
                s_path.push((transition.temperature, running_s));
            }
        }

        if target > ordered.last().unwrap().t_end + 1e-6 {
            warnings.push(format!(
                "target T={target} exceeds the chain's coverage up to {}",
                ordered.last().unwrap().t_end
            ));
        }

        let gibbs = running_h - target * running_s;
        Ok(MultiPhaseResult {
            target_temperature: target,
            enthalpy_j_per_mol: running_h,
            entropy_j_per_mol_k: running_s,
            gibbs_j_per_mol: gibbs,
            heat_capacity_j_per_mol_k: last_point.cp,
            segments: segments.to_vec(),
            transitions: transitions.to_vec(),
            h_path,
            s_path,
            warnings,
        })
    }

    /// Evaluates along a sorted trajectory of temperatures, reusing the
    /// chain's segments for every point.
    pub fn evaluate_trajectory(
        &self,
        segments: &[PhaseSegment],
        transitions: &[PhaseTransition],
        temperatures: &[f64],
    ) -> ThermoResult<Vec<MultiPhaseResult>> {
        temperatures
            .iter()
            .map(|&t| self.evaluate_at(segments, transitions, t))
            .collect()
    }
}

/// Checks whether a segment's phase is consistent with `s ≤ l ≤ g`
/// ordering along the chain; used by callers validating a finished
/// calculation rather than an in-progress optimization.
pub fn phase_order_is_monotonic(segments: &[PhaseSegment]) -> bool {
    let ranks: Vec<Option<u8>> = segments
        .iter()
        .filter_map(|s| s.active_record.phase())
        .map(|p| p.rank())
        .collect();
    ranks.windows(2).all(|w| match (w[0], w[1]) {
        (Some(a), Some(b)) => a <= b,
        _ => true,
    })
}

/// One compound's stoichiometric participation in a reaction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReactionTerm {
    pub coefficient: f64,
    pub enthalpy_j_per_mol: f64,
    pub entropy_j_per_mol_k: f64,
    pub gibbs_j_per_mol: f64,
}

/// Result of reducing a balanced reaction's compound results into a single
/// `ΔH`/`ΔS`/`ΔG`/`K` (spec §4.8 "reaction reduction").
#[derive(Debug, Clone, PartialEq)]
pub struct ReactionResult {
    pub temperature: f64,
    pub delta_h_j_per_mol: f64,
    pub delta_s_j_per_mol_k: f64,
    pub delta_g_j_per_mol: f64,
    pub equilibrium_constant: f64,
    pub warnings: Vec<String>,
}

/// Reduces signed stoichiometric coefficients (negative for reactants,
/// positive for products) against each compound's [`MultiPhaseResult`] at
/// a common temperature: `ΔX(T) = Σ νᵢ · Xᵢ(T)`.
pub fn reduce_reaction(
    temperature: f64,
    coefficients: &[f64],
    results: &[MultiPhaseResult],
) -> ThermoResult<ReactionResult> {
    if coefficients.len() != results.len() {
        return Err(ThermoError::StoichiometryMismatch {
            coefficients: coefficients.len(),
            compounds: results.len(),
        });
    }

    let mut delta_h = 0.0;
    let mut delta_s = 0.0;
    let mut warnings = Vec::new();
    for (coefficient, result) in coefficients.iter().zip(results) {
        delta_h += coefficient * result.enthalpy_j_per_mol;
        delta_s += coefficient * result.entropy_j_per_mol_k;
        warnings.extend(result.warnings.iter().cloned());
    }
    let delta_g = delta_h - temperature * delta_s;
    let equilibrium_constant = equilibrium_constant(delta_g, temperature);

    Ok(ReactionResult {
        temperature,
        delta_h_j_per_mol: delta_h,
        delta_s_j_per_mol_k: delta_s,
        delta_g_j_per_mol: delta_g,
        equilibrium_constant,
        warnings,
    })
}

/// `K(T) = exp(−ΔG(T) / (R·T))`, with `ΔG` already in J/mol.
pub fn equilibrium_constant(delta_g_j_per_mol: f64, temperature: f64) -> f64 {
    (-delta_g_j_per_mol / (GAS_CONSTANT * temperature)).exp()
}

/// Coarse phase-consistency check used by callers assembling a
/// [`ReactionResult`] across compounds that may be in different phases at
/// the same nominal temperature.
pub fn compound_phase_at(segments: &[PhaseSegment], t: f64) -> Option<Phase> {
    segments
        .iter()
        .find(|s| t >= s.t_start && t <= s.t_end)
        .and_then(|s| s.active_record.phase())
}
