//! `thermocat-core`: the record-selection and multi-phase composition
//! pipeline that turns a thermochemical catalog into `H`/`S`/`G`/`Cp`
//! for a single compound or a balanced reaction.
//!
//! The pipeline runs, in order: the Filter Pipeline narrows a compound's
//! candidate rows down to a workable set; the Phase Segment Builder turns
//! that set into an ordered chain of active records across phase
//! boundaries; the Optimal Record Selector tries, conservatively, to
//! shrink or strengthen that chain; and the Multi-Phase Calculator walks
//! it to produce a result. Every component is handed an explicit
//! [`config::CoreConfig`] and an optional [`observability::ObservabilitySink`]
//! — nothing here reads the environment or a global.

pub mod calculator;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod filter;
pub mod observability;
pub mod optimal_selector;
pub mod phase;
pub mod polynomial;
pub mod record_selector;
pub mod segment;
pub mod temperature_range;

use indexmap::IndexMap;

use calculator::{reduce_reaction, MultiPhaseCalculator, MultiPhaseResult, ReactionResult};
use catalog::Row;
use config::CoreConfig;
use errors::{ThermoError, ThermoResult};
use filter::FilterContext;
use observability::{NoopSink, ObservabilitySink};
use optimal_selector::OptimalRecordSelector;
use segment::PhaseSegmentBuilder;
use temperature_range::TemperatureRangeResolver;

pub use filter::{build_filter_pipeline, run_filter_pipeline};

/// Runs the filter pipeline for one compound, builds its segment chain,
/// and returns the (pre-optimization) chain plus every warning collected
/// along the way. Shared by [`calculate_compound`] and [`optimize_chain`].
fn build_chain(
    formula: &str,
    candidates: Vec<Row>,
    t_lo: f64,
    t_hi: f64,
    config: &CoreConfig,
    sink: &dyn ObservabilitySink,
) -> ThermoResult<(Vec<segment::PhaseSegment>, Vec<segment::PhaseTransition>, Vec<String>)> {
    let mut warnings = Vec::new();
    let pipeline = filter::build_filter_pipeline(config);
    let ctx = FilterContext::new(formula, (t_lo, t_hi));
    let filter_result = filter::run_filter_pipeline(&pipeline, candidates, ctx, sink);
    if !filter_result.is_found {
        return Err(ThermoError::EmptyRowList(format!(
            "{formula}: {}",
            filter_result
                .failure_reason
                .unwrap_or_else(|| "filter pipeline produced no rows".to_string())
        )));
    }

    let builder = PhaseSegmentBuilder::new(config);
    let (segments, transitions, build_warnings) = builder.build(&filter_result.rows, t_lo, t_hi);
    warnings.extend(build_warnings);
    if segments.is_empty() {
        return Err(ThermoError::EmptyRowList(format!(
            "{formula}: phase segment builder produced no segments"
        )));
    }
    Ok((segments, transitions, warnings))
}

/// Folds an optional user-requested window into a warning, per spec §4.2:
/// the window is tracked for reporting only and never narrows the
/// calculation interval actually used.
fn note_user_window(user_window: Option<(f64, f64)>, t_lo: f64, t_hi: f64, warnings: &mut Vec<String>) {
    if let Some((u_lo, u_hi)) = user_window {
        if u_lo > t_lo || u_hi < t_hi {
            warnings.push(format!(
                "requested window [{u_lo}, {u_hi}] K is narrower than the calculation range [{t_lo}, {t_hi}] K; the wider range was used"
            ));
        }
    }
}

/// `calculate_compound` (spec §6): end-to-end `H`/`S`/`G`/`Cp` for one
/// compound at `target_temperature`, given its raw candidate rows. An
/// optional `user_window` is recorded on the result but never constrains
/// the calculation interval (spec §4.2).
pub fn calculate_compound(
    formula: &str,
    candidates: Vec<Row>,
    target_temperature: f64,
    user_window: Option<(f64, f64)>,
    config: &CoreConfig,
    sink: &dyn ObservabilitySink,
) -> ThermoResult<MultiPhaseResult> {
    let t_lo = target_temperature.min(polynomial::T_REF);
    let t_hi = target_temperature.max(polynomial::T_REF);
    let (segments, transitions, mut warnings) =
        build_chain(formula, candidates, t_lo, t_hi, config, sink)?;
    note_user_window(user_window, t_lo, t_hi, &mut warnings);

    let calculator = MultiPhaseCalculator::new();
    let mut result = calculator.evaluate_at(&segments, &transitions, target_temperature)?;
    result.warnings.append(&mut warnings);
    Ok(result)
}

/// `calculate_compound` over a sorted trajectory instead of a single target
/// (spec §6 "target|trajectory"): the returned [`MultiPhaseResult`] carries
/// the last temperature's values as `final`, with `h_path`/`s_path` holding
/// every emitted point.
pub fn calculate_compound_trajectory(
    formula: &str,
    candidates: Vec<Row>,
    temperatures: &[f64],
    user_window: Option<(f64, f64)>,
    config: &CoreConfig,
    sink: &dyn ObservabilitySink,
) -> ThermoResult<MultiPhaseResult> {
    if temperatures.is_empty() {
        return Err(ThermoError::EmptyRowList(format!(
            "{formula}: empty trajectory"
        )));
    }
    let mut sorted = temperatures.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let t_lo = sorted.first().copied().unwrap().min(polynomial::T_REF);
    let t_hi = sorted.last().copied().unwrap().max(polynomial::T_REF);
    let (segments, transitions, mut warnings) =
        build_chain(formula, candidates, t_lo, t_hi, config, sink)?;
    note_user_window(user_window, t_lo, t_hi, &mut warnings);

    let calculator = MultiPhaseCalculator::new();
    let points = calculator.evaluate_trajectory(&segments, &transitions, &sorted)?;
    let mut result = points
        .last()
        .cloned()
        .expect("non-empty trajectory yields at least one point");
    result.h_path = points
        .iter()
        .map(|p| (p.target_temperature, p.enthalpy_j_per_mol))
        .collect();
    result.s_path = points
        .iter()
        .map(|p| (p.target_temperature, p.entropy_j_per_mol_k))
        .collect();
    result.warnings.append(&mut warnings);
    Ok(result)
}

/// `optimize_chain` (spec §6): runs the Optimal Record Selector against an
/// already-built segment chain and returns the (possibly unchanged)
/// result, together with before/after [`catalog::OptimizationScore`]s.
/// `tmelt`/`tboil` are the declared transition temperatures the selector
/// must verify coverage of (spec §4.7 step 4); `is_elemental` relaxes the
/// first-in-phase H298/S298 requirement (spec §4.7 step 5, §9).
#[allow(clippy::too_many_arguments)]
pub fn optimize_chain(
    formula: &str,
    candidates: Vec<Row>,
    pool: &[Row],
    t_lo: f64,
    t_hi: f64,
    tmelt: Option<f64>,
    tboil: Option<f64>,
    is_elemental: bool,
    config: &CoreConfig,
    sink: &dyn ObservabilitySink,
) -> ThermoResult<(
    Vec<segment::PhaseSegment>,
    Vec<segment::PhaseTransition>,
    catalog::OptimizationScore,
    catalog::OptimizationScore,
)> {
    let (segments, transitions, _warnings) = build_chain(formula, candidates, t_lo, t_hi, config, sink)?;
    let selector = OptimalRecordSelector::new(config);
    Ok(selector.optimize(segments, transitions, pool, t_lo, t_hi, tmelt, tboil, is_elemental))
}

/// `resolve_calculation_range` (spec §6): thin wrapper around the
/// Temperature Range Resolver for a multi-compound calculation.
pub fn resolve_calculation_range(
    rows_by_formula: &IndexMap<String, Vec<Row>>,
    user_window: Option<(f64, f64)>,
    config: &CoreConfig,
) -> temperature_range::RangeReport {
    TemperatureRangeResolver::new().resolve(rows_by_formula, user_window, config)
}

/// `calculate_reaction` (spec §6): reduces a balanced reaction's per-
/// compound results into `ΔH`/`ΔS`/`ΔG`/`K` at a shared temperature.
///
/// `coefficients` carries signed stoichiometry (negative for reactants,
/// positive for products), matched positionally against `compounds`.
pub fn calculate_reaction(
    compounds: &[(&str, Vec<Row>)],
    coefficients: &[f64],
    target_temperature: f64,
    user_window: Option<(f64, f64)>,
    config: &CoreConfig,
    sink: &dyn ObservabilitySink,
) -> ThermoResult<ReactionResult> {
    if compounds.len() != coefficients.len() {
        return Err(ThermoError::StoichiometryMismatch {
            coefficients: coefficients.len(),
            compounds: compounds.len(),
        });
    }

    let mut results = Vec::with_capacity(compounds.len());
    for (formula, rows) in compounds {
        let result = calculate_compound(
            formula,
            rows.clone(),
            target_temperature,
            user_window,
            config,
            sink,
        )?;
        results.push(result);
    }
    reduce_reaction(target_temperature, coefficients, &results)
}

/// `calculate_reaction` over a sorted trajectory instead of a single
/// target (spec §6 "target|trajectory"), reducing each compound's
/// trajectory result at every emitted temperature.
pub fn calculate_reaction_trajectory(
    compounds: &[(&str, Vec<Row>)],
    coefficients: &[f64],
    temperatures: &[f64],
    user_window: Option<(f64, f64)>,
    config: &CoreConfig,
    sink: &dyn ObservabilitySink,
) -> ThermoResult<Vec<ReactionResult>> {
    if compounds.len() != coefficients.len() {
        return Err(ThermoError::StoichiometryMismatch {
            coefficients: coefficients.len(),
            compounds: compounds.len(),
        });
    }

    let mut sorted = temperatures.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let t_lo = sorted.first().copied().unwrap_or(polynomial::T_REF).min(polynomial::T_REF);
    let t_hi = sorted.last().copied().unwrap_or(polynomial::T_REF).max(polynomial::T_REF);

    let mut per_compound = Vec::with_capacity(compounds.len());
    for (formula, rows) in compounds {
        let (segments, transitions, mut warnings) =
            build_chain(formula, rows.clone(), t_lo, t_hi, config, sink)?;
        note_user_window(user_window, t_lo, t_hi, &mut warnings);
        let calculator = MultiPhaseCalculator::new();
        let mut results = calculator.evaluate_trajectory(&segments, &transitions, temperatures)?;
        if let Some(first) = results.first_mut() {
            first.warnings.append(&mut warnings);
        }
        per_compound.push(results);
    }

    let mut reactions = Vec::with_capacity(temperatures.len());
    for (index, &t) in temperatures.iter().enumerate() {
        let at_t: Vec<MultiPhaseResult> = per_compound.iter().map(|results| results[index].clone()).collect();
        reactions.push(reduce_reaction(t, coefficients, &at_t)?);
    }
    Ok(reactions)
}

/// Convenience no-op sink for callers that don't want to wire in their
/// own [`ObservabilitySink`].
pub fn default_sink() -> NoopSink {
    NoopSink
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogRow;
    use crate::phase::Phase;

    fn water_liquid() -> Row {
        Row::physical(
            CatalogRow::new(
                1,
                "H2O(l)",
                Some("water".into()),
                Some(Phase::Liquid),
                273.15,
                373.15,
                -285_830.0,
                69.95,
                [-203.606, 1523.29, -3196.413, 2474.455, 3.855326, -256.5478],
                Some(273.15),
                Some(373.15),
                1,
            )
            .unwrap(),
        )
    }

    #[test]
    fn calculate_compound_matches_h298_at_reference_temperature() {
        let config = CoreConfig::default();
        let sink = NoopSink;
        let result =
            calculate_compound("H2O(l)", vec![water_liquid()], 298.15, None, &config, &sink).unwrap();
        assert!((result.enthalpy_j_per_mol - (-285_830.0)).abs() < 1.0);
    }

    #[test]
    fn calculate_compound_reports_empty_candidates() {
        let config = CoreConfig::default();
        let sink = NoopSink;
        let err = calculate_compound("H2O(l)", vec![], 300.0, None, &config, &sink).unwrap_err();
        assert!(matches!(err, ThermoError::EmptyRowList(_)));
    }

    #[test]
    fn calculate_compound_trajectory_reports_last_point_as_final() {
        let config = CoreConfig::default();
        let sink = NoopSink;
        let result = calculate_compound_trajectory(
            "H2O(l)",
            vec![water_liquid()],
            &[298.15, 320.0, 350.0],
            None,
            &config,
            &sink,
        )
        .unwrap();
        assert_eq!(result.target_temperature, 350.0);
        assert_eq!(result.h_path.len(), 3);
    }
}
