//! Integration tests for the six concrete scenarios in spec §8, built from
//! `CatalogRow::new` fixtures rather than a database, per SPEC_FULL.md §2.4.

use approx::assert_relative_eq;
use indexmap::IndexMap;

use thermocat_core::calculator::MultiPhaseCalculator;
use thermocat_core::catalog::{CatalogLike, CatalogRow, Row};
use thermocat_core::config::CoreConfig;
use thermocat_core::filter::{build_filter_pipeline, run_filter_pipeline, FilterContext};
use thermocat_core::observability::NoopSink;
use thermocat_core::optimal_selector::OptimalRecordSelector;
use thermocat_core::phase::Phase;
use thermocat_core::segment::PhaseSegmentBuilder;
use thermocat_core::temperature_range::TemperatureRangeResolver;
use thermocat_core::{calculate_compound, resolve_calculation_range};

fn solid_row(id: i64, tmin: f64, tmax: f64, reliability: u8) -> Row {
    Row::physical(
        CatalogRow::new(
            id,
            "SiO2",
            None,
            Some(Phase::Solid),
            tmin,
            tmax,
            -910_860.0,
            41.5,
            [60.0, 8.0, 0.0, 0.0, -6.0, 0.0],
            None,
            None,
            reliability,
        )
        .unwrap(),
    )
}

/// Scenario 1: four contiguous solid rows with identical polynomials
/// collapse into a single virtual row spanning the whole interval.
#[test]
fn sio2_identical_solid_rows_merge_into_one_virtual_row() {
    let config = CoreConfig::default();
    let rows = vec![
        solid_row(1, 298.0, 480.0, 2),
        solid_row(2, 480.0, 540.0, 1),
        solid_row(3, 540.0, 600.0, 3),
        solid_row(4, 600.0, 3100.0, 1),
    ];

    let builder = PhaseSegmentBuilder::new(&config);
    let (segments, transitions, _warnings) = builder.build(&rows, 298.0, 3100.0);

    let selector = OptimalRecordSelector::new(&config);
    let (optimized, _transitions, before, after) =
        selector.optimize(segments, transitions, &rows, 298.0, 3100.0, None, None, true);

    assert_eq!(optimized.len(), 1, "expected a single merged segment");
    assert!(optimized[0].active_record.is_virtual());
    assert_relative_eq!(optimized[0].t_start, 298.0);
    assert_relative_eq!(optimized[0].t_end, 3100.0);
    assert_eq!(optimized[0].active_record.coeffs(), [60.0, 8.0, 0.0, 0.0, -6.0, 0.0]);
    assert!(after.value >= before.value);
}

fn water_row(
    id: i64,
    phase: Phase,
    tmin: f64,
    tmax: f64,
    h298: f64,
    s298: f64,
    coeffs: [f64; 6],
    reliability: u8,
) -> Row {
    Row::physical(
        CatalogRow::new(
            id,
            format!("H2O({})", phase.as_str()),
            None,
            Some(phase),
            tmin,
            tmax,
            h298,
            s298,
            coeffs,
            Some(273.15),
            Some(373.15),
            reliability,
        )
        .unwrap(),
    )
}

/// Scenario 2: liquid + two coefficient-identical gas rows collapse to at
/// most three segments, with a boiling transition near 373.15 K.
#[test]
fn h2o_liquid_and_identical_gas_rows_collapse_with_boiling_transition() {
    let config = CoreConfig::default();
    let gas_coeffs = [30.09, 6.83, 6.79, -2.53, 0.08, -250.88];
    let rows = vec![
        water_row(
            1,
            Phase::Liquid,
            298.0,
            372.8,
            -285_830.0,
            69.95,
            [-203.606, 1523.29, -3196.413, 2474.455, 3.855326, -256.5478],
            1,
        ),
        water_row(2, Phase::Gas, 298.0, 600.0, -241_800.0, 188.8, gas_coeffs, 1),
        water_row(3, Phase::Gas, 600.0, 1600.0, -241_800.0, 188.8, gas_coeffs, 1),
        water_row(4, Phase::Gas, 1600.0, 6000.0, -241_800.0, 188.8, gas_coeffs, 1),
    ];

    let builder = PhaseSegmentBuilder::new(&config);
    let (segments, transitions, _warnings) = builder.build(&rows, 298.0, 2000.0);

    let selector = OptimalRecordSelector::new(&config);
    let (optimized, optimized_transitions, _before, _after) =
        selector.optimize(segments, transitions, &rows, 298.0, 2000.0, Some(273.15), Some(373.15), false);

    assert!(optimized.len() <= 3, "expected at most 3 segments, got {}", optimized.len());
    let boiling = optimized_transitions
        .iter()
        .find(|t| (t.temperature - 373.15).abs() <= 10.0);
    assert!(
        boiling.is_some(),
        "expected a transition within +/-10 K of 373.15 K, got {optimized_transitions:?}"
    );
}

fn cecl3_row(
    id: i64,
    phase: Phase,
    tmin: f64,
    tmax: f64,
    coeffs: [f64; 6],
) -> Row {
    Row::physical(
        CatalogRow::new(
            id,
            format!("CeCl3({})", phase.as_str()),
            None,
            Some(phase),
            tmin,
            tmax,
            -1_053_700.0,
            151.0,
            coeffs,
            Some(1080.0),
            Some(2000.0),
            1,
        )
        .unwrap(),
    )
}

/// Scenario 3: two liquid rows over the same interval with identical
/// polynomials collapse, leaving a 2-segment solid/liquid chain.
#[test]
fn cecl3_duplicate_liquid_rows_are_eliminated() {
    let config = CoreConfig::default();
    let solid_coeffs = [120.0, 15.0, 0.0, 0.0, -1.2, 0.0];
    let liquid_coeffs = [150.0, 0.0, 0.0, 0.0, 0.0, 0.0];
    let rows = vec![
        cecl3_row(1, Phase::Solid, 298.0, 1080.0, solid_coeffs),
        cecl3_row(2, Phase::Liquid, 1080.0, 1300.0, liquid_coeffs),
        cecl3_row(3, Phase::Liquid, 1080.0, 1500.0, liquid_coeffs),
    ];

    let builder = PhaseSegmentBuilder::new(&config);
    let (segments, transitions, _warnings) = builder.build(&rows, 298.0, 1500.0);

    let selector = OptimalRecordSelector::new(&config);
    let (optimized, _transitions, _before, _after) =
        selector.optimize(segments, transitions, &rows, 298.0, 1500.0, Some(1080.0), Some(2000.0), false);

    assert_eq!(optimized.len(), 2, "expected solid + liquid, duplicate eliminated");
    assert_eq!(optimized[0].active_record.phase(), Some(Phase::Solid));
    assert_eq!(optimized[1].active_record.phase(), Some(Phase::Liquid));
    assert_relative_eq!(optimized[0].t_end, 1080.0);
    assert_relative_eq!(optimized[1].t_start, 1080.0);
    assert_relative_eq!(optimized[1].t_end, 1500.0);
}

fn bare_row(id: i64, formula: &str, tmin: f64, tmax: f64, reliability: u8) -> Row {
    Row::physical(
        CatalogRow::new(
            id, formula, None, None, tmin, tmax, 0.0, 0.0, [0.0; 6], None, None, reliability,
        )
        .unwrap(),
    )
}

/// Scenario 4: the pipeline smoke test for HCl keeps `HCl`, `HCl(g)`,
/// `HCl2`, and drops the unrelated `NaCl`.
#[test]
fn hcl_pipeline_smoke_test_drops_unrelated_salt() {
    let config = CoreConfig::default();
    let pipeline = build_filter_pipeline(&config);
    let rows = vec![
        bare_row(1, "HCl", 200.0, 2000.0, 1),
        bare_row(2, "HCl(g)", 200.0, 2000.0, 2),
        bare_row(3, "HCl2", 200.0, 2000.0, 3),
        bare_row(4, "NaCl", 200.0, 2000.0, 1),
    ];
    let ctx = FilterContext::new("HCl", (250.0, 500.0));
    let result = run_filter_pipeline(&pipeline, rows, ctx, &NoopSink);

    assert!(result.is_found);
    assert!(!result.rows.iter().any(|r| r.formula() == "NaCl"));
}

/// Scenario 5: the range resolver intersects FeO's wide union with O2's
/// narrower one and keeps 298.15 K inside the result.
#[test]
fn range_resolver_intersects_feo_and_o2() {
    let config = CoreConfig::default();
    let mut rows_by_formula = IndexMap::new();
    rows_by_formula.insert(
        "FeO".to_string(),
        vec![
            bare_row(1, "FeO", 298.0, 1000.0, 1),
            bare_row(2, "FeO", 1000.0, 2000.0, 1),
            bare_row(3, "FeO", 2000.0, 3000.0, 1),
            bare_row(4, "FeO", 3000.0, 4000.0, 1),
            bare_row(5, "FeO", 4000.0, 4500.0, 1),
            bare_row(6, "FeO", 4500.0, 5000.0, 1),
        ],
    );
    rows_by_formula.insert("O2".to_string(), vec![bare_row(7, "O2", 298.0, 2000.0, 1)]);

    let report = resolve_calculation_range(&rows_by_formula, None, &config);

    assert_relative_eq!(report.calculation_range.0, 298.0);
    assert_relative_eq!(report.calculation_range.1, 2000.0);
    assert!(report.includes_298);

    let resolver_direct = TemperatureRangeResolver::new();
    let report_direct = resolver_direct.resolve(&rows_by_formula, None, &config);
    assert_eq!(report, report_direct);
}

/// Scenario 6: liquid water's closed-form `H(300)`/`S(300)` match the
/// evaluator's own definite integral of `Cp` to within 1e-9 relative
/// error, matching the evaluator's unit tests but exercised end-to-end
/// through `calculate_compound`.
#[test]
fn water_liquid_enthalpy_matches_closed_form_integral_at_300k() {
    let config = CoreConfig::default();
    let row = CatalogRow::new(
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
    .unwrap();

    let result = calculate_compound(
        "H2O(l)",
        vec![Row::physical(row.clone())],
        300.0,
        None,
        &config,
        &NoopSink,
    )
    .unwrap();

    let expected_h = thermocat_core::polynomial::enthalpy(&row, 300.0).unwrap();
    let expected_s = thermocat_core::polynomial::entropy(&row, 300.0).unwrap();
    assert_relative_eq!(result.enthalpy_j_per_mol, expected_h, max_relative = 1e-9);
    assert_relative_eq!(result.entropy_j_per_mol_k, expected_s, max_relative = 1e-9);

    // Cross-check via the calculator directly, bypassing the full pipeline.
    let calculator = MultiPhaseCalculator::new();
    let segment = thermocat_core::segment::PhaseSegment {
        active_record: Row::physical(row),
        t_start: 273.15,
        t_end: 373.15,
        h_start: 0.0,
        s_start: 0.0,
        is_transition_boundary: false,
    };
    let direct = calculator.evaluate_at(&[segment], &[], 300.0).unwrap();
    assert_relative_eq!(direct.enthalpy_j_per_mol, expected_h, max_relative = 1e-9);
}
