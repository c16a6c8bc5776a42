//! Concrete [`FilterStage`] implementations in the canonical order from
//! spec §4.4.

use std::collections::BTreeSet;

use indexmap::IndexMap;

use super::{FilterContext, FilterStage, StageMetrics, StageRunner};
use crate::catalog::{order_rows, CatalogLike, Row};
use crate::phase::PhaseResolver;

/// Small molecules whose formula is only recognized by an exact-prefix
/// match (spec §4.4 stage 1).
const PREFIX_REQUIRED_FORMULAS: &[&str] = &[
    "HCl", "CO2", "NH3", "CH4", "HF", "HBr", "HI", "NO", "NO2", "SO2", "SO3",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormulaClass {
    SmallMoleculePrefix,
    Ionic,
    PhaseAware,
    IsotopePossible,
    Standard,
}

fn classify_formula(target: &str) -> FormulaClass {
    if PREFIX_REQUIRED_FORMULAS.contains(&target) {
        FormulaClass::SmallMoleculePrefix
    } else if target.contains('+') || target.contains('-') {
        FormulaClass::Ionic
    } else if target.contains('(') {
        FormulaClass::PhaseAware
    } else if target.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        FormulaClass::IsotopePossible
    } else {
        FormulaClass::Standard
    }
}

/// Element symbols present in a formula, digits and parenthesized phase
/// suffixes stripped — used for the isotope/isomer match (rule d).
fn element_symbols(formula: &str) -> BTreeSet<String> {
    let base = crate::phase::strip_phase_suffix(formula);
    let mut symbols = BTreeSet::new();
    let mut chars = base.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_ascii_uppercase() {
            let mut symbol = String::from(c);
            while let Some(&next) = chars.peek() {
                if next.is_ascii_lowercase() {
                    symbol.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            symbols.insert(symbol);
        }
    }
    symbols
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MatchKind {
    Base = 0,
    PhaseTagged = 1,
    Prefix = 2,
    ElementSet = 3,
}

fn classify_match(target: &str, class: FormulaClass, row_formula: &str) -> Option<MatchKind> {
    let base = crate::phase::strip_phase_suffix(row_formula);
    if base == target {
        return Some(MatchKind::Base);
    }
    if row_formula.starts_with(&format!("{target}(")) {
        return Some(MatchKind::PhaseTagged);
    }
    if matches!(class, FormulaClass::SmallMoleculePrefix | FormulaClass::Standard)
        && row_formula.starts_with(target)
    {
        return Some(MatchKind::Prefix);
    }
    if matches!(class, FormulaClass::IsotopePossible)
        && element_symbols(row_formula) == element_symbols(target)
    {
        return Some(MatchKind::ElementSet);
    }
    None
}

/// Stage 1: Complex Formula Search.
#[derive(Default)]
pub struct ComplexFormulaSearchStage {
    runner: StageRunner,
}

impl FilterStage for ComplexFormulaSearchStage {
    fn name(&self) -> &str {
        "complex_formula_search"
    }

    fn filter(&self, rows: Vec<Row>, ctx: &mut FilterContext) -> Vec<Row> {
        let timing = self.runner.start();
        let count_in = rows.len();
        // Compare base-to-base: a target carrying its own `(phase)` suffix
        // (e.g. "H2O(l)") would otherwise match nothing, since rule (a)
        // strips the row's suffix but not the target's.
        let target = crate::phase::strip_phase_suffix(&ctx.formula);
        let class = classify_formula(target);

        let mut matched: Vec<(MatchKind, Row)> = rows
            .into_iter()
            .filter_map(|row| classify_match(target, class, row.formula()).map(|kind| (kind, row)))
            .collect();
        matched.sort_by_key(|(kind, _)| *kind);
        let out: Vec<Row> = matched.into_iter().map(|(_, row)| row).collect();

        let mut extra = IndexMap::new();
        extra.insert("formula_class".to_string(), format!("{class:?}"));
        self.runner
            .finish(timing, self.name(), count_in, out.len(), extra);
        out
    }

    fn metrics(&self) -> StageMetrics {
        self.runner.snapshot()
    }
}

/// Stage 2: Formula Consistency / Deduplication.
pub struct FormulaConsistencyDedupStage {
    runner: StageRunner,
    max_records_per_formula: usize,
}

impl FormulaConsistencyDedupStage {
    pub fn new(max_records_per_formula: usize) -> Self {
        Self {
            runner: StageRunner::default(),
            max_records_per_formula,
        }
    }
}

impl FilterStage for FormulaConsistencyDedupStage {
    fn name(&self) -> &str {
        "formula_consistency_dedup"
    }

    fn filter(&self, rows: Vec<Row>, _ctx: &mut FilterContext) -> Vec<Row> {
        let timing = self.runner.start();
        let count_in = rows.len();

        let mut groups: IndexMap<String, Vec<Row>> = IndexMap::new();
        for row in rows {
            groups
                .entry(row.base_formula().to_string())
                .or_default()
                .push(row);
        }

        let mut out = Vec::new();
        for (_, mut group) in groups {
            group.sort_by(|a, b| {
                a.reliability_class()
                    .cmp(&b.reliability_class())
                    .then_with(|| (b.tmax() - b.tmin()).total_cmp(&(a.tmax() - a.tmin())))
            });
            group.truncate(self.max_records_per_formula);
            out.extend(group);
        }

        self.runner
            .finish(timing, self.name(), count_in, out.len(), IndexMap::new());
        out
    }

    fn metrics(&self) -> StageMetrics {
        self.runner.snapshot()
    }
}

/// Stage 3: Temperature Overlap.
#[derive(Default)]
pub struct TemperatureOverlapStage {
    runner: StageRunner,
}

impl FilterStage for TemperatureOverlapStage {
    fn name(&self) -> &str {
        "temperature_overlap"
    }

    fn filter(&self, rows: Vec<Row>, ctx: &mut FilterContext) -> Vec<Row> {
        let timing = self.runner.start();
        let count_in = rows.len();
        let (lo, hi) = ctx.temperature_range;
        let out: Vec<Row> = rows
            .into_iter()
            .filter(|r| r.tmin() <= hi && lo <= r.tmax())
            .collect();
        self.runner
            .finish(timing, self.name(), count_in, out.len(), IndexMap::new());
        out
    }

    fn metrics(&self) -> StageMetrics {
        self.runner.snapshot()
    }
}

fn phase_selection_score(resolver: &PhaseResolver, row: &Row, t_mid: f64) -> f64 {
    let expected = resolver.effective_phase(row.as_catalog_like(), t_mid);
    match row.phase() {
        None => 0.8,
        Some(declared) if declared.as_str() == expected.as_str() => 1.0,
        Some(_) => {
            let complete = row.h298() != 0.0 && row.s298() != 0.0;
            if complete {
                0.6
            } else {
                0.3
            }
        }
    }
}

/// Stage 4: Phase Selection.
#[derive(Default)]
pub struct PhaseSelectionStage {
    runner: StageRunner,
    resolver: PhaseResolver,
}

impl FilterStage for PhaseSelectionStage {
    fn name(&self) -> &str {
        "phase_selection"
    }

    fn filter(&self, rows: Vec<Row>, ctx: &mut FilterContext) -> Vec<Row> {
        let timing = self.runner.start();
        let count_in = rows.len();
        let t_mid = (ctx.temperature_range.0 + ctx.temperature_range.1) / 2.0;
        let out: Vec<Row> = rows
            .into_iter()
            .filter(|row| phase_selection_score(&self.resolver, row, t_mid) >= 0.3)
            .collect();
        self.runner
            .finish(timing, self.name(), count_in, out.len(), IndexMap::new());
        out
    }

    fn metrics(&self) -> StageMetrics {
        self.runner.snapshot()
    }
}

fn reliability_score(row: &Row) -> f64 {
    let completeness_terms = [
        row.h298() != 0.0,
        row.s298() != 0.0,
        row.tmelt().is_some(),
        row.tboil().is_some(),
    ];
    let completeness =
        completeness_terms.iter().filter(|b| **b).count() as f64 / completeness_terms.len() as f64;

    (10.0 - row.reliability_class() as f64) * 100.0
        + completeness * 50.0
        + 20.0 * row.tmelt().is_some() as u8 as f64
        + 20.0 * row.tboil().is_some() as u8 as f64
        + ((row.tmax() - row.tmin()) / 100.0).min(10.0)
        + 10.0 * (row.h298() != 0.0) as u8 as f64
        + 10.0 * (row.s298() != 0.0) as u8 as f64
}

/// Stage 5: Reliability Priority.
pub struct ReliabilityPriorityStage {
    runner: StageRunner,
    max_records: usize,
}

impl ReliabilityPriorityStage {
    pub fn new(max_records: usize) -> Self {
        Self {
            runner: StageRunner::default(),
            max_records,
        }
    }
}

impl FilterStage for ReliabilityPriorityStage {
    fn name(&self) -> &str {
        "reliability_priority"
    }

    fn filter(&self, rows: Vec<Row>, _ctx: &mut FilterContext) -> Vec<Row> {
        let timing = self.runner.start();
        let count_in = rows.len();
        let mut scored: Vec<(f64, Row)> = rows.into_iter().map(|r| (reliability_score(&r), r)).collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(self.max_records.max(1));
        let mut out: Vec<Row> = scored.into_iter().map(|(_, r)| r).collect();
        order_rows(&mut out);
        self.runner
            .finish(timing, self.name(), count_in, out.len(), IndexMap::new());
        out
    }

    fn metrics(&self) -> StageMetrics {
        self.runner.snapshot()
    }
}

/// Stage 6: Formula Consistency (exit check). The dedicated-module variant
/// named in spec §9's open question — the `filter_stages`-internal variant
/// from the prototype is not implemented.
#[derive(Default)]
pub struct FormulaConsistencyExitStage {
    runner: StageRunner,
}

impl FilterStage for FormulaConsistencyExitStage {
    fn name(&self) -> &str {
        "formula_consistency_exit"
    }

    fn filter(&self, rows: Vec<Row>, ctx: &mut FilterContext) -> Vec<Row> {
        let timing = self.runner.start();
        let count_in = rows.len();
        let target = crate::phase::strip_phase_suffix(&ctx.formula);
        let out: Vec<Row> = rows
            .into_iter()
            .filter(|r| r.base_formula() == target)
            .collect();
        self.runner
            .finish(timing, self.name(), count_in, out.len(), IndexMap::new());
        out
    }

    fn metrics(&self) -> StageMetrics {
        self.runner.snapshot()
    }
}
