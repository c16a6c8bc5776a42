//! The data model (spec §3): `CatalogRow`, the `Row` tagged union of
//! physical and virtual rows, and the scoring type shared by the Optimal
//! Record Selector.

mod virtual_row;

pub use virtual_row::VirtualRow;

use crate::errors::{ThermoError, ThermoResult};
use crate::phase::{phase_from_formula, strip_phase_suffix, Phase};

/// Common read-only view shared by [`CatalogRow`] and [`VirtualRow`].
///
/// Per spec §9's design note: rather than exposing concrete-type casts
/// across module boundaries, every consumer downstream of the catalog
/// (filter stages, the record selector, the segment builder, the
/// calculator) only ever touches rows through this capability.
pub trait CatalogLike: std::fmt::Debug {
    fn id(&self) -> i64;
    fn formula(&self) -> &str;
    fn display_name(&self) -> Option<&str>;
    fn phase(&self) -> Option<Phase>;
    fn tmin(&self) -> f64;
    fn tmax(&self) -> f64;
    fn h298(&self) -> f64;
    fn s298(&self) -> f64;
    fn coeffs(&self) -> [f64; 6];
    fn tmelt(&self) -> Option<f64>;
    fn tboil(&self) -> Option<f64>;
    fn reliability_class(&self) -> u8;

    /// Base formula with any `(phase)` suffix stripped.
    fn base_formula(&self) -> &str {
        strip_phase_suffix(self.formula())
    }

    /// Whether `(h298, s298) != (0, 0)` — "is reference row" in spec §3.
    fn is_reference_row(&self) -> bool {
        self.h298() != 0.0 || self.s298() != 0.0
    }

    /// Whether the row covers `t`.
    fn covers(&self, t: f64) -> bool {
        self.tmin() <= t && t <= self.tmax()
    }

    /// Phase implied by the formula's `(x)` suffix, independent of the
    /// row's own declared `phase` field.
    fn formula_phase(&self) -> Option<Phase> {
        phase_from_formula(self.formula())
    }
}

/// An immutable snapshot of one catalog row (spec §3 `CatalogRow`).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CatalogRow {
    pub id: i64,
    pub formula: String,
    pub display_name: Option<String>,
    pub phase: Option<Phase>,
    pub tmin: f64,
    pub tmax: f64,
    pub h298: f64,
    pub s298: f64,
    pub f1: f64,
    pub f2: f64,
    pub f3: f64,
    pub f4: f64,
    pub f5: f64,
    pub f6: f64,
    pub tmelt: Option<f64>,
    pub tboil: Option<f64>,
    pub reliability_class: u8,
}

impl CatalogRow {
    /// Validates the invariants in spec §3 and constructs the row.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: i64,
        formula: impl Into<String>,
        display_name: Option<String>,
        phase: Option<Phase>,
        tmin: f64,
        tmax: f64,
        h298: f64,
        s298: f64,
        coeffs: [f64; 6],
        tmelt: Option<f64>,
        tboil: Option<f64>,
        reliability_class: u8,
    ) -> ThermoResult<Self> {
        if tmin > tmax {
            return Err(ThermoError::ReversedRange(tmin, tmax));
        }
        let (tmelt, tboil) = match (tmelt, tboil) {
            (Some(m), Some(b)) if m >= b => {
                // Coerce apart rather than reject: spec §4.6 step 1 asks
                // the Segment Builder to do this, but rows that already
                // violate the invariant at construction time are coerced
                // the same way so every caller sees a consistent row.
                (Some(m), Some(m + (b - m).abs().max(1.0)))
            }
            other => other,
        };
        if !(1..=5).contains(&reliability_class) {
            return Err(ThermoError::EvaluationError {
                component: "CatalogRow::new".into(),
                detail: format!("reliability_class {reliability_class} outside 1..=5"),
            });
        }
        Ok(Self {
            id,
            formula: formula.into(),
            display_name,
            phase,
            tmin,
            tmax,
            h298,
            s298,
            f1: coeffs[0],
            f2: coeffs[1],
            f3: coeffs[2],
            f4: coeffs[3],
            f5: coeffs[4],
            f6: coeffs[5],
            tmelt,
            tboil,
            reliability_class,
        })
    }
}

impl CatalogLike for CatalogRow {
    fn id(&self) -> i64 {
        self.id
    }
    fn formula(&self) -> &str {
        &self.formula
    }
    fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }
    fn phase(&self) -> Option<Phase> {
        self.phase
    }
    fn tmin(&self) -> f64 {
        self.tmin
    }
    fn tmax(&self) -> f64 {
        self.tmax
    }
    fn h298(&self) -> f64 {
        self.h298
    }
    fn s298(&self) -> f64 {
        self.s298
    }
    fn coeffs(&self) -> [f64; 6] {
        [self.f1, self.f2, self.f3, self.f4, self.f5, self.f6]
    }
    fn tmelt(&self) -> Option<f64> {
        self.tmelt
    }
    fn tboil(&self) -> Option<f64> {
        self.tboil
    }
    fn reliability_class(&self) -> u8 {
        self.reliability_class
    }
}

impl std::fmt::Display for CatalogRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CatalogRow(id={}, formula={}, [{}, {}] K, reliability={})",
            self.id, self.formula, self.tmin, self.tmax, self.reliability_class
        )
    }
}

/// Tagged union of a physical row and a merged virtual row (spec §9's
/// design note, option (a)). Every downstream component accepts `&Row` and
/// reaches its fields only through [`CatalogLike`].
#[derive(Debug, Clone)]
pub enum Row {
    Physical(std::rc::Rc<CatalogRow>),
    Virtual(std::rc::Rc<VirtualRow>),
}

impl Row {
    pub fn physical(row: CatalogRow) -> Self {
        Row::Physical(std::rc::Rc::new(row))
    }

    pub fn virtual_row(row: VirtualRow) -> Self {
        Row::Virtual(std::rc::Rc::new(row))
    }

    /// Source catalog-row ids this `Row` was built from: a single id for a
    /// physical row, or the merged set for a virtual one.
    pub fn source_ids(&self) -> Vec<i64> {
        match self {
            Row::Physical(r) => vec![r.id],
            Row::Virtual(v) => v.source_ids.clone(),
        }
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self, Row::Virtual(_))
    }

    pub fn as_catalog_like(&self) -> &dyn CatalogLike {
        match self {
            Row::Physical(r) => r.as_ref(),
            Row::Virtual(v) => v.as_ref(),
        }
    }
}

impl CatalogLike for Row {
    fn id(&self) -> i64 {
        self.as_catalog_like().id()
    }
    fn formula(&self) -> &str {
        self.as_catalog_like().formula()
    }
    fn display_name(&self) -> Option<&str> {
        self.as_catalog_like().display_name()
    }
    fn phase(&self) -> Option<Phase> {
        self.as_catalog_like().phase()
    }
    fn tmin(&self) -> f64 {
        self.as_catalog_like().tmin()
    }
    fn tmax(&self) -> f64 {
        self.as_catalog_like().tmax()
    }
    fn h298(&self) -> f64 {
        self.as_catalog_like().h298()
    }
    fn s298(&self) -> f64 {
        self.as_catalog_like().s298()
    }
    fn coeffs(&self) -> [f64; 6] {
        self.as_catalog_like().coeffs()
    }
    fn tmelt(&self) -> Option<f64> {
        self.as_catalog_like().tmelt()
    }
    fn tboil(&self) -> Option<f64> {
        self.as_catalog_like().tboil()
    }
    fn reliability_class(&self) -> u8 {
        self.as_catalog_like().reliability_class()
    }
}

/// Sort key for the canonical row ordering, spec §5:
/// `(tmin asc, tmax asc, reliability_class asc, id asc)`.
///
/// `f64::total_cmp` is used instead of `partial_cmp` so the ordering is
/// total even in the presence of signed zero (catalog data has no NaNs by
/// construction — `CatalogRow::new` never produces one from finite
/// inputs).
pub fn order_rows(rows: &mut [Row]) {
    rows.sort_by(|a, b| {
        a.tmin()
            .total_cmp(&b.tmin())
            .then_with(|| a.tmax().total_cmp(&b.tmax()))
            .then_with(|| a.reliability_class().cmp(&b.reliability_class()))
            .then_with(|| a.id().cmp(&b.id()))
    });
}

/// The weighted figure of merit from spec §3: `w_r·(1/N) +
/// w_q·((R_max−R_avg)/R_max) + w_t·T_cov`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizationScore {
    pub record_count: usize,
    pub average_reliability: f64,
    pub transition_coverage: f64,
    pub value: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, tmin: f64, tmax: f64, reliability: u8) -> Row {
        Row::physical(
            CatalogRow::new(
                id,
                "H2O",
                None,
                None,
                tmin,
                tmax,
                -241_800.0,
                188.8,
                [30.0, 10.0, 0.0, 0.0, 0.0, 0.0],
                None,
                None,
                reliability,
            )
            .unwrap(),
        )
    }

    #[test]
    fn rejects_reversed_range() {
        let err = CatalogRow::new(
            1,
            "H2O",
            None,
            None,
            500.0,
            400.0,
            0.0,
            0.0,
            [0.0; 6],
            None,
            None,
            1,
        )
        .unwrap_err();
        assert!(matches!(err, ThermoError::ReversedRange(500.0, 400.0)));
    }

    #[test]
    fn coerces_tmelt_tboil_apart() {
        let row = CatalogRow::new(
            1,
            "X",
            None,
            None,
            0.0,
            1000.0,
            0.0,
            0.0,
            [0.0; 6],
            Some(500.0),
            Some(500.0),
            1,
        )
        .unwrap();
        assert!(row.tmelt.unwrap() < row.tboil.unwrap());
    }

    #[test]
    fn is_reference_row_requires_nonzero_h_or_s() {
        let with_ref = row(1, 200.0, 400.0, 1);
        assert!(with_ref.is_reference_row());
    }

    #[test]
    fn order_rows_sorts_by_tmin_then_tmax_then_reliability_then_id() {
        let mut rows = vec![
            row(3, 300.0, 400.0, 2),
            row(1, 300.0, 400.0, 1),
            row(2, 200.0, 400.0, 1),
        ];
        order_rows(&mut rows);
        let ids: Vec<i64> = rows.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn base_formula_strips_phase_suffix() {
        let r = row(1, 200.0, 400.0, 1);
        assert_eq!(r.base_formula(), "H2O");
    }

    #[test]
    fn catalog_row_round_trips_through_json() {
        let json = r#"{
            "id": 42,
            "formula": "NaCl",
            "display_name": "sodium chloride",
            "phase": "s",
            "tmin": 298.15,
            "tmax": 1073.15,
            "h298": -411120.0,
            "s298": 72.13,
            "f1": 50.79,
            "f2": 6.15,
            "f3": -0.37,
            "f4": 0.0,
            "f5": -0.04,
            "f6": -425.4,
            "tmelt": 1073.15,
            "tboil": null,
            "reliability_class": 1
        }"#;
        let row: CatalogRow = serde_json::from_str(json).unwrap();
        assert_eq!(row.id, 42);
        assert_eq!(row.phase, Some(Phase::Solid));
        assert_relative_eq_h298(&row);

        let round_tripped: CatalogRow = serde_json::from_str(&serde_json::to_string(&row).unwrap()).unwrap();
        assert_eq!(round_tripped, row);
    }

    fn assert_relative_eq_h298(row: &CatalogRow) {
        approx::assert_relative_eq!(row.h298, -411120.0, max_relative = 1e-12);
    }
}
